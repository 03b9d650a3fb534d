pub mod error;
pub mod layers;
pub mod memo;
pub mod model;
mod test;

pub use error::{NetErr, Result};
pub use memo::Memo;
pub use model::{Config, Model, Network};
