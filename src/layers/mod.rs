pub mod activations;
mod attention;
mod conv;
mod dense;
mod norm;
pub mod ops;
mod recurrent;

pub use attention::{context_vector, Attention};
pub use conv::{Conv, Padding, Pool, PoolMethod};
pub use dense::Dense;
pub use norm::BatchNorm;
pub use recurrent::{last_hidden, BiLstm, Lstm, LstmCell};
