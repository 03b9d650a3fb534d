use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, NetErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum NetErr {
    /// A shape invariant was violated (e.g. mismatched dimensions).
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// An input is invalid for semantic or domain reasons.
    InvalidInput(&'static str),
}

impl Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetErr::ShapeMismatch {
                what,
                got,
                expected,
            } => {
                write!(f, "shape mismatch for {what}: got {got}, expected {expected}")
            }
            NetErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl Error for NetErr {}
