//! Error types for mtzkit-core.

use thiserror::Error;

/// Result type alias for mtzkit-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A symmetry operator string could not be parsed.
    #[error("invalid symmetry operator '{op}': {reason}")]
    InvalidSymop { op: String, reason: &'static str },

    /// Cell parameters unusable for the requested computation.
    #[error("invalid cell parameters: {0:?}")]
    InvalidCell([f64; 6]),

    /// Unknown orthogonalisation code.
    #[error("unknown orthogonalisation code: {0}")]
    InvalidOrthCode(u8),

    /// A matrix had no inverse.
    #[error("singular matrix")]
    SingularMatrix,
}
