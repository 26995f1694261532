//! Error types for mtzkit-symmetry.

use thiserror::Error;

/// Result type alias for symmetry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Symmetry engine error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The reference table could not be located or opened.
    #[error("no symmetry reference file: {0}")]
    NoReferenceFile(String),

    /// Reading the reference table failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No block of the reference table matched the query.
    #[error("spacegroup not found in reference table: {0}")]
    SpacegroupNotFound(String),

    /// The reciprocal ASU description matched none of the known forms.
    #[error("no ASU test defined for description '{0}'")]
    NoAsuMatch(String),

    /// No Laue class is defined for the code.
    #[error("no Laue class defined for code {0}")]
    NoLaueMatch(u8),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] mtzkit_core::Error),
}
