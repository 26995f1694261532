//! Error types for mtzkit-mtz.

use thiserror::Error;

/// Result type alias for data model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Data model error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A fixed limit on crystals, datasets or columns was reached.
    #[error("too many {what}: limit is {limit}")]
    CapacityExceeded { what: &'static str, limit: usize },

    /// A record referred to a dataset that does not exist.
    #[error("null dataset: {0}")]
    NullDataset(String),

    /// A batch number is already in use.
    #[error("duplicate batch number {0}")]
    DuplicateBatch(i32),

    /// A COLSRC record named no existing column.
    #[error("COLSRC target not found: {0}")]
    ColumnSourceTarget(String),

    /// A COLGRP record named no existing column.
    #[error("COLGRP target not found: {0}")]
    ColumnGroupTarget(String),

    /// A column was found but its type differs from the one requested.
    #[error("column {label}: expected type {expected}, found {found}")]
    ColumnTypeMismatch {
        label: String,
        expected: String,
        found: String,
    },

    /// Invalid argument to an editing operation.
    #[error("invalid parameter: {0}")]
    ParamError(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] mtzkit_core::Error),
}
