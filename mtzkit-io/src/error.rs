//! I/O error types.

use thiserror::Error;

/// Result type for MTZ file operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MTZ file error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Memory mapping error.
    #[error("memory mapping error: {0}")]
    MmapError(String),

    /// The file does not start with the `MTZ ` magic.
    #[error("not an MTZ file")]
    NotMtz,

    /// The file ended before the data it announced.
    #[error("read failed: {0}")]
    ReadFail(String),

    /// Major format version differs from the one supported.
    #[error("unsupported MTZ version {major}.{minor}")]
    BadVersion { major: i32, minor: i32 },

    /// Real number format this library cannot convert.
    #[error("unsupported real number format code {0}")]
    UnsupportedFormat(u8),

    /// A SYMINF record with fewer than seven fields.
    #[error("SYMINF record is incomplete")]
    SyminfIncomplete,

    /// A COLUMN record with fewer than five fields.
    #[error("COLUMN record is incomplete")]
    ColumnIncomplete,

    /// A batch block that does not start with a BH record.
    #[error("bad batch header: {0}")]
    BadBatchHeader(String),

    /// Operation needs reflections held in memory.
    #[error("reflections are not held in memory")]
    ReflectionsNotInMemory,

    /// Data model error.
    #[error("model error: {0}")]
    Mtz(#[from] mtzkit_mtz::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] mtzkit_core::Error),
}
