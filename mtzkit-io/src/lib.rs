//! mtzkit-io: Memory-mapped MTZ reader and writer.
//!
//! Files are read through memmap2 and decoded into an [`mtzkit_mtz::Mtz`],
//! either with all reflections in memory or streamed row by row. Writing
//! produces files in the native byte order of the host.
//!

mod error;
pub mod header;
pub mod provenance;
mod reader;
pub mod stamp;
mod writer;

pub use error::{Error, Result};
pub use header::{format_g, pad_record, HeaderRecord, RECORD_LEN};
pub use provenance::{column_source_stamp, TASK_ID_VAR};
pub use reader::{
    read_mtz, MappedFile, MtzReader, ReadOptions, CELL_TOLERANCE_VAR, DEFAULT_CELL_TOLERANCE,
    MTZ_MAJOR_VERSION, MTZ_MINOR_VERSION, REFLECTION_OFFSET,
};
pub use stamp::{ByteOrder, MachineStamp};
pub use writer::{write_mtz, MtzWriter};
