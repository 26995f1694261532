//! mtzkit-mtz: In-memory model of MTZ reflection files.
//!
//! An [`Mtz`] is a hierarchy of crystals, datasets and columns with
//! reflection values held per column, plus the header data that travels
//! with them: title, history, symmetry, sort order and batch headers.
//! Reading and writing the binary container lives in `mtzkit-io`.
//!

pub mod batch;
pub mod editing;
pub mod error;
pub mod labels;
pub mod model;
pub mod path;
pub mod reflection;

pub use batch::{Batch, BatchList, NBATCHINTEGERS, NBATCHREALS, NBATCHWORDS};
pub use editing::{SpacegroupConfidence, SymmetryGroup};
pub use error::{Error, Result};
pub use labels::{external_label, internal_label, parse_labin, ColumnListing};
pub use model::{
    ccp4_nan, Column, ColumnRef, Crystal, Dataset, DatasetRef, MissingValue, Mtz, BASE_NAME,
    MAX_COLUMNS, MAX_CRYSTALS, MAX_DATASETS,
};
pub use path::{path_match, rjust_path};
pub use reflection::Reflection;
