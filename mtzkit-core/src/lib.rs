//! mtzkit-core: Core types for crystallographic reflection data.
//!
//! This crate provides the foundational pieces shared by the symmetry
//! engine and the MTZ engine: a growable array, unit cell math, the
//! symmetry operator codec, the header record tokenizer and the session
//! context used for diagnostics.
//!

pub mod array;
pub mod cell;
pub mod context;
pub mod error;
pub mod parser;
pub mod symop;

pub use array::GrowableArray;
pub use cell::{CellDifference, HklCoefficients, UnitCell};
pub use context::{Context, Severity};
pub use error::{Error, Result};
pub use parser::{keymatch, Token, Tokenizer};
pub use symop::{operators_equal, operators_equal_ordered, parse_symop_list, Symop};
