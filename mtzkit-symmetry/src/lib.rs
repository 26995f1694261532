//! mtzkit-symmetry: Spacegroup symmetry engine.
//!
//! Spacegroups are loaded from a `syminfo.lib` reference table by
//! number, name or operator set. A loaded [`Spacegroup`] answers
//! asymmetric-unit, centric, epsilon and systematic-absence queries and
//! maps reflections to and from the asymmetric unit.
//!

pub mod asu;
pub mod error;
pub mod grid;
pub mod names;
pub mod origins;
pub mod spacegroup;
pub mod syminfo;
pub mod zones;

pub use asu::{AsuKind, LaueClass};
pub use error::{Error, Result};
pub use grid::{all_factors_le_19, grid_sample, range_to_limits};
pub use names::{centering_operators, de_colon, name_equal, name_equal_to_lib, pgname_equal, to_short_name};
pub use origins::{generate_alternate_origins, AlternateOrigins};
pub use spacegroup::{check_symmetry_cell, phase_shift, CrystalSystem, Spacegroup};
pub use syminfo::{SpacegroupQuery, SyminfoLocation, SyminfoTable};
