//! The reflection-file hierarchy.
//!
//! An [`Mtz`] holds crystals, each crystal holds datasets, and each
//! dataset refers to columns by [`ColumnRef`]. Columns live in a single
//! arena owned by the file so that a column can move between datasets
//! without invalidating references held by callers.

use log::debug;
use mtzkit_core::GrowableArray;

use crate::batch::BatchList;
use crate::editing::SymmetryGroup;
use crate::error::{Error, Result};

/// Maximum number of crystals in one file.
pub const MAX_CRYSTALS: usize = 100;
/// Maximum number of datasets in one file.
pub const MAX_DATASETS: usize = 1000;
/// Maximum number of columns in one dataset.
pub const MAX_COLUMNS: usize = 10000;

/// Name of the base crystal and dataset holding the Miller indices.
pub const BASE_NAME: &str = "HKL_base";

pub(crate) const LABEL_LEN: usize = 30;
pub(crate) const TYPE_LEN: usize = 2;
pub(crate) const NAME_LEN: usize = 64;

/// Capacity reserved for column arrays of a file with no reflections yet.
const INITIAL_REFLECTIONS: usize = 2000;

pub(crate) fn truncated(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// The CCP4 missing-number fill pattern, a quiet NaN.
#[must_use]
pub fn ccp4_nan() -> f32 {
    f32::from_bits(0xfffa_5a5a)
}

/// Missing-number flag of a file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MissingValue {
    /// Missing data is stored as NaN.
    #[default]
    NaN,
    /// Missing data is stored as this exact value.
    Value(f32),
}

impl MissingValue {
    /// Value written for missing data.
    #[must_use]
    pub fn fill(self) -> f32 {
        match self {
            Self::NaN => ccp4_nan(),
            Self::Value(v) => v,
        }
    }

    /// True when `value` denotes missing data.
    ///
    /// In NaN mode any value with all exponent bits set counts, so both
    /// NaN and infinity are missing.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_missing(self, value: f32) -> bool {
        match self {
            Self::NaN => (value.to_bits() & 0x7f80_0000) == 0x7f80_0000,
            Self::Value(v) => value == v,
        }
    }
}

/// Stable reference to a column of an [`Mtz`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnRef(pub(crate) usize);

impl ColumnRef {
    /// Position of the column in the file's column arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Position of a dataset: crystal index, then dataset index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetRef {
    pub crystal: usize,
    pub dataset: usize,
}

impl DatasetRef {
    #[must_use]
    pub fn new(crystal: usize, dataset: usize) -> Self {
        Self { crystal, dataset }
    }
}

/// One column of reflection data.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Column {
    /// Label, at most 30 characters.
    pub label: String,
    /// Type code, at most 2 characters.
    pub col_type: String,
    pub active: bool,
    /// 1-based position in the file the column was read from, 0 if new.
    pub source: usize,
    pub min: f32,
    pub max: f32,
    /// Values, held only when reflections are in memory.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub values: GrowableArray<f32>,
    /// Provenance string, at most 36 characters.
    pub colsource: String,
    pub group_name: String,
    pub group_type: String,
    /// Position within the group, -1 when ungrouped.
    pub group_position: i32,
}

impl Column {
    fn new(label: &str, col_type: &str) -> Self {
        Self {
            label: truncated(label, LABEL_LEN),
            col_type: truncated(col_type, TYPE_LEN),
            active: true,
            source: 0,
            min: 1.0e6,
            max: -1.0e6,
            values: GrowableArray::new(),
            colsource: String::new(),
            group_name: String::new(),
            group_type: String::new(),
            group_position: -1,
        }
    }

    /// First character of the type code, blank if unset.
    #[must_use]
    pub fn type_char(&self) -> char {
        self.col_type.chars().next().unwrap_or(' ')
    }
}

/// A dataset: a set of columns measured at one wavelength.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    pub id: i32,
    pub name: String,
    pub wavelength: f32,
    pub(crate) columns: Vec<ColumnRef>,
}

impl Dataset {
    /// Columns of this dataset in order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

/// A crystal with its cell and datasets.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Crystal {
    pub id: i32,
    pub name: String,
    pub project: String,
    pub cell: [f32; 6],
    /// Lowest resolution as 1/d^2.
    pub resmin: f32,
    /// Highest resolution as 1/d^2.
    pub resmax: f32,
    pub(crate) datasets: Vec<Dataset>,
}

impl Crystal {
    /// Datasets of this crystal in order.
    #[must_use]
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }
}

/// An MTZ reflection file held in memory.
#[derive(Debug, Clone)]
pub struct Mtz {
    /// Title, at most 70 characters.
    pub title: String,
    /// History lines, newest first.
    pub history: Vec<String>,
    pub(crate) crystals: Vec<Crystal>,
    pub(crate) columns: Vec<Column>,
    /// Number of columns in the file the model was read from.
    pub ncol_read: usize,
    /// Number of reflections.
    pub nref: usize,
    /// Number of reflections in the file the model was read from.
    pub nref_filein: usize,
    pub(crate) refs_in_memory: bool,
    /// Number of batches read from file.
    pub n_orig_bat: usize,
    /// Highest resolution written, as 1/d^2.
    pub resmax_out: f32,
    /// Lowest resolution written, as 1/d^2.
    pub resmin_out: f32,
    pub missing: MissingValue,
    pub symmetry: SymmetryGroup,
    pub(crate) batches: BatchList,
    /// Columns of the sort order, major key first.
    pub sort_order: [Option<ColumnRef>; 5],
    /// Trailing XML metadata.
    pub xml: Option<String>,
    /// Header records with unrecognised keywords, kept verbatim.
    pub unknown_headers: Vec<String>,
}

impl Default for Mtz {
    fn default() -> Self {
        Self::new()
    }
}

impl Mtz {
    /// Creates an empty file holding only the `HKL_base` crystal and
    /// dataset, both with id 0.
    #[must_use]
    pub fn new() -> Self {
        let mut mtz = Self::empty();
        mtz.crystals.push(Crystal {
            id: 0,
            name: BASE_NAME.to_string(),
            project: BASE_NAME.to_string(),
            cell: [0.0; 6],
            resmin: 100.0,
            resmax: 0.0,
            datasets: vec![Dataset {
                id: 0,
                name: BASE_NAME.to_string(),
                wavelength: 0.0,
                columns: Vec::new(),
            }],
        });
        mtz
    }

    /// Creates a file with `nset[i]` placeholder datasets in each of
    /// `nset.len()` placeholder crystals, ready to be filled in from a
    /// file header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the layout exceeds the
    /// crystal or dataset limits.
    pub fn with_layout(nset: &[usize]) -> Result<Self> {
        let mut mtz = Self::empty();
        for &n in nset {
            let x = mtz.add_crystal("NULL_xname", "NULL_pname", [0.0; 6])?;
            for _ in 0..n {
                mtz.add_dataset(x, "NULL_dname", 0.0)?;
            }
        }
        Ok(mtz)
    }

    fn empty() -> Self {
        Self {
            title: String::new(),
            history: Vec::new(),
            crystals: Vec::new(),
            columns: Vec::new(),
            ncol_read: 0,
            nref: 0,
            nref_filein: 0,
            refs_in_memory: true,
            n_orig_bat: 0,
            resmax_out: 0.0,
            resmin_out: 999.0,
            missing: MissingValue::NaN,
            symmetry: SymmetryGroup::default(),
            batches: BatchList::default(),
            sort_order: [None; 5],
            xml: None,
            unknown_headers: Vec::new(),
        }
    }

    /// Adds a crystal and returns its index. The id is one more than the
    /// largest id in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] beyond [`MAX_CRYSTALS`].
    pub fn add_crystal(&mut self, name: &str, project: &str, cell: [f32; 6]) -> Result<usize> {
        if self.crystals.len() >= MAX_CRYSTALS {
            return Err(Error::CapacityExceeded {
                what: "crystals",
                limit: MAX_CRYSTALS,
            });
        }
        let id = self.crystals.iter().map(|x| x.id).max().map_or(1, |m| m + 1);
        self.crystals.push(Crystal {
            id,
            name: truncated(name, NAME_LEN),
            project: truncated(project, NAME_LEN),
            cell,
            resmin: 100.0,
            resmax: 0.0,
            datasets: Vec::new(),
        });
        Ok(self.crystals.len() - 1)
    }

    /// Adds a dataset to crystal `crystal`. The base dataset gets id 0,
    /// every other one one more than the largest id in the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParamError`] for an unknown crystal and
    /// [`Error::CapacityExceeded`] beyond [`MAX_DATASETS`].
    pub fn add_dataset(&mut self, crystal: usize, name: &str, wavelength: f32) -> Result<DatasetRef> {
        if crystal >= self.crystals.len() {
            return Err(Error::ParamError(format!("no crystal at index {crystal}")));
        }
        if self.num_datasets() >= MAX_DATASETS {
            return Err(Error::CapacityExceeded {
                what: "datasets",
                limit: MAX_DATASETS,
            });
        }
        let id = if name == BASE_NAME {
            0
        } else {
            self.crystals
                .iter()
                .flat_map(|x| x.datasets.iter())
                .map(|s| s.id)
                .max()
                .map_or(1, |m| m + 1)
        };
        let xtal = &mut self.crystals[crystal];
        xtal.datasets.push(Dataset {
            id,
            name: truncated(name, NAME_LEN),
            wavelength,
            columns: Vec::new(),
        });
        Ok(DatasetRef::new(crystal, xtal.datasets.len() - 1))
    }

    /// Adds an active column to a dataset, filled with the missing-number
    /// flag when reflections are in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullDataset`] for an unknown dataset and
    /// [`Error::CapacityExceeded`] beyond [`MAX_COLUMNS`] in the dataset.
    pub fn add_column(&mut self, set: DatasetRef, label: &str, col_type: &str) -> Result<ColumnRef> {
        let fill = self.missing.fill();
        let (nref, in_memory) = (self.nref, self.refs_in_memory);
        let n = self
            .dataset(set)
            .ok_or_else(|| Error::NullDataset(format!("{set:?}")))?
            .columns
            .len();
        if n >= MAX_COLUMNS {
            return Err(Error::CapacityExceeded {
                what: "columns",
                limit: MAX_COLUMNS,
            });
        }

        let mut column = Column::new(&crate::labels::internal_label(label, col_type), col_type);
        if in_memory {
            column.values = GrowableArray::with_capacity(if nref == 0 { INITIAL_REFLECTIONS } else { nref });
            column.values.append_n(fill, nref);
        }
        let cref = ColumnRef(self.columns.len());
        self.columns.push(column);
        if let Some(s) = self.dataset_mut(set) {
            s.columns.push(cref);
        }
        Ok(cref)
    }

    /// Flips the active flag of a column and returns the new state.
    pub fn toggle_column(&mut self, col: ColumnRef) -> bool {
        match self.columns.get_mut(col.0) {
            Some(c) => {
                c.active = !c.active;
                c.active
            }
            None => false,
        }
    }

    /// Crystals in order.
    #[must_use]
    pub fn crystals(&self) -> &[Crystal] {
        &self.crystals
    }

    #[must_use]
    pub fn crystal(&self, i: usize) -> Option<&Crystal> {
        self.crystals.get(i)
    }

    pub fn crystal_mut(&mut self, i: usize) -> Option<&mut Crystal> {
        self.crystals.get_mut(i)
    }

    #[must_use]
    pub fn dataset(&self, set: DatasetRef) -> Option<&Dataset> {
        self.crystals.get(set.crystal)?.datasets.get(set.dataset)
    }

    pub fn dataset_mut(&mut self, set: DatasetRef) -> Option<&mut Dataset> {
        self.crystals.get_mut(set.crystal)?.datasets.get_mut(set.dataset)
    }

    #[must_use]
    pub fn column(&self, col: ColumnRef) -> Option<&Column> {
        self.columns.get(col.0)
    }

    pub fn column_mut(&mut self, col: ColumnRef) -> Option<&mut Column> {
        self.columns.get_mut(col.0)
    }

    /// All columns in arena order, for bulk updates.
    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Every dataset in hierarchy order.
    pub fn dataset_refs(&self) -> impl Iterator<Item = DatasetRef> + '_ {
        self.crystals.iter().enumerate().flat_map(|(x, xtal)| {
            (0..xtal.datasets.len()).map(move |s| DatasetRef::new(x, s))
        })
    }

    /// Every column in hierarchy order: crystal, then dataset, then column.
    pub fn column_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.crystals
            .iter()
            .flat_map(|x| x.datasets.iter())
            .flat_map(|s| s.columns.iter().copied())
    }

    /// Dataset currently holding a column.
    #[must_use]
    pub fn column_dataset(&self, col: ColumnRef) -> Option<DatasetRef> {
        self.dataset_refs()
            .find(|&set| self.dataset(set).is_some_and(|s| s.columns.contains(&col)))
    }

    /// True when reflection values are held in the column arrays.
    #[must_use]
    pub fn refs_in_memory(&self) -> bool {
        self.refs_in_memory
    }

    /// Switches between in-memory and streaming mode. Leaving memory mode
    /// releases every column array.
    pub fn set_reflections_in_memory(&mut self, in_memory: bool) {
        self.refs_in_memory = in_memory;
        if !in_memory {
            debug!("releasing {} column arrays for streaming mode", self.columns.len());
            for c in &mut self.columns {
                c.values = GrowableArray::new();
            }
        }
    }

    /// True when `value` is the file's missing-number flag.
    #[must_use]
    pub fn is_missing(&self, value: f32) -> bool {
        self.missing.is_missing(value)
    }

    #[must_use]
    pub fn num_crystals(&self) -> usize {
        self.crystals.len()
    }

    #[must_use]
    pub fn num_datasets(&self) -> usize {
        self.crystals.iter().map(|x| x.datasets.len()).sum()
    }

    /// Number of columns in all datasets, active or not.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.column_refs().count()
    }

    /// Number of columns that were read from file.
    #[must_use]
    pub fn num_source_columns(&self) -> usize {
        self.column_refs()
            .filter(|&c| self.columns[c.0].source != 0)
            .count()
    }

    #[must_use]
    pub fn num_active_columns(&self) -> usize {
        self.column_refs().filter(|&c| self.columns[c.0].active).count()
    }

    /// Number of active columns in one dataset.
    #[must_use]
    pub fn num_active_columns_in_dataset(&self, set: DatasetRef) -> usize {
        self.dataset(set).map_or(0, |s| {
            s.columns.iter().filter(|c| self.columns[c.0].active).count()
        })
    }

    /// A dataset is active if it has active columns or batches.
    #[must_use]
    pub fn is_dataset_active(&self, set: DatasetRef) -> bool {
        self.num_active_columns_in_dataset(set) > 0 || self.num_batches_in_dataset(set) > 0
    }

    #[must_use]
    pub fn num_active_datasets(&self) -> usize {
        self.dataset_refs().filter(|&s| self.is_dataset_active(s)).count()
    }

    /// Number of active datasets in one crystal.
    #[must_use]
    pub fn num_active_datasets_in_crystal(&self, crystal: usize) -> usize {
        self.crystals.get(crystal).map_or(0, |x| {
            (0..x.datasets.len())
                .filter(|&s| self.is_dataset_active(DatasetRef::new(crystal, s)))
                .count()
        })
    }

    #[must_use]
    pub fn num_active_crystals(&self) -> usize {
        (0..self.crystals.len())
            .filter(|&x| self.num_active_datasets_in_crystal(x) > 0)
            .count()
    }

    /// Highest and lowest resolution over all crystals, as
    /// `(minres, maxres)` in 1/d^2.
    #[must_use]
    pub fn resolution_limits(&self) -> (f32, f32) {
        self.crystals.iter().fold((100.0, 0.0), |(min, max), x| {
            (min.min(x.resmin), max.max(x.resmax))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_base() {
        let mtz = Mtz::new();
        assert_eq!(mtz.num_crystals(), 1);
        assert_eq!(mtz.num_datasets(), 1);
        assert_eq!(mtz.crystals()[0].name, BASE_NAME);
        assert_eq!(mtz.crystals()[0].datasets()[0].id, 0);
        assert!(mtz.refs_in_memory());
        assert_eq!(mtz.resmin_out, 999.0);
    }

    #[test]
    fn test_ids() {
        let mut mtz = Mtz::new();
        let x = mtz.add_crystal("xtal", "proj", [10.0, 20.0, 30.0, 90.0, 90.0, 90.0]).unwrap();
        assert_eq!(mtz.crystals()[x].id, 1);
        let a = mtz.add_dataset(x, "native", 1.0).unwrap();
        let b = mtz.add_dataset(x, "deriv", 1.1).unwrap();
        assert_eq!(mtz.dataset(a).unwrap().id, 1);
        assert_eq!(mtz.dataset(b).unwrap().id, 2);
        let base = mtz.add_dataset(x, BASE_NAME, 0.0).unwrap();
        assert_eq!(mtz.dataset(base).unwrap().id, 0);
    }

    #[test]
    fn test_add_column_fills_missing() {
        let mut mtz = Mtz::new();
        mtz.nref = 3;
        let base = DatasetRef::new(0, 0);
        let h = mtz.add_column(base, "H", "H").unwrap();
        let c = mtz.column(h).unwrap();
        assert_eq!(c.values.len(), 3);
        assert!(mtz.is_missing(c.values[0]));
        assert_eq!(c.group_position, -1);
        assert_eq!(c.source, 0);
        assert!(c.active);

        let long = "A".repeat(40);
        let col = mtz.add_column(base, &long, "FQR").unwrap();
        assert_eq!(mtz.column(col).unwrap().label.len(), 30);
        assert_eq!(mtz.column(col).unwrap().col_type, "FQ");
    }

    #[test]
    fn test_active_counts() {
        let mut mtz = Mtz::new();
        let x = mtz.add_crystal("x", "p", [0.0; 6]).unwrap();
        let set = mtz.add_dataset(x, "d", 0.0).unwrap();
        assert_eq!(mtz.num_active_datasets(), 0);
        let f = mtz.add_column(set, "F", "F").unwrap();
        assert_eq!(mtz.num_active_crystals(), 1);
        assert!(!mtz.toggle_column(f));
        assert_eq!(mtz.num_active_columns(), 0);
        assert_eq!(mtz.num_columns(), 1);
        assert_eq!(mtz.num_active_crystals(), 0);
        assert_eq!(mtz.column_dataset(f), Some(set));
    }

    #[test]
    fn test_missing_modes() {
        assert!(MissingValue::NaN.is_missing(ccp4_nan()));
        assert!(MissingValue::NaN.is_missing(f32::INFINITY));
        assert!(!MissingValue::NaN.is_missing(0.0));
        assert!(MissingValue::Value(-999.0).is_missing(-999.0));
        assert!(!MissingValue::Value(-999.0).is_missing(f32::NAN));
    }

    #[test]
    fn test_layout_and_limits() {
        let mtz = Mtz::with_layout(&[1, 2]).unwrap();
        assert_eq!(mtz.num_crystals(), 2);
        assert_eq!(mtz.num_datasets(), 3);
        assert_eq!(mtz.crystals()[1].id, 2);

        let too_many = vec![0; MAX_CRYSTALS + 1];
        assert!(matches!(
            Mtz::with_layout(&too_many),
            Err(Error::CapacityExceeded { what: "crystals", .. })
        ));
    }
}
