//! Header editing: title, history, symmetry and dataset assignment.

use mtzkit_core::Symop;

use crate::error::{Error, Result};
use crate::model::{truncated, ColumnRef, DatasetRef, MissingValue, Mtz, BASE_NAME};

const TITLE_LEN: usize = 70;
const HISTORY_LEN: usize = 80;
const SPGNAME_LEN: usize = 20;
const PGNAME_LEN: usize = 10;
const COLSOURCE_LEN: usize = 36;

/// How reliably the spacegroup of a file is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpacegroupConfidence {
    /// Never set.
    #[default]
    Unset,
    /// Only the Bravais lattice is known.
    Bravais,
    /// The point group is known.
    PointGroup,
    /// Known up to the enantiomorph.
    Enantiomorph,
    /// The spacegroup is known.
    Spacegroup,
    /// Read from a file that did not say.
    Unknown,
}

impl SpacegroupConfidence {
    /// Parses the one-letter code written in `SYMINF` records.
    #[must_use]
    pub fn from_char(c: char) -> Self {
        match c {
            '\0' => Self::Unset,
            'L' => Self::Bravais,
            'P' => Self::PointGroup,
            'E' => Self::Enantiomorph,
            'S' => Self::Spacegroup,
            _ => Self::Unknown,
        }
    }

    /// One-letter code, NUL when unset.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Unset => '\0',
            Self::Bravais => 'L',
            Self::PointGroup => 'P',
            Self::Enantiomorph => 'E',
            Self::Spacegroup => 'S',
            Self::Unknown => 'X',
        }
    }
}

/// Symmetry recorded in a file header.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymmetryGroup {
    pub spacegroup_number: i32,
    /// Spacegroup name, at most 20 characters.
    pub name: String,
    /// Number of primitive operators.
    pub nsymp: usize,
    /// Lattice letter, NUL when unset.
    pub lattice_type: char,
    /// Point group name, at most 10 characters.
    pub point_group: String,
    pub confidence: SpacegroupConfidence,
    pub operators: Vec<Symop>,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\0'
}

impl Mtz {
    /// Replaces the title, or appends to it after a space when `append`
    /// is set. The result is capped at 70 characters.
    pub fn set_title(&mut self, title: &str, append: bool) {
        if !append {
            self.title = truncated(title, TITLE_LEN);
            return;
        }
        let mut t = truncated(self.title.trim_end_matches(' '), TITLE_LEN);
        let n = t.chars().count();
        if n > 0 && n < TITLE_LEN {
            t.push(' ');
        }
        let room = TITLE_LEN - t.chars().count();
        t.extend(title.chars().take(room));
        self.title = t;
    }

    /// Prepends history lines. Leading blanks are removed and blank lines
    /// dropped. Returns the new number of history lines.
    pub fn add_history<S: AsRef<str>>(&mut self, lines: &[S]) -> usize {
        let mut history: Vec<String> = lines
            .iter()
            .map(|l| truncated(l.as_ref(), HISTORY_LEN))
            .map(|l| l.trim_start_matches(' ').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        history.append(&mut self.history);
        self.history = history;
        self.history.len()
    }

    /// Updates the header symmetry. Empty operators, a blank lattice
    /// letter, spacegroup number 0 and empty names leave the existing
    /// values unchanged.
    pub fn set_symmetry(
        &mut self,
        operators: &[Symop],
        nsymp: usize,
        lattice_type: char,
        spacegroup_number: i32,
        name: &str,
        point_group: &str,
    ) {
        let sym = &mut self.symmetry;
        if !operators.is_empty() {
            sym.operators = operators.to_vec();
            sym.nsymp = nsymp;
        }
        if !is_blank(lattice_type) {
            sym.lattice_type = lattice_type;
        }
        if spacegroup_number != 0 {
            sym.spacegroup_number = spacegroup_number;
        }
        if !name.is_empty() {
            sym.name = truncated(name, SPGNAME_LEN);
        }
        if !point_group.is_empty() {
            sym.point_group = truncated(point_group, PGNAME_LEN);
        }
    }

    /// Sets the spacegroup confidence from its one-letter code; a blank
    /// code is ignored.
    pub fn set_symmetry_confidence(&mut self, code: char) {
        if !is_blank(code) {
            self.symmetry.confidence = SpacegroupConfidence::from_char(code);
        }
    }

    pub fn set_sort_order(&mut self, columns: [Option<ColumnRef>; 5]) {
        self.sort_order = columns;
    }

    pub fn set_missing_value(&mut self, missing: MissingValue) {
        self.missing = missing;
    }

    pub fn set_xml(&mut self, xml: Option<String>) {
        self.xml = xml;
    }

    /// Stamps the provenance string on every column created in memory.
    pub fn stamp_column_sources(&mut self, stamp: &str) {
        let stamp = truncated(&stamp.replace(' ', "_"), COLSOURCE_LEN);
        for c in &mut self.columns {
            if c.source == 0 {
                c.colsource.clone_from(&stamp);
            }
        }
    }

    /// Makes sure `/crystal/dataset` exists, creating the crystal or the
    /// dataset as needed. An existing crystal takes a non-empty project
    /// name and a cell with a positive first edge; an existing dataset
    /// takes a positive wavelength.
    ///
    /// # Errors
    ///
    /// Propagates capacity errors from creating crystals or datasets.
    pub fn assign_dataset(
        &mut self,
        crystal: &str,
        dataset: &str,
        project: &str,
        cell: [f32; 6],
        wavelength: f32,
    ) -> Result<DatasetRef> {
        let Some(x) = self.crystal_lookup(crystal) else {
            let x = self.add_crystal(crystal, project, cell)?;
            return self.add_dataset(x, dataset, wavelength);
        };
        let xtal = &mut self.crystals[x];
        if !project.is_empty() {
            xtal.project = truncated(project, crate::model::NAME_LEN);
        }
        if cell[0] > 0.0 {
            xtal.cell = cell;
        }
        let path = format!("/{}/{}", xtal.name, dataset);
        match self.dataset_lookup(&path) {
            Some(set) => {
                if wavelength > 0.0 {
                    if let Some(s) = self.dataset_mut(set) {
                        s.wavelength = wavelength;
                    }
                }
                Ok(set)
            }
            None => self.add_dataset(x, dataset, wavelength),
        }
    }

    /// Moves a column to `/crystal/dataset`, creating the crystal (with
    /// the crystal name as project and a zero cell) or the dataset if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParamError`] for empty names or an unknown column.
    pub fn assign_column(&mut self, col: ColumnRef, crystal: &str, dataset: &str) -> Result<()> {
        if crystal.is_empty() || dataset.is_empty() {
            return Err(Error::ParamError(
                "crystal and dataset names must not be empty".into(),
            ));
        }
        let old = self
            .column_dataset(col)
            .ok_or_else(|| Error::ParamError(format!("column {} is in no dataset", col.index())))?;
        let path = format!("/{crystal}/{dataset}");
        if self
            .dataset_path(old)
            .is_some_and(|p| crate::path::path_match(&path, &p))
        {
            return Ok(());
        }

        if let Some(s) = self.dataset_mut(old) {
            s.columns.retain(|&c| c != col);
        }
        let set = match self.dataset_lookup(&path) {
            Some(set) => set,
            None => {
                let x = match self.crystal_lookup(crystal) {
                    Some(x) => x,
                    None => self.add_crystal(crystal, crystal, [0.0; 6])?,
                };
                self.add_dataset(x, dataset, 0.0)?
            }
        };
        if let Some(s) = self.dataset_mut(set) {
            s.columns.push(col);
        }
        Ok(())
    }

    /// Moves the first three columns of type `H` into the base dataset,
    /// if the file has one.
    ///
    /// # Errors
    ///
    /// As for [`Mtz::assign_column`].
    pub fn assign_hkl_to_base(&mut self) -> Result<()> {
        let base = format!("{BASE_NAME}/{BASE_NAME}");
        if self.dataset_lookup(&base).is_none() {
            return Ok(());
        }
        let hkl: Vec<ColumnRef> = self
            .column_refs()
            .filter(|c| self.columns[c.0].col_type == "H")
            .take(3)
            .collect();
        for c in hkl {
            self.assign_column(c, BASE_NAME, BASE_NAME)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title() {
        let mut mtz = Mtz::new();
        mtz.set_title("first part   ", false);
        mtz.set_title("second", true);
        assert_eq!(mtz.title, "first part second");

        mtz.set_title(&"x".repeat(69), false);
        mtz.set_title("more", true);
        assert_eq!(mtz.title.len(), 70);
        assert!(mtz.title.ends_with(' '));

        mtz.set_title("", false);
        mtz.set_title(&"y".repeat(80), true);
        assert_eq!(mtz.title, "y".repeat(70));
    }

    #[test]
    fn test_history_order() {
        let mut mtz = Mtz::new();
        mtz.add_history(&["old line"]);
        let n = mtz.add_history(&["   newest", "", "   ", "second"]);
        assert_eq!(n, 3);
        assert_eq!(mtz.history, vec!["newest", "second", "old line"]);
    }

    #[test]
    fn test_symmetry_update() {
        let mut mtz = Mtz::new();
        let ops = mtzkit_core::parse_symop_list("x,y,z * -x,y+1/2,-z").unwrap();
        mtz.set_symmetry(&ops, 2, 'P', 4, "P 1 21 1", "PG2");
        mtz.set_symmetry(&[], 0, ' ', 0, "", "");
        assert_eq!(mtz.symmetry.operators.len(), 2);
        assert_eq!(mtz.symmetry.lattice_type, 'P');
        assert_eq!(mtz.symmetry.spacegroup_number, 4);
        assert_eq!(mtz.symmetry.name, "P 1 21 1");

        mtz.set_symmetry_confidence(' ');
        assert_eq!(mtz.symmetry.confidence, SpacegroupConfidence::Unset);
        mtz.set_symmetry_confidence('E');
        assert_eq!(mtz.symmetry.confidence.as_char(), 'E');
    }

    #[test]
    fn test_assign_dataset_and_column() {
        let mut mtz = Mtz::new();
        let cell = [50.0, 60.0, 70.0, 90.0, 90.0, 90.0];
        let set = mtz.assign_dataset("xtal", "native", "proj", cell, 1.54).unwrap();
        let again = mtz.assign_dataset("xtal", "native", "", [0.0; 6], 0.98).unwrap();
        assert_eq!(set, again);
        assert_eq!(mtz.dataset(set).unwrap().wavelength, 0.98);
        assert_eq!(mtz.crystal(set.crystal).unwrap().cell, cell);
        assert_eq!(mtz.crystal(set.crystal).unwrap().project, "proj");

        let h = mtz.add_column(set, "H", "H").unwrap();
        let f = mtz.add_column(set, "F", "F").unwrap();
        mtz.assign_hkl_to_base().unwrap();
        assert_eq!(mtz.column_dataset(h), Some(DatasetRef::new(0, 0)));

        mtz.assign_column(f, "other", "peak").unwrap();
        let moved = mtz.column_dataset(f).unwrap();
        assert_eq!(mtz.dataset_path(moved).as_deref(), Some("/other/peak"));
        assert_eq!(mtz.crystal(moved.crystal).unwrap().project, "other");
        assert!(mtz.assign_column(f, "", "peak").is_err());
    }

    #[test]
    fn test_column_source_stamp() {
        let mut mtz = Mtz::new();
        let c = mtz.add_column(DatasetRef::new(0, 0), "H", "H").unwrap();
        mtz.stamp_column_sources("CREATED 01/02/2024 10:00:00");
        assert_eq!(mtz.column(c).unwrap().colsource, "CREATED_01/02/2024_10:00:00");
    }
}
