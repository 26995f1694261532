//! Reflection records and resolution bookkeeping.
//!
//! Reflections are numbered from 1. In memory mode values live in the
//! column arrays; in streaming mode the caller supplies raw file rows
//! and receives output rows back.

use log::debug;
use mtzkit_core::HklCoefficients;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::{ColumnRef, Mtz};

/// Values of one reflection with its resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reflection {
    /// Resolution as 1/d^2, clamped to the limits of the reference crystal.
    pub resolution: f32,
    pub values: Vec<f32>,
    /// True where the value is the missing-number flag.
    pub missing: Vec<bool>,
}

#[allow(clippy::cast_possible_truncation)]
fn index_value(v: f32) -> i32 {
    v as i32
}

impl Mtz {
    /// Columns holding h, k and l.
    ///
    /// The last columns of type `H` whose labels start with `H`, `K` and
    /// `L` win; the dataset of the `H` column is used for all three.
    /// Without such columns the first three columns of the first dataset
    /// are assumed.
    #[must_use]
    pub fn find_index_columns(&self) -> Option<[ColumnRef; 3]> {
        let (mut xtal, mut set) = (0, 0);
        let mut pos = [0, 1, 2];
        for (x, crystal) in self.crystals.iter().enumerate() {
            for (s, dataset) in crystal.datasets.iter().enumerate() {
                for (k, c) in dataset.columns.iter().enumerate() {
                    let col = &self.columns[c.0];
                    if col.type_char() != 'H' {
                        continue;
                    }
                    match col.label.chars().next() {
                        Some('H') => {
                            xtal = x;
                            set = s;
                            pos[0] = k;
                        }
                        Some('K') => pos[1] = k,
                        Some('L') => pos[2] = k,
                        _ => {}
                    }
                }
            }
        }
        let cols = &self.crystals.get(xtal)?.datasets.get(set)?.columns;
        Some([*cols.get(pos[0])?, *cols.get(pos[1])?, *cols.get(pos[2])?])
    }

    /// First crystal with a usable cell and its resolution coefficients.
    fn reference_crystal(&self) -> Option<(usize, HklCoefficients)> {
        let x = self.crystals.iter().position(|x| x.cell[0] > 0.001)?;
        let coef = HklCoefficients::from_cell(&self.crystals[x].cell).ok()?;
        Some((x, coef))
    }

    fn clamped_resolution(&self, hkl: [i32; 3]) -> f32 {
        let Some((x, coef)) = self.reference_crystal() else {
            return 0.0;
        };
        let xtal = &self.crystals[x];
        let mut res = coef.resolution(hkl);
        if res > xtal.resmax {
            res = xtal.resmax;
        }
        if res < xtal.resmin {
            res = xtal.resmin;
        }
        res
    }

    /// Reads reflection `iref` in file column order from memory.
    ///
    /// Only columns that came from the file are filled, at their source
    /// positions. Returns `None` past the last reflection or when
    /// reflections are not in memory.
    #[must_use]
    pub fn read_reflection(&self, iref: usize) -> Option<Reflection> {
        if !self.refs_in_memory || iref == 0 || iref > self.nref {
            return None;
        }
        Some(self.file_order_reflection(|col| col.values.get(iref - 1).copied()))
    }

    /// Decodes a raw file row in file column order.
    #[must_use]
    pub fn reflection_from_row(&self, row: &[f32]) -> Reflection {
        self.file_order_reflection(|col| row.get(col.source - 1).copied())
    }

    fn file_order_reflection<F>(&self, value: F) -> Reflection
    where
        F: Fn(&crate::model::Column) -> Option<f32>,
    {
        let width = self
            .columns
            .iter()
            .map(|c| c.source)
            .max()
            .unwrap_or(0)
            .max(self.ncol_read);
        let mut refl = Reflection {
            resolution: 0.0,
            values: vec![0.0; width],
            missing: vec![false; width],
        };
        let mut hkl = [0; 3];
        for c in self.column_refs() {
            let col = &self.columns[c.0];
            if col.source == 0 {
                continue;
            }
            let v = value(col).unwrap_or_else(|| self.missing.fill());
            refl.values[col.source - 1] = v;
            refl.missing[col.source - 1] = self.is_missing(v);
            if col.type_char() == 'H' {
                match col.label.as_str() {
                    "H" => hkl[0] = index_value(v),
                    "K" => hkl[1] = index_value(v),
                    "L" => hkl[2] = index_value(v),
                    _ => {}
                }
            }
        }
        refl.resolution = self.clamped_resolution(hkl);
        refl
    }

    /// Reads reflection `iref` from memory with values in `lookup` order.
    /// Unassigned lookup entries read as missing.
    #[must_use]
    pub fn read_reflection_lookup(&self, lookup: &[Option<ColumnRef>], iref: usize) -> Option<Reflection> {
        if !self.refs_in_memory || iref == 0 || iref > self.nref {
            return None;
        }
        Some(self.lookup_order_reflection(lookup, |col| col.values.get(iref - 1).copied()))
    }

    /// Decodes a raw file row with values in `lookup` order. Columns not
    /// present in the file read as missing.
    #[must_use]
    pub fn lookup_from_row(&self, lookup: &[Option<ColumnRef>], row: &[f32]) -> Reflection {
        self.lookup_order_reflection(lookup, |col| {
            if col.source == 0 {
                None
            } else {
                row.get(col.source - 1).copied()
            }
        })
    }

    fn lookup_order_reflection<F>(&self, lookup: &[Option<ColumnRef>], value: F) -> Reflection
    where
        F: Fn(&crate::model::Column) -> Option<f32>,
    {
        let fill = self.missing.fill();
        let mut refl = Reflection {
            resolution: 0.0,
            values: vec![fill; lookup.len()],
            missing: vec![true; lookup.len()],
        };
        for (i, c) in lookup.iter().enumerate() {
            let Some(col) = c.and_then(|c| self.columns.get(c.0)) else {
                continue;
            };
            if let Some(v) = value(col) {
                refl.values[i] = v;
                refl.missing[i] = self.is_missing(v);
            }
        }
        let hkl = self.lookup_indices(lookup, &refl.values);
        refl.resolution = self.clamped_resolution(hkl);
        refl
    }

    fn lookup_indices(&self, lookup: &[Option<ColumnRef>], values: &[f32]) -> [i32; 3] {
        let value = |l: usize| values.get(l).copied().map_or(0, index_value);
        let leading_h = lookup.len() >= 3
            && lookup[..3].iter().all(|c| {
                c.and_then(|c| self.columns.get(c.0))
                    .is_some_and(|col| col.type_char() == 'H')
            });
        if leading_h {
            return [value(0), value(1), value(2)];
        }
        let mut hkl = [0; 3];
        if let Some(ind) = self.find_index_columns() {
            for (l, c) in lookup.iter().enumerate() {
                for (axis, col) in ind.iter().enumerate() {
                    if *c == Some(*col) {
                        hkl[axis] = value(l);
                    }
                }
            }
        }
        hkl
    }

    /// Writes reflection `iref` from `values` in `lookup` order.
    ///
    /// In memory mode the column arrays grow as needed and `Ok(None)` is
    /// returned. Otherwise the row of active columns is returned for the
    /// caller to write, and the crystal and output resolution limits are
    /// updated. Column ranges restart at `iref == 1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParamError`] for `iref == 0`.
    pub fn write_reflection(
        &mut self,
        iref: usize,
        values: &[f32],
        lookup: &[Option<ColumnRef>],
    ) -> Result<Option<Vec<f32>>> {
        if iref == 0 {
            return Err(Error::ParamError("reflections are numbered from 1".into()));
        }
        let fill = self.missing.fill();
        if self.refs_in_memory && iref > self.nref {
            for c in &mut self.columns {
                if c.values.len() < iref {
                    c.values.resize_with_value(iref, fill);
                }
            }
        }

        let (missing, in_memory) = (self.missing, self.refs_in_memory);
        for (&c, &v) in lookup.iter().zip(values) {
            let Some(col) = c.and_then(|c| self.columns.get_mut(c.0)) else {
                continue;
            };
            if in_memory {
                if let Some(slot) = col.values.get_mut(iref - 1) {
                    *slot = v;
                }
            }
            if iref == 1 {
                col.min = f32::MAX;
                col.max = -f32::MAX;
            }
            if !missing.is_missing(v) {
                if v < col.min {
                    col.min = v;
                }
                if v > col.max {
                    col.max = v;
                }
            }
        }

        let row = if self.refs_in_memory {
            None
        } else {
            let row: Vec<f32> = self
                .column_refs()
                .filter(|c| self.columns[c.0].active)
                .map(|c| {
                    lookup
                        .iter()
                        .position(|l| *l == Some(c))
                        .and_then(|l| values.get(l).copied())
                        .unwrap_or(fill)
                })
                .collect();
            let hkl = self.lookup_indices(lookup, values);
            self.extend_output_limits(hkl);
            Some(row)
        };

        self.nref = self.nref.max(iref);
        Ok(row)
    }

    fn extend_output_limits(&mut self, hkl: [i32; 3]) {
        for xtal in &mut self.crystals {
            if xtal.cell[0] <= 0.001 {
                continue;
            }
            let Ok(coef) = HklCoefficients::from_cell(&xtal.cell) else {
                continue;
            };
            let res = coef.resolution(hkl);
            if res > 0.0 {
                xtal.resmax = xtal.resmax.max(res);
                xtal.resmin = xtal.resmin.min(res);
                self.resmax_out = self.resmax_out.max(res);
                self.resmin_out = self.resmin_out.min(res);
            }
        }
    }

    /// Removes reflection `iref` from every column. Only possible in
    /// memory mode; returns false otherwise.
    pub fn delete_reflection(&mut self, iref: usize) -> bool {
        if !self.refs_in_memory || iref == 0 || iref > self.nref {
            debug!(
                "cannot delete reflection {} (nref {}, in memory {})",
                iref, self.nref, self.refs_in_memory
            );
            return false;
        }
        for c in &mut self.columns {
            c.values.delete_ordered(iref - 1);
        }
        self.nref -= 1;
        true
    }

    /// 1-based positions of the sort-order columns among all columns in
    /// hierarchy order, 0 where unset.
    #[must_use]
    pub fn sort_order_indices(&self) -> [usize; 5] {
        let mut isort = [0; 5];
        for (i, c) in self.column_refs().enumerate() {
            for (l, o) in self.sort_order.iter().enumerate() {
                if *o == Some(c) {
                    isort[l] = i + 1;
                }
            }
        }
        isort
    }

    /// Per-crystal `(resmin, resmax)` over the in-memory reflections,
    /// computed in parallel over crystals. Crystals without a usable cell
    /// give `None`.
    fn crystal_resolution_ranges(&self, positive_only: bool) -> Vec<Option<(f32, f32)>> {
        let Some(ind) = self.find_index_columns() else {
            return vec![None; self.crystals.len()];
        };
        let cols = ind.map(|c| self.columns[c.0].values.as_slice());
        let nref = self.nref.min(cols.iter().map(|c| c.len()).min().unwrap_or(0));
        self.crystals
            .par_iter()
            .map(|xtal| {
                let coef = HklCoefficients::from_cell(&xtal.cell).ok()?;
                let mut range: Option<(f32, f32)> = None;
                for i in 0..nref {
                    let hkl = [cols[0][i], cols[1][i], cols[2][i]].map(index_value);
                    let res = coef.resolution(hkl);
                    if positive_only && res <= 0.0 {
                        continue;
                    }
                    range = Some(range.map_or((res, res), |(lo, hi)| (lo.min(res), hi.max(res))));
                }
                range
            })
            .collect()
    }

    /// Widens each crystal's limits to cover the reflections in memory,
    /// as done after reading a file.
    pub fn extend_resolution_limits(&mut self) {
        let ranges = self.crystal_resolution_ranges(false);
        for (xtal, range) in self.crystals.iter_mut().zip(ranges) {
            if let Some((lo, hi)) = range {
                xtal.resmin = xtal.resmin.min(lo);
                xtal.resmax = xtal.resmax.max(hi);
            }
        }
    }

    /// Recomputes crystal and output limits from scratch over the
    /// reflections in memory, ignoring zero resolutions, as done before
    /// writing a file.
    pub fn recalculate_resolution_limits(&mut self) {
        let ranges = self.crystal_resolution_ranges(true);
        for (xtal, range) in self.crystals.iter_mut().zip(ranges) {
            xtal.resmin = 100.0;
            xtal.resmax = 0.0;
            if let Some((lo, hi)) = range {
                xtal.resmin = xtal.resmin.min(lo);
                xtal.resmax = xtal.resmax.max(hi);
                self.resmin_out = self.resmin_out.min(lo);
                self.resmax_out = self.resmax_out.max(hi);
            }
        }
        debug!(
            "output resolution limits 1/d^2 {} to {}",
            self.resmin_out, self.resmax_out
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DatasetRef;
    use approx::assert_relative_eq;

    fn indexed() -> (Mtz, Vec<Option<ColumnRef>>) {
        let mut mtz = Mtz::new();
        let base = DatasetRef::new(0, 0);
        let mut lookup = Vec::new();
        for l in ["H", "K", "L"] {
            lookup.push(Some(mtz.add_column(base, l, "H").unwrap()));
        }
        let x = mtz
            .add_crystal("xtal", "proj", [10.0, 10.0, 10.0, 90.0, 90.0, 90.0])
            .unwrap();
        let set = mtz.add_dataset(x, "native", 1.0).unwrap();
        lookup.push(Some(mtz.add_column(set, "F", "F").unwrap()));
        (mtz, lookup)
    }

    #[test]
    fn test_append_reflections() {
        let (mut mtz, lookup) = indexed();
        for (i, hkl) in [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [1.0, 1.0, 1.0]].iter().enumerate() {
            let values = [hkl[0], hkl[1], hkl[2], 10.0 * (i as f32 + 1.0)];
            assert!(mtz.write_reflection(i + 1, &values, &lookup).unwrap().is_none());
        }
        assert_eq!(mtz.nref, 3);
        for c in mtz.column_refs().collect::<Vec<_>>() {
            assert!(mtz.column(c).unwrap().values.len() >= 3);
        }
        let f = mtz.column(lookup[3].unwrap()).unwrap();
        assert_relative_eq!(f.min, 10.0);
        assert_relative_eq!(f.max, 30.0);

        let r = mtz.read_reflection_lookup(&lookup, 2).unwrap();
        assert_eq!(r.values, vec![0.0, 2.0, 0.0, 20.0]);
        assert_eq!(r.missing, vec![false; 4]);
        assert!(mtz.read_reflection_lookup(&lookup, 4).is_none());
    }

    #[test]
    fn test_resolution_limits() {
        let (mut mtz, lookup) = indexed();
        mtz.write_reflection(1, &[1.0, 0.0, 0.0, 1.0], &lookup).unwrap();
        mtz.write_reflection(2, &[0.0, 0.0, 5.0, 1.0], &lookup).unwrap();
        mtz.recalculate_resolution_limits();
        let xtal = &mtz.crystals()[1];
        assert_relative_eq!(xtal.resmin, 0.01, epsilon = 1e-6);
        assert_relative_eq!(xtal.resmax, 0.25, epsilon = 1e-6);
        assert_relative_eq!(mtz.resmax_out, 0.25, epsilon = 1e-6);
        // the base crystal has no cell
        assert_relative_eq!(mtz.crystals()[0].resmin, 100.0);

        let (minres, maxres) = mtz.resolution_limits();
        assert_relative_eq!(minres, 0.01, epsilon = 1e-6);
        assert_relative_eq!(maxres, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_streaming_row() {
        let (mut mtz, lookup) = indexed();
        mtz.set_reflections_in_memory(false);
        let f = lookup[3];
        // write F before the indices; row follows hierarchy order
        let row = mtz
            .write_reflection(1, &[7.0, 1.0, 2.0, 0.0], &[f, lookup[0], lookup[1], lookup[2]])
            .unwrap()
            .unwrap();
        assert_eq!(row, vec![1.0, 2.0, 0.0, 7.0]);
        assert_relative_eq!(mtz.crystals()[1].resmax, 0.05, epsilon = 1e-6);
        assert_eq!(mtz.nref, 1);
    }

    #[test]
    fn test_delete_and_sort_order() {
        let (mut mtz, lookup) = indexed();
        for i in 1..=3 {
            mtz.write_reflection(i, &[i as f32, 0.0, 0.0, 1.0], &lookup).unwrap();
        }
        assert!(mtz.delete_reflection(1));
        assert_eq!(mtz.nref, 2);
        let h = mtz.column(lookup[0].unwrap()).unwrap();
        assert_eq!(h.values.as_slice(), &[2.0, 3.0]);

        mtz.sort_order = [lookup[0], lookup[1], lookup[2], None, None];
        assert_eq!(mtz.sort_order_indices(), [1, 2, 3, 0, 0]);
        assert_eq!(mtz.find_index_columns(), Some([0, 1, 2].map(|i| lookup[i].unwrap())));
    }

    #[test]
    fn test_delete_refused() {
        let (mut mtz, lookup) = indexed();
        mtz.write_reflection(1, &[1.0, 0.0, 0.0, 1.0], &lookup).unwrap();
        assert!(!mtz.delete_reflection(0));
        assert!(!mtz.delete_reflection(2));

        mtz.set_reflections_in_memory(false);
        assert!(mtz.column(lookup[3].unwrap()).unwrap().values.is_empty());
        assert!(!mtz.delete_reflection(1));
        assert_eq!(mtz.nref, 1);
    }
}
