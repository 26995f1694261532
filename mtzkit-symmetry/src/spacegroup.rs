//! Loaded spacegroup descriptor and its reflection queries.

use std::fmt;

use log::debug;
use mtzkit_core::{Context, Symop, UnitCell};

use crate::asu::{AsuKind, LaueClass};
use crate::error::Result;
use crate::grid::grid_sample;
use crate::syminfo::SyminfoTable;
use crate::zones::{
    centric_zone_check, epsilon_zone_check, CENTRIC_ZONE_NAMES, EPSILON_ZONE_NAMES,
    NUM_CENTRIC_ZONES, NUM_EPSILON_ZONES,
};

/// Crystal system, derived from the spacegroup number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrystalSystem {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Trigonal,
    Hexagonal,
    Cubic,
    /// Number outside 1..=230.
    Unknown,
}

impl CrystalSystem {
    /// Crystal system of spacegroup `number`.
    #[must_use]
    pub fn from_number(number: i32) -> Self {
        match number {
            i32::MIN..=2 => Self::Triclinic,
            3..=15 => Self::Monoclinic,
            16..=74 => Self::Orthorhombic,
            75..=142 => Self::Tetragonal,
            143..=167 => Self::Trigonal,
            168..=194 => Self::Hexagonal,
            195..=230 => Self::Cubic,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CrystalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Triclinic => "TRICLINIC",
            Self::Monoclinic => "MONOCLINIC",
            Self::Orthorhombic => "ORTHORHOMBIC",
            Self::Tetragonal => "TETRAGONAL",
            Self::Trigonal => "TRIGONAL",
            Self::Hexagonal => "HEXAGONAL",
            Self::Cubic => "CUBIC",
            Self::Unknown => " ",
        };
        f.write_str(s)
    }
}

/// A fully loaded spacegroup.
///
/// Operators are ordered centering-major: `symop[i * nsymop_prim + j]`
/// combines centering operator `i` with primitive operator `j`, so the
/// first `nsymop_prim` entries are the primitive set.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Spacegroup {
    pub number: i32,
    pub ccp4_number: i32,
    pub symbol_hall: String,
    pub symbol_xhm: String,
    pub symbol_old: String,
    /// Point group name, `PG` followed by the symbol.
    pub point_group: String,
    pub crystal_system: CrystalSystem,
    /// Change of basis to the reference setting of the ASU test.
    pub chb: [[f32; 3]; 3],
    pub nsymop_prim: usize,
    pub symop: Vec<Symop>,
    pub invsymop: Vec<Symop>,
    /// Reciprocal ASU condition as written in the reference table.
    pub asu_descr: String,
    pub asu: AsuKind,
    pub laue: LaueClass,
    /// Patterson group number; 0 if none is listed for the lattice.
    pub patterson_number: i32,
    pub patterson_name: String,
    /// 1-based operator index making each centric zone centric, or 0.
    pub centrics: [usize; NUM_CENTRIC_ZONES],
    /// Epsilon factor of each zone, or 0.
    pub epsilon: [usize; NUM_EPSILON_ZONES],
    pub mapasu_zero_descr: String,
    pub mapasu_zero: [f32; 3],
    pub mapasu_ccp4_descr: String,
    pub mapasu_ccp4: [f32; 3],
}

/// Shifts a phase for a symmetry-related reflection.
///
/// The phase (degrees) is negated for `isign == -1`, then
/// `360 * (h . trn)` is added and the result wrapped into `[0, 360)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn phase_shift(h: i32, k: i32, l: i32, phase: f32, trn: [f32; 3], isign: i32) -> f32 {
    let mut out = f64::from(phase);
    if isign == -1 {
        out = -out;
    }
    out += (f64::from(h) * f64::from(trn[0])
        + f64::from(k) * f64::from(trn[1])
        + f64::from(l) * f64::from(trn[2]))
        * 360.0;
    out %= 360.0;
    if out < 0.0 {
        out += 360.0;
    }
    out as f32
}

impl Spacegroup {
    /// Total number of operators, centering included.
    #[must_use]
    pub fn nsymop(&self) -> usize {
        self.symop.len()
    }

    /// Primitive operators.
    #[must_use]
    pub fn primitive_operators(&self) -> &[Symop] {
        &self.symop[..self.nsymop_prim.min(self.symop.len())]
    }

    fn has_change_of_basis(&self) -> bool {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        #[allow(clippy::float_cmp)]
        let same = self.chb == identity;
        !same
    }

    /// True if `(h, k, l)` lies in the reciprocal asymmetric unit.
    #[must_use]
    pub fn is_in_asu(&self, h: i32, k: i32, l: i32) -> bool {
        if self.has_change_of_basis() {
            let [h2, k2, l2] = Symop::from_parts(self.chb, [0.0; 3]).apply_to_hkl([h, k, l]);
            self.asu.contains(h2, k2, l2)
        } else {
            self.asu.contains(h, k, l)
        }
    }

    /// 1 if `(h, k, l)` is in the ASU, -1 if its Friedel mate is, else 0.
    #[must_use]
    pub fn is_in_pm_asu(&self, h: i32, k: i32, l: i32) -> i32 {
        if self.is_in_asu(h, k, l) {
            1
        } else if self.is_in_asu(-h, -k, -l) {
            -1
        } else {
            0
        }
    }

    /// Maps a reflection into the ASU.
    ///
    /// Returns the symmetry number `isym` (odd for `I+`, even for `I-`,
    /// `2 * op + 1` or `2 * op + 2`) with the ASU indices, or `None` if
    /// no primitive operator reaches the ASU.
    #[must_use]
    pub fn put_in_asu(&self, h: i32, k: i32, l: i32) -> Option<(i32, [i32; 3])> {
        for (i, op) in self.primitive_operators().iter().enumerate() {
            let [ho, ko, lo] = op.apply_to_hkl([h, k, l]);
            let isign = self.is_in_pm_asu(ho, ko, lo);
            if isign != 0 {
                let i = i32::try_from(i).unwrap_or(i32::MAX);
                let isym = if isign > 0 { 2 * i + 1 } else { 2 * i + 2 };
                return Some((isym, [ho * isign, ko * isign, lo * isign]));
            }
        }
        None
    }

    /// Inverse of [`put_in_asu`](Self::put_in_asu): regenerates the
    /// original indices from ASU indices and `isym`.
    ///
    /// Returns `None` when `isym` does not name a stored operator.
    #[must_use]
    pub fn generate_indices(&self, isym: i32, h: i32, k: i32, l: i32) -> Option<[i32; 3]> {
        let op = usize::try_from(isym)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.invsymop.get(i / 2));
        let Some(op) = op else {
            debug!("isym {} out of range for {} operators", isym, self.invsymop.len());
            return None;
        };
        let isign = if isym % 2 == 0 { -1 } else { 1 };
        Some(op.apply_to_hkl([h, k, l]).map(|x| x * isign))
    }

    /// True if the reflection lies in a centric zone.
    #[must_use]
    pub fn is_centric(&self, h: i32, k: i32, l: i32) -> bool {
        self.centric_zone(h, k, l).is_some()
    }

    fn centric_zone(&self, h: i32, k: i32, l: i32) -> Option<usize> {
        (0..NUM_CENTRIC_ZONES)
            .find(|&i| self.centrics[i] != 0 && centric_zone_check(i, h, k, l) == 0)
    }

    /// Restricted phase of a centric reflection in `[0, 180)` degrees,
    /// or 0 for acentric reflections.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn centric_phase(&self, h: i32, k: i32, l: i32) -> f32 {
        let Some(zone) = self.centric_zone(h, k, l) else {
            return 0.0;
        };
        let Some(op) = self.symop.get(self.centrics[zone] - 1) else {
            return 0.0;
        };
        let trn = op.trn();
        let p = f64::from(h) * f64::from(trn[0])
            + f64::from(k) * f64::from(trn[1])
            + f64::from(l) * f64::from(trn[2]);
        let mut phase = 180.0 * (p - p.round_ties_even());
        if phase < 0.0 {
            phase += 180.0;
        }
        phase as f32
    }

    /// Reflection types of the centric zones of this spacegroup.
    #[must_use]
    pub fn centric_zone_descriptions(&self) -> Vec<&'static str> {
        (0..NUM_CENTRIC_ZONES)
            .filter(|&i| self.centrics[i] != 0)
            .map(|i| CENTRIC_ZONE_NAMES[i])
            .collect()
    }

    /// Statistical weight epsilon of a reflection, or 0 if none of the
    /// zones applies.
    #[must_use]
    pub fn multiplicity(&self, h: i32, k: i32, l: i32) -> usize {
        (0..NUM_EPSILON_ZONES)
            .find(|&i| self.epsilon[i] != 0 && epsilon_zone_check(i, h, k, l) == 0)
            .map_or(0, |i| self.epsilon[i])
    }

    /// Reflection types of the epsilon zones with their multiplicities.
    #[must_use]
    pub fn epsilon_zone_descriptions(&self) -> Vec<(&'static str, usize)> {
        (0..NUM_EPSILON_ZONES)
            .filter(|&i| self.epsilon[i] != 0)
            .map(|i| (EPSILON_ZONE_NAMES[i], self.epsilon[i]))
            .collect()
    }

    /// True if the reflection is systematically absent.
    #[must_use]
    pub fn is_systematic_absence(&self, h: i32, k: i32, l: i32) -> bool {
        self.invsymop
            .iter()
            .zip(&self.symop)
            .skip(1)
            .any(|(inv, op)| {
                if inv.apply_to_hkl([h, k, l]) != [h, k, l] {
                    return false;
                }
                let trn = op.trn();
                let del = f64::from(h) * f64::from(trn[0])
                    + f64::from(k) * f64::from(trn[1])
                    + f64::from(l) * f64::from(trn[2]);
                (del - del.round_ties_even()).abs() > 0.05
            })
    }

    /// FFT grid compatible with the Laue class sampling, at least
    /// `nmin` along each axis. Axes with no suitable size get -1.
    #[must_use]
    pub fn fft_grid(&self, nmin: [i32; 3], sample: f32) -> [i32; 3] {
        let s = self.laue.sampling;
        [0, 1, 2].map(|i| grid_sample(nmin[i], s[i], sample).unwrap_or(-1))
    }

    /// Reciprocal-space operators as `(isym, I+ form, I- form)` strings
    /// for each primitive operator.
    #[must_use]
    pub fn reciprocal_operators(&self) -> Vec<(i32, String, String)> {
        self.invsymop
            .iter()
            .take(self.nsymop_prim)
            .enumerate()
            .map(|(i, inv)| {
                let rot = inv.rotation();
                let transposed = [0, 1, 2].map(|r| [0, 1, 2].map(|c| rot[c][r]));
                let negated = transposed.map(|row| row.map(|x| -x));
                let plus = Symop::from_parts(transposed, [0.0; 3]).to_reciprocal_string();
                let minus = Symop::from_parts(negated, [0.0; 3]).to_reciprocal_string();
                let isym = i32::try_from(2 * i + 1).unwrap_or(i32::MAX);
                (isym, plus, minus)
            })
            .collect()
    }
}

/// Checks a unit cell against the symmetry implied by `ops`.
///
/// The spacegroup is identified from the operators; rhombohedral
/// settings need a rhombohedral cell, hexagonal settings a hexagonal
/// one. An empty operator list is never consistent.
///
/// # Errors
///
/// Returns an error if the operators match no spacegroup in `table`.
pub fn check_symmetry_cell(
    ctx: &Context,
    table: &SyminfoTable,
    ops: &[Symop],
    cell: &UnitCell,
) -> Result<bool> {
    const TOLERANCE: f64 = 0.01;
    if ops.is_empty() {
        return Ok(false);
    }
    let sg = table.load_by_ops(ctx, ops)?;
    let consistent = if sg.symbol_xhm.contains(":R") {
        cell.is_rhombohedral(TOLERANCE)
    } else if sg.symbol_xhm.contains(":H") || sg.crystal_system == CrystalSystem::Hexagonal {
        cell.is_hexagonal(TOLERANCE)
    } else {
        true
    };
    Ok(consistent)
}
