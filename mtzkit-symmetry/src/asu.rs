//! Reciprocal-space asymmetric units and Laue classes.
//!
//! The reference table describes each reciprocal ASU as a condition
//! string. Those strings map onto a closed set of twelve tests, each
//! tied to one Laue class and, through the lattice type, to the
//! corresponding Patterson group.

use crate::error::{Error, Result};

const ASU_1B: &str = "l>0 or (l==0 and (h>0 or (h==0 and k>=0)))";
const ASU_2_M: &str = "k>=0 and (l>0 or (l=0 and h>=0))";
const ASU_MMM: &str = "h>=0 and k>=0 and l>=0";
const ASU_4_M: &str = "l>=0 and ((h>=0 and k>0) or (h=0 and k=0))";
const ASU_4_MMM: &str = "h>=k and k>=0 and l>=0";
const ASU_3B: &str = "(h>=0 and k>0) or (h=0 and k=0 and l>=0)";
const ASU_3BM: &str = "h>=k and k>=0 and (k>0 or l>=0)";
const ASU_3BMX: &str = "h>=k and k>=0 and (h>k or l>=0)";
const ASU_M3B: &str = "h>=0 and ((l>=h and k>h) or (l=h and k=h))";
const ASU_M3BM: &str = "k>=l and l>=h and h>=0";

/// One of the twelve reciprocal asymmetric-unit tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsuKind {
    /// Laue class -1.
    Triclinic,
    /// Laue class 2/m.
    Monoclinic,
    /// Laue class mmm.
    Orthorhombic,
    /// Laue class 4/m.
    Tetragonal4m,
    /// Laue class 4/mmm.
    Tetragonal4mmm,
    /// Laue class -3.
    Trigonal3b,
    /// Laue class -31m.
    Trigonal3bm,
    /// Laue class -3m1.
    Trigonal3bmx,
    /// Laue class 6/m.
    Hexagonal6m,
    /// Laue class 6/mmm.
    Hexagonal6mmm,
    /// Laue class m-3.
    CubicM3b,
    /// Laue class m-3m.
    CubicM3bm,
}

impl AsuKind {
    /// Selects the test for a reciprocal ASU description. `patterson` is
    /// the point group of the Patterson group, needed to tell tetragonal
    /// from hexagonal classes sharing the same condition string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAsuMatch`] for an unknown description.
    pub fn from_description(descr: &str, patterson: &str) -> Result<Self> {
        let kind = match descr {
            ASU_1B => Self::Triclinic,
            ASU_2_M => Self::Monoclinic,
            ASU_MMM => Self::Orthorhombic,
            ASU_4_M if patterson == "4/m" => Self::Tetragonal4m,
            ASU_4_M if patterson == "6/m" => Self::Hexagonal6m,
            ASU_4_MMM if patterson == "4/mmm" => Self::Tetragonal4mmm,
            ASU_4_MMM if patterson == "6/mmm" => Self::Hexagonal6mmm,
            ASU_3B => Self::Trigonal3b,
            ASU_3BM => Self::Trigonal3bm,
            ASU_3BMX => Self::Trigonal3bmx,
            ASU_M3B => Self::CubicM3b,
            ASU_M3BM => Self::CubicM3bm,
            _ => return Err(Error::NoAsuMatch(descr.to_string())),
        };
        Ok(kind)
    }

    /// Tests whether `(h, k, l)` lies in this asymmetric unit.
    #[must_use]
    pub fn contains(self, h: i32, k: i32, l: i32) -> bool {
        match self {
            Self::Triclinic => l > 0 || (l == 0 && (h > 0 || (h == 0 && k >= 0))),
            Self::Monoclinic => k >= 0 && (l > 0 || (l == 0 && h >= 0)),
            Self::Orthorhombic => h >= 0 && k >= 0 && l >= 0,
            Self::Tetragonal4m | Self::Hexagonal6m => {
                l >= 0 && ((h >= 0 && k > 0) || (h == 0 && k == 0))
            }
            Self::Tetragonal4mmm | Self::Hexagonal6mmm => h >= k && k >= 0 && l >= 0,
            Self::Trigonal3b => (h >= 0 && k > 0) || (h == 0 && k == 0 && l >= 0),
            Self::Trigonal3bm => h >= k && k >= 0 && (k > 0 || l >= 0),
            Self::Trigonal3bmx => h >= k && k >= 0 && (h > k || l >= 0),
            Self::CubicM3b => h >= 0 && ((l >= h && k > h) || (l == h && k == h)),
            Self::CubicM3bm => h >= 0 && k >= l && l >= h,
        }
    }

    /// Laue class code used by [`LaueClass::from_code`].
    #[must_use]
    pub fn laue_code(self) -> u8 {
        match self {
            Self::Triclinic => 3,
            Self::Monoclinic => 4,
            Self::Orthorhombic => 6,
            Self::Tetragonal4m => 7,
            Self::Tetragonal4mmm => 8,
            Self::Trigonal3b => 9,
            Self::Trigonal3bm => 10,
            Self::Trigonal3bmx => 11,
            Self::Hexagonal6m => 12,
            Self::Hexagonal6mmm => 13,
            Self::CubicM3b => 14,
            Self::CubicM3bm => 15,
        }
    }

    /// Patterson group number and name for this Laue class and lattice.
    ///
    /// The lattice is read from the Hall symbol; rhombohedral groups
    /// distinguish hexagonal (`H`) and rhombohedral (`R`) settings
    /// through the extended Hermann-Mauguin symbol. Returns `None` when
    /// the lattice has no Patterson group listed for the class.
    #[must_use]
    pub fn patterson(self, hall: &str, xhm: &str) -> Option<(i32, &'static str)> {
        let has = |s: &str, c: char| s.contains(c);
        let result = match self {
            Self::Triclinic => (2, "P-1"),
            Self::Monoclinic => {
                if has(hall, 'P') {
                    (10, "P2/m")
                } else if has(hall, 'C') {
                    (12, "C2/m")
                } else {
                    return None;
                }
            }
            Self::Orthorhombic => {
                if has(hall, 'P') {
                    (47, "Pmmm")
                } else if has(hall, 'C') {
                    (65, "Cmmm")
                } else if has(hall, 'I') {
                    (71, "Immm")
                } else if has(hall, 'F') {
                    (69, "Fmmm")
                } else {
                    return None;
                }
            }
            Self::Tetragonal4m => {
                if has(hall, 'P') {
                    (83, "P4/m")
                } else if has(hall, 'I') {
                    (87, "I4/m")
                } else {
                    return None;
                }
            }
            Self::Tetragonal4mmm => {
                if has(hall, 'P') {
                    (123, "P4/mmm")
                } else if has(hall, 'I') {
                    (139, "I4/mmm")
                } else {
                    return None;
                }
            }
            Self::Trigonal3b => {
                if has(hall, 'P') {
                    (147, "P-3")
                } else if has(xhm, 'H') {
                    (148, "H-3")
                } else if has(hall, 'R') {
                    (1148, "R-3")
                } else {
                    return None;
                }
            }
            Self::Trigonal3bm => (162, "P-31m"),
            Self::Trigonal3bmx => {
                if has(hall, 'P') {
                    (164, "P-3m1")
                } else if has(xhm, 'H') {
                    (166, "H-3m")
                } else if has(hall, 'R') {
                    (1166, "R-3m")
                } else {
                    return None;
                }
            }
            Self::Hexagonal6m => (175, "P6/m"),
            Self::Hexagonal6mmm => (191, "P6/mmm"),
            Self::CubicM3b => {
                if has(hall, 'P') {
                    (200, "Pm-3")
                } else if has(hall, 'I') {
                    (204, "Im-3")
                } else if has(hall, 'F') {
                    (202, "Fm-3")
                } else {
                    return None;
                }
            }
            Self::CubicM3bm => {
                if has(hall, 'P') {
                    (221, "Pm-3m")
                } else if has(hall, 'I') {
                    (229, "Im-3m")
                } else if has(hall, 'F') {
                    (225, "Fm-3m")
                } else {
                    return None;
                }
            }
        };
        Some(result)
    }
}

/// Laue class with its FFT grid sampling factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LaueClass {
    /// Numeric code, 3 to 15.
    pub code: u8,
    /// Laue group name, e.g. `"4/mmm"`.
    pub name: &'static str,
    /// Required grid sampling along each axis.
    pub sampling: [i32; 3],
}

impl LaueClass {
    /// Looks up a Laue class by code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLaueMatch`] for codes outside 3..=15.
    pub fn from_code(code: u8) -> Result<Self> {
        let (name, sampling) = match code {
            3 => ("-1", [2, 2, 2]),
            4 => ("2/m", [2, 4, 2]),
            5 => ("2/m", [2, 8, 4]),
            6 => ("mmm", [4, 4, 4]),
            7 => ("4/m", [4, 4, 8]),
            8 => ("4/mmm", [4, 4, 8]),
            9 => ("-3", [6, 6, 6]),
            10 => ("3bar1m", [6, 6, 6]),
            11 => ("3barm", [6, 6, 6]),
            12 => ("6/m", [6, 6, 12]),
            13 => ("6/mmm", [6, 6, 12]),
            14 => ("m3bar", [4, 4, 4]),
            15 => ("m3barm", [8, 8, 8]),
            _ => return Err(Error::NoLaueMatch(code)),
        };
        Ok(Self {
            code,
            name,
            sampling,
        })
    }
}
