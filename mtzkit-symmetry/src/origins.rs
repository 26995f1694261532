//! Alternate origins and polar axes.

use mtzkit_core::Symop;

/// Origin shifts that leave the symmetry operators unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlternateOrigins {
    /// Fractional origins; the first is always `(0, 0, 0)`.
    pub origins: Vec<[f32; 3]>,
    /// Axes along which the origin is not fixed.
    pub polar: [bool; 3],
}

impl AlternateOrigins {
    /// True if the origin may lie anywhere (P1).
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.polar.iter().all(|p| *p)
    }

    /// Human-readable polarity summary.
    #[must_use]
    pub fn polarity_description(&self) -> &'static str {
        match self.polar {
            [true, true, true] => "origin anywhere",
            [true, true, false] => "polar+ spacegroup: origin anywhere in a b plane",
            [true, false, true] => "polar+ spacegroup: origin anywhere in a c plane",
            [false, true, true] => "polar+ spacegroup: origin anywhere in b c plane",
            [true, false, false] => "polar spacegroup: origin is not fixed along a axis",
            [false, true, false] => "polar spacegroup: origin is not fixed along b axis",
            [false, false, true] => "polar spacegroup: origin is not fixed along c axis",
            [false, false, false] => "origin fixed",
        }
    }
}

/// Finds the alternate origins of a set of operators.
///
/// Candidate shifts are 0, 1/2, 1/3, 2/3, 1/4 and 3/4 along each
/// non-polar axis. A shift is accepted when `(R_i - R_0) * shift` is a
/// lattice vector for every operator. The first operator must be the
/// identity.
#[must_use]
pub fn generate_alternate_origins(ops: &[Symop]) -> AlternateOrigins {
    const PROBE: [f32; 3] = [0.13, 0.17, 0.19];
    const TWELFTHS: [i32; 6] = [0, 6, 4, 8, 3, 9];

    let mut polar = [true; 3];
    for op in ops.iter().skip(1) {
        for (axis, flag) in polar.iter_mut().enumerate() {
            let out: f32 = (0..3).map(|j| op.m[axis][j] * PROBE[j]).sum();
            if (out - PROBE[axis]).abs() > 0.01 {
                *flag = false;
            }
        }
    }

    let mut origins = vec![[0.0_f32; 3]];
    for &s1 in &TWELFTHS {
        for &s2 in &TWELFTHS {
            for &s3 in &TWELFTHS {
                let shift = [s1, s2, s3];
                if shift == [0, 0, 0] {
                    continue;
                }
                if (0..3).any(|a| polar[a] && shift[a] != 0) {
                    continue;
                }
                if preserves_shift(ops, shift) {
                    #[allow(clippy::cast_precision_loss)]
                    origins.push(shift.map(|s| s as f32 / 12.0));
                }
            }
        }
    }
    AlternateOrigins { origins, polar }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn preserves_shift(ops: &[Symop], shift: [i32; 3]) -> bool {
    let Some(first) = ops.first() else {
        return true;
    };
    ops.iter().skip(1).all(|op| {
        (0..3).all(|row| {
            let v: f32 = (0..3)
                .map(|col| (op.m[row][col] - first.m[row][col]) * shift[col] as f32)
                .sum();
            (v.round_ties_even() as i32) % 12 == 0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtzkit_core::parse_symop_list;

    #[test]
    fn test_p1_floats() {
        let ops = parse_symop_list("x,y,z").unwrap();
        let o = generate_alternate_origins(&ops);
        assert!(o.is_floating());
        assert_eq!(o.origins.len(), 1);
    }

    #[test]
    fn test_p21_polar_along_b() {
        let ops = parse_symop_list("x,y,z * -x,y+1/2,-z").unwrap();
        let o = generate_alternate_origins(&ops);
        assert_eq!(o.polar, [false, true, false]);
        // 0 or 1/2 along a and c
        assert_eq!(o.origins.len(), 4);
        assert!(o.origins.contains(&[0.5, 0.0, 0.5]));
    }

    #[test]
    fn test_p212121_eight_origins() {
        let ops =
            parse_symop_list("x,y,z * -x+1/2,-y,z+1/2 * -x,y+1/2,-z+1/2 * x+1/2,-y+1/2,-z")
                .unwrap();
        let o = generate_alternate_origins(&ops);
        assert_eq!(o.polar, [false; 3]);
        assert_eq!(o.origins.len(), 8);
        assert_eq!(o.polarity_description(), "origin fixed");
    }
}
