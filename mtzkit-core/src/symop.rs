//! Symmetry operator codec.
//!
//! A [`Symop`] is a 4x4 homogeneous matrix with the rotation in the
//! upper-left 3x3 block and the translation in column 3. Operators are
//! read from strings such as `-x+1/2,-y,z+1/2` and written back in the
//! upper-case form `-X+1/2,  -Y,  Z+1/2`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Numerators and denominators of translations in twelfths, indexed by
/// `twelfths - 1`.
const NPNTR1: [u8; 12] = [0, 1, 1, 1, 0, 1, 0, 2, 3, 5, 0, 0];
const NPNTR2: [u8; 12] = [0, 6, 4, 3, 0, 2, 0, 3, 4, 6, 0, 0];

const AXES: [char; 3] = ['X', 'Y', 'Z'];

/// A symmetry operator as a 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symop {
    pub m: [[f32; 4]; 4],
}

impl Default for Symop {
    fn default() -> Self {
        Self::identity()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn rint(v: f64) -> i32 {
    v.round_ties_even() as i32
}

impl Symop {
    #[must_use]
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { m }
    }

    /// Builds an operator from rotation and translation parts.
    #[must_use]
    pub fn from_parts(rot: [[f32; 3]; 3], trn: [f32; 3]) -> Self {
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            m[i][..3].copy_from_slice(&rot[i]);
            m[i][3] = trn[i];
        }
        m[3][3] = 1.0;
        Self { m }
    }

    /// Rotation element `(i, j)`.
    #[must_use]
    pub fn rot(&self, i: usize, j: usize) -> f32 {
        self.m[i][j]
    }

    /// Rotation block.
    #[must_use]
    pub fn rotation(&self) -> [[f32; 3]; 3] {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            row.copy_from_slice(&self.m[i][..3]);
        }
        r
    }

    /// Translation vector.
    #[must_use]
    pub fn trn(&self) -> [f32; 3] {
        [self.m[0][3], self.m[1][3], self.m[2][3]]
    }

    /// Parses a single operator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSymop`] if the string does not describe
    /// exactly one operator of three rows.
    pub fn parse(s: &str) -> Result<Self> {
        let mut ops = parse_symop_list(s)?;
        if ops.len() != 1 {
            return Err(Error::InvalidSymop {
                op: s.to_string(),
                reason: "expected a single operator",
            });
        }
        Ok(ops.remove(0))
    }

    /// Matrix product `self * other`.
    #[must_use]
    pub fn multiply(&self, other: &Symop) -> Symop {
        let mut m = [[0.0f32; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (0..4).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Symop { m }
    }

    /// Inverse by cofactor expansion. A singular matrix gives the zero
    /// matrix.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn inverse(&self) -> Symop {
        let (inv, _) = self.inverse_with_det();
        inv
    }

    /// Inverse together with the determinant.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn inverse_with_det(&self) -> (Symop, f32) {
        let a = &self.m;
        let mut c = [[0.0f64; 4]; 4];
        for (ii, crow) in c.iter_mut().enumerate() {
            for (jj, cv) in crow.iter_mut().enumerate() {
                let mut x = [[0.0f64; 3]; 3];
                let mut i = 0;
                for (i1, arow) in a.iter().enumerate() {
                    if i1 == ii {
                        continue;
                    }
                    let mut j = 0;
                    for (j1, &av) in arow.iter().enumerate() {
                        if j1 != jj {
                            x[i][j] = f64::from(av);
                            j += 1;
                        }
                    }
                    i += 1;
                }
                let am = x[0][0] * x[1][1] * x[2][2] - x[0][0] * x[1][2] * x[2][1]
                    + x[0][1] * x[1][2] * x[2][0]
                    - x[0][1] * x[1][0] * x[2][2]
                    + x[0][2] * x[1][0] * x[2][1]
                    - x[0][2] * x[1][1] * x[2][0];
                *cv = if (ii + jj) % 2 == 0 { am } else { -am };
            }
        }

        let d: f64 = (0..4).map(|i| f64::from(a[i][0]) * c[i][0]).sum();
        let mut inv = [[0.0f32; 4]; 4];
        if d.abs() <= 1.0e-30 {
            return (Symop { m: inv }, 0.0);
        }
        let q = 1.0 / d;
        for (i, row) in inv.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (c[j][i] * q) as f32;
            }
        }
        (Symop { m: inv }, d as f32)
    }

    /// Wraps each translation component into `[0, 1)`.
    #[must_use]
    pub fn normalize_translations(mut self) -> Symop {
        for row in self.m.iter_mut().take(3) {
            while row[3] < 0.0 {
                row[3] += 1.0;
            }
            while row[3] >= 1.0 {
                row[3] -= 1.0;
            }
        }
        self
    }

    /// Packed integer code: 2 bits per rotation element, then 4 bits per
    /// translation in twelfths.
    #[must_use]
    pub fn code(&self) -> i32 {
        let mut code = 0i32;
        for i in 0..3 {
            for j in 0..3 {
                code = (code << 2) | (rint(f64::from(self.m[i][j])) & 0x03);
            }
        }
        for i in 0..3 {
            code = (code << 4) | (rint(f64::from(self.m[i][3]) * 12.0) & 0x0f);
        }
        code
    }

    /// Applies the transposed rotation to Miller indices, rounding to the
    /// nearest integer.
    #[must_use]
    pub fn apply_to_hkl(&self, hkl: [i32; 3]) -> [i32; 3] {
        let [h, k, l] = hkl.map(f64::from);
        let r = |j: usize| {
            rint(h * f64::from(self.m[0][j]) + k * f64::from(self.m[1][j]) + l * f64::from(self.m[2][j]))
        };
        [r(0), r(1), r(2)]
    }

    /// Upper-case real-space form, rows joined by `",  "`.
    #[must_use]
    pub fn to_symop_string(&self) -> String {
        let rows: Vec<String> = (0..3).map(|r| self.row_string(r)).collect();
        rows.join(",  ")
    }

    fn row_string(&self, row: usize) -> String {
        let mut s = String::new();
        let mut ist = false;
        for j in 0..4 {
            let v = self.m[row][j];
            if v == 0.0 {
                continue;
            }
            let mut signed = false;
            if v > 0.0 && ist {
                s.push('+');
                signed = true;
            } else if v < 0.0 {
                // translations are written as positive fractions
                s.push(if j == 3 { '+' } else { '-' });
                signed = true;
                ist = true;
            }

            if j < 3 {
                let irsm = rint(f64::from(v.abs()));
                if irsm != 1 {
                    s.push_str(&irsm.to_string());
                }
                s.push(AXES[j]);
                ist = true;
            } else {
                let itr = rint(f64::from(v) * 12.0);
                #[allow(clippy::cast_sign_loss)]
                let idx = ((itr.rem_euclid(12) + 11) % 12) as usize;
                if NPNTR1[idx] > 0 {
                    s.push_str(&format!("{}/{}", NPNTR1[idx], NPNTR2[idx]));
                } else if signed {
                    s.pop();
                }
            }
        }
        if s.is_empty() {
            s.push('0');
        }
        s
    }

    /// Reciprocal-space form such as `-h,+k,+l`.
    #[must_use]
    pub fn to_reciprocal_string(&self) -> String {
        let real = self.to_symop_string();
        let mut out = String::with_capacity(real.len());
        for ch in real.chars() {
            let recip = match ch {
                'X' => Some('h'),
                'Y' => Some('k'),
                'Z' => Some('l'),
                ' ' => continue,
                _ => None,
            };
            match recip {
                Some(r) => {
                    if !matches!(out.chars().last(), Some('-' | '+')) {
                        out.push('+');
                    }
                    out.push(r);
                }
                None => out.push(ch),
            }
        }
        out
    }
}

impl FromStr for Symop {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Symop::parse(s)
    }
}

impl fmt::Display for Symop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_symop_string())
    }
}

/// Longest numeric prefix of `s`, after optional leading blanks.
/// Returns the value and the number of bytes consumed (0 if none).
fn strtod_prefix(s: &[u8]) -> (f64, usize) {
    let mut i = 0;
    while i < s.len() && s[i].is_ascii_whitespace() {
        i += 1;
    }
    let start = i;
    if i < s.len() && (s[i] == b'+' || s[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
    }
    if i < s.len() && s[i] == b'.' {
        i += 1;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i == digits_start || (i == digits_start + 1 && s[digits_start] == b'.') {
        return (0.0, 0);
    }
    if i < s.len() && (s[i] == b'e' || s[i] == b'E') {
        let mut j = i + 1;
        if j < s.len() && (s[j] == b'+' || s[j] == b'-') {
            j += 1;
        }
        if j < s.len() && s[j].is_ascii_digit() {
            while j < s.len() && s[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    let text = std::str::from_utf8(&s[start..i]).unwrap_or("0");
    (text.parse().unwrap_or(0.0), i)
}

/// Parses one or more operators from a line.
///
/// Rows are separated by `,` and operators by `*` (or simply by a fourth
/// separator). Blanks are ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidSymop`] for an empty row, a bad fraction or an
/// operator with fewer than three rows.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_symop_list(s: &str) -> Result<Vec<Symop>> {
    let err = |reason| Error::InvalidSymop {
        op: s.to_string(),
        reason,
    };
    let bytes = s.as_bytes();
    let mut ops = Vec::new();
    let mut cur = [[0.0f32; 4]; 4];
    let mut init_array = true;
    let (mut col, mut nops) = (3usize, 0usize);
    let (mut sign, mut value) = (1.0f32, 0.0f32);
    let (mut no_axis, mut no_recip) = (0u32, 0u32);
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        let mut separator = false;
        match ch {
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b',' | b'*' => {
                i += 1;
                if value == 0.0 && col == 3 {
                    return Err(err("empty row"));
                }
                separator = true;
            }
            b'x' | b'X' | b'y' | b'Y' | b'z' | b'Z' => {
                col = usize::from(ch.to_ascii_lowercase() - b'x');
                if value == 0.0 {
                    value = sign;
                }
                i += 1;
                continue;
            }
            b'h' | b'H' | b'k' | b'K' | b'l' | b'L' => {
                no_recip += 1;
                col = match ch.to_ascii_lowercase() {
                    b'h' => 0,
                    b'k' => 1,
                    _ => 2,
                };
                if value == 0.0 {
                    value = sign;
                }
                i += 1;
                continue;
            }
            b'a' | b'A' | b'b' | b'B' | b'c' | b'C' => {
                no_axis += 1;
                col = usize::from(ch.to_ascii_lowercase() - b'a');
                if value == 0.0 {
                    value = sign;
                }
                i += 1;
                if i < bytes.len() && bytes[i] == b'*' && (no_axis != 3 || no_recip > 0) {
                    i += 1;
                }
                continue;
            }
            b'+' | b'-' => {
                sign = if ch == b'+' { 1.0 } else { -1.0 };
                i += 1;
                if value == 0.0 && col == 3 {
                    continue;
                }
            }
            b'/' => {
                i += 1;
                if value == 0.0 {
                    return Err(err("fraction without numerator"));
                }
                let (value2, used) = strtod_prefix(&bytes[i..]);
                if value2 == 0.0 {
                    return Err(err("bad fraction denominator"));
                }
                value = (f64::from(value) / value2) as f32;
                i += used;
                continue;
            }
            c if c.is_ascii_digit() || c == b'.' => {
                let (v, used) = strtod_prefix(&bytes[i..]);
                value = sign * v as f32;
                i += used.max(1);
                continue;
            }
            _ => {
                i += 1;
                continue;
            }
        }

        if init_array {
            init_array = false;
            cur = [[0.0; 4]; 4];
            cur[3][3] = 1.0;
        }
        cur[nops][col] = value;

        if separator {
            nops += 1;
            sign = 1.0;
            if nops == 3 {
                ops.push(Symop { m: cur });
                nops = 0;
                init_array = true;
            }
        }
        col = 3;
        value = 0.0;
        no_recip = 0;
        no_axis = 0;
    }

    if value != 0.0 {
        if init_array {
            init_array = false;
            cur = [[0.0; 4]; 4];
            cur[3][3] = 1.0;
        }
        cur[nops][col] = value;
    }
    if nops < 2 {
        return Err(err("fewer than three rows"));
    }
    if !init_array {
        ops.push(Symop { m: cur });
    }
    Ok(ops)
}

/// True if both sets contain the same operators in any order.
#[must_use]
pub fn operators_equal(ops1: &[Symop], ops2: &[Symop]) -> bool {
    if ops1.len() != ops2.len() {
        return false;
    }
    let mut c1: Vec<i32> = ops1.iter().map(Symop::code).collect();
    let mut c2: Vec<i32> = ops2.iter().map(Symop::code).collect();
    c1.sort_unstable();
    c2.sort_unstable();
    c1 == c2
}

/// True if both sets contain the same operators in the same order.
#[must_use]
pub fn operators_equal_ordered(ops1: &[Symop], ops2: &[Symop]) -> bool {
    ops1.len() == ops2.len() && ops1.iter().zip(ops2).all(|(a, b)| a.code() == b.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_screw_axis() {
        let op = Symop::parse("-x+1/2,-y,z+1/2").unwrap();
        assert_eq!(op.rotation(), [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_relative_eq!(op.trn()[0], 0.5);
        assert_relative_eq!(op.trn()[1], 0.0);
        assert_relative_eq!(op.trn()[2], 0.5);
        assert_eq!(op.to_symop_string(), "-X+1/2,  -Y,  Z+1/2");
    }

    #[test]
    fn test_string_roundtrip_is_equivalent() {
        let op = Symop::parse("-x+1/2,-y,z+1/2").unwrap();
        let again = Symop::parse(&op.to_symop_string()).unwrap();
        assert_eq!(op.code(), again.code());
    }

    #[test]
    fn test_parse_variants() {
        let op = Symop::parse("Y, X, -Z + 2/3").unwrap();
        assert_eq!(op.rotation(), [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]]);
        assert_relative_eq!(op.trn()[2], 2.0 / 3.0, epsilon = 1e-6);

        let recip = Symop::parse("-h,k,-l").unwrap();
        assert_eq!(recip.rot(0, 0), -1.0);
        assert_eq!(recip.rot(2, 2), -1.0);

        let translation_first = Symop::parse("1/2+x,y,z").unwrap();
        assert_relative_eq!(translation_first.trn()[0], 0.5);
        assert_eq!(translation_first.rot(0, 0), 1.0);

        let hex = Symop::parse("x-y,x,z+1/6").unwrap();
        assert_eq!(hex.to_symop_string(), "X-Y,  X,  Z+1/6");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Symop::parse("x,y").is_err());
        assert!(Symop::parse(",y,z").is_err());
        assert!(Symop::parse("x/0,y,z").is_err());
        assert!(Symop::parse("x,y,z*-x,-y,z").is_err());
    }

    #[test]
    fn test_parse_list() {
        let ops = parse_symop_list("X,Y,Z * -X,Y+1/2,-Z").unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].to_symop_string(), "-X,  Y+1/2,  -Z");
    }

    #[test]
    fn test_negative_translation_is_written_positive() {
        let op = Symop::from_parts([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], [-0.5, 0.0, 0.0]);
        assert_eq!(op.to_symop_string(), "X+1/2,  Y,  Z");
    }

    #[test]
    fn test_reciprocal_string() {
        let op = Symop::parse("-x,y+1/2,-z").unwrap();
        assert_eq!(op.to_reciprocal_string(), "-h,+k+1/2,-l");
    }

    #[test]
    fn test_inverse_involution() {
        let op = Symop::parse("-y,x-y,z+1/3").unwrap();
        let inv = op.inverse();
        let back = inv.inverse();
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(back.m[i][j], op.m[i][j], epsilon = 1e-5);
            }
        }
        let prod = op.multiply(&inv);
        let id = Symop::identity();
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(prod.m[i][j], id.m[i][j], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_normalize_and_code() {
        let op = Symop::parse("x+3/2,y-1/4,z").unwrap().normalize_translations();
        assert_relative_eq!(op.trn()[0], 0.5);
        assert_relative_eq!(op.trn()[1], 0.75);
        assert_ne!(op.code(), Symop::identity().code());
    }

    #[test]
    fn test_set_equality() {
        let a = parse_symop_list("x,y,z * -x,-y,z").unwrap();
        let b = parse_symop_list("-x,-y,z * x,y,z").unwrap();
        assert!(operators_equal(&a, &b));
        assert!(!operators_equal_ordered(&a, &b));
        assert!(operators_equal_ordered(&a, &a));
    }

    #[test]
    fn test_apply_to_hkl() {
        let op = Symop::parse("-y,x-y,z").unwrap();
        // transpose applied to (h, k, l)
        assert_eq!(op.apply_to_hkl([1, 2, 3]), [2, -3, 3]);
    }
}
