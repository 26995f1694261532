//! Unit cell math.
//!
//! Volumes, orthogonalisation matrices, reciprocal cells and
//! resolution from Miller indices.

use crate::error::{Error, Result};

type Mat3 = [[f64; 3]; 3];

/// Degrees-to-radians factor used for volumes and reciprocal cells.
const CONV_APPROX: f64 = 3.14159 / 180.0;

/// Unit cell parameters `a, b, c, alpha, beta, gamma` (angles in degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitCell {
    pub params: [f64; 6],
}

/// How two cells were found to differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellDifference {
    /// Relative volume difference exceeded the tolerance.
    Volume,
    /// Summed relative parameter difference exceeded three times the tolerance.
    Large,
    /// Summed relative parameter difference exceeded the tolerance.
    Small,
}

impl std::fmt::Display for CellDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volume => f.write_str("Difference in cell volumes detected"),
            Self::Large => f.write_str("Large difference in cell parameters detected"),
            Self::Small => f.write_str("Small difference in cell parameters detected"),
        }
    }
}

impl From<[f32; 6]> for UnitCell {
    fn from(c: [f32; 6]) -> Self {
        Self {
            params: c.map(f64::from),
        }
    }
}

impl From<[f64; 6]> for UnitCell {
    fn from(params: [f64; 6]) -> Self {
        Self { params }
    }
}

impl UnitCell {
    #[must_use]
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            params: [a, b, c, alpha, beta, gamma],
        }
    }

    /// Cell volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        let p = &self.params;
        let alph = p[3] * CONV_APPROX;
        let bet = p[4] * CONV_APPROX;
        let gamm = p[5] * CONV_APPROX;
        let sum = (alph + bet + gamm) * 0.5;
        let v = ((sum - alph).sin() * (sum - bet).sin() * (sum - gamm).sin() * sum.sin()).sqrt();
        2.0 * p[0] * p[1] * p[2] * v
    }

    /// Compares two cells, returning how they differ if they do.
    #[must_use]
    pub fn difference(&self, other: &UnitCell, tolerance: f64) -> Option<CellDifference> {
        let vol1 = self.volume();
        let vol2 = other.volume();
        if (0.5 * (vol1 - vol2)).abs() / (vol1 + vol2) > tolerance {
            return Some(CellDifference::Volume);
        }

        let acheck: f64 = self
            .params
            .iter()
            .zip(other.params.iter())
            .map(|(c1, c2)| (0.5 * (c2 - c1)).abs() / (c2 + c1))
            .sum();
        if acheck > 3.0 * tolerance {
            Some(CellDifference::Large)
        } else if acheck > tolerance {
            Some(CellDifference::Small)
        } else {
            None
        }
    }

    /// True if the cells differ beyond `tolerance`.
    #[must_use]
    pub fn cells_differ(&self, other: &UnitCell, tolerance: f64) -> bool {
        self.difference(other, tolerance).is_some()
    }

    /// a = b = c and alpha = beta = gamma within `tolerance`.
    #[must_use]
    pub fn is_rhombohedral(&self, tolerance: f64) -> bool {
        let p = &self.params;
        let acheck = (p[0] - p[1]).abs()
            + (p[1] - p[2]).abs()
            + (p[0] - p[2]).abs()
            + (p[3] - p[4]).abs()
            + (p[3] - p[5]).abs()
            + (p[4] - p[5]).abs();
        acheck <= tolerance
    }

    /// a = b, alpha = beta = 90 and gamma = 120 within `tolerance`.
    #[must_use]
    pub fn is_hexagonal(&self, tolerance: f64) -> bool {
        let p = &self.params;
        let acheck =
            (p[0] - p[1]).abs() + (p[3] - 90.0).abs() + (p[4] - 90.0).abs() + (p[5] - 120.0).abs();
        acheck <= tolerance
    }

    fn reciprocal_angles(&self, conv: f64) -> ([f64; 3], [f64; 3]) {
        let p = &self.params;
        let (sina, cosa) = (p[3] * conv).sin_cos();
        let (sinb, cosb) = (p[4] * conv).sin_cos();
        let (sing, cosg) = (p[5] * conv).sin_cos();
        let cosas = (cosg * cosb - cosa) / (sinb * sing);
        let cosbs = (cosa * cosg - cosb) / (sina * sing);
        let cosgs = (cosa * cosb - cosg) / (sina * sinb);
        (
            [cosas, cosbs, cosgs],
            [
                (1.0 - cosas * cosas).sqrt(),
                (1.0 - cosbs * cosbs).sqrt(),
                (1.0 - cosgs * cosgs).sqrt(),
            ],
        )
    }

    /// Orthogonalisation (`ro`) and fractionalisation (`rf`) matrices for
    /// orthogonalisation code `ncode` (1..=6), plus the cell volume.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown code or a degenerate cell.
    pub fn frac_orth_matrices(&self, ncode: u8) -> Result<(Mat3, Mat3, f64)> {
        let conv = std::f64::consts::PI / 180.0;
        let p = &self.params;
        let (sina, cosa) = (p[3] * conv).sin_cos();
        let (sinb, cosb) = (p[4] * conv).sin_cos();
        let (sing, cosg) = (p[5] * conv).sin_cos();
        let ([cosas, cosbs, cosgs], [sinas, sinbs, sings]) = self.reciprocal_angles(conv);
        let (a, b, c) = (p[0], p[1], p[2]);

        let mut ro = [[0.0; 3]; 3];
        match ncode {
            // xo along a, zo along c*
            1 => {
                ro[0][0] = a;
                ro[0][1] = b * cosg;
                ro[0][2] = c * cosb;
                ro[1][1] = b * sing;
                ro[1][2] = -c * sinb * cosas;
                ro[2][2] = c * sinb * sinas;
            }
            // xo along b, zo along a*
            2 => {
                ro[0][0] = a * cosg;
                ro[0][1] = b;
                ro[0][2] = c * cosa;
                ro[1][0] = -a * sing * cosbs;
                ro[1][2] = c * sina;
                ro[2][0] = a * sing * sinbs;
            }
            // xo along c, zo along b*
            3 => {
                ro[0][0] = a * cosb;
                ro[0][1] = b * cosa;
                ro[0][2] = c;
                ro[1][0] = a * sinb;
                ro[1][1] = -b * sina * cosgs;
                ro[2][1] = b * sina * sings;
            }
            // trigonal only: xo along a+b, yo along a-b, zo along c*
            4 => {
                ro[0][0] = a / 2.0;
                ro[0][1] = a / 2.0;
                ro[1][0] = -a * sing;
                ro[1][1] = a * sing;
                ro[2][2] = c;
            }
            // xo along a*, zo along c
            5 => {
                ro[0][0] = a * sinb * sings;
                ro[1][0] = -a * sinb * cosgs;
                ro[1][1] = b * sina;
                ro[2][0] = a * cosb;
                ro[2][1] = b * cosa;
                ro[2][2] = c;
            }
            // xo along a, yo along b*
            6 => {
                ro[0][0] = a;
                ro[0][1] = b * cosg;
                ro[0][2] = c * cosb;
                ro[1][1] = b * sing * sinas;
                ro[2][1] = -b * sing * cosas;
                ro[2][2] = c * sinb;
            }
            other => return Err(Error::InvalidOrthCode(other)),
        }

        let (rf, vol) = invert3(&ro).ok_or(Error::InvalidCell(self.params))?;
        Ok((ro, rf, vol))
    }

    /// Reciprocal cell parameters and the reciprocal volume.
    #[must_use]
    pub fn reciprocal(&self) -> ([f64; 6], f64) {
        let p = &self.params;
        let vol = self.volume();
        let sina = (p[3] * CONV_APPROX).sin();
        let sinb = (p[4] * CONV_APPROX).sin();
        let sing = (p[5] * CONV_APPROX).sin();
        let ([cosas, cosbs, cosgs], [sinas, sinbs, sings]) = self.reciprocal_angles(CONV_APPROX);
        let rcell = [
            p[1] * p[2] * sina / vol,
            p[2] * p[0] * sinb / vol,
            p[0] * p[1] * sing / vol,
            sinas.atan2(cosas) / CONV_APPROX,
            sinbs.atan2(cosbs) / CONV_APPROX,
            sings.atan2(cosgs) / CONV_APPROX,
        ];
        (rcell, 1.0 / vol)
    }
}

/// Inverts a 3x3 matrix, returning it with the determinant.
///
/// Returns `None` when `|det| <= 1e-30`.
#[must_use]
pub fn invert3(a: &Mat3) -> Option<(Mat3, f64)> {
    let c = [cross(&a[1], &a[2]), cross(&a[2], &a[0]), cross(&a[0], &a[1])];
    let d = a[0][0] * c[0][0] + a[0][1] * c[0][1] + a[0][2] * c[0][2];
    if d.abs() <= 1.0e-30 {
        return None;
    }
    let mut ai = [[0.0; 3]; 3];
    for (i, row) in ai.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = c[j][i] / d;
        }
    }
    Some((ai, d))
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut r = [[0.0; 3]; 3];
    for (i, row) in r.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    r
}

fn transpose(a: &Mat3) -> Mat3 {
    let mut t = [[0.0; 3]; 3];
    for (i, row) in t.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = a[j][i];
        }
    }
    t
}

fn mat3_vec(m: &Mat3, x: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * x[0] + m[0][1] * x[1] + m[0][2] * x[2],
        m[1][0] * x[0] + m[1][1] * x[1] + m[1][2] * x[2],
        m[2][0] * x[0] + m[2][1] * x[1] + m[2][2] * x[2],
    ]
}

/// Orthogonal to fractional coordinates.
#[must_use]
pub fn orth_to_frac(rf: &Mat3, xo: &[f64; 3]) -> [f64; 3] {
    mat3_vec(rf, xo)
}

/// Fractional to orthogonal coordinates.
#[must_use]
pub fn frac_to_orth(ro: &Mat3, xf: &[f64; 3]) -> [f64; 3] {
    mat3_vec(ro, xf)
}

// U tensors are packed as [u11, u22, u33, u12, u13, u23].
fn unpack_u(u: &[f64; 6]) -> Mat3 {
    [[u[0], u[3], u[4]], [u[3], u[1], u[5]], [u[4], u[5], u[2]]]
}

fn pack_u(m: &Mat3) -> [f64; 6] {
    [m[0][0], m[1][1], m[2][2], m[0][1], m[0][2], m[1][2]]
}

/// Orthogonal to fractional anisotropic U tensor.
#[must_use]
pub fn orthu_to_fracu(rf: &Mat3, uo: &[f64; 6]) -> [f64; 6] {
    let temp = mat3_mul(&unpack_u(uo), &transpose(rf));
    pack_u(&mat3_mul(rf, &temp))
}

/// Fractional to orthogonal anisotropic U tensor.
#[must_use]
pub fn fracu_to_orthu(ro: &Mat3, uf: &[f64; 6]) -> [f64; 6] {
    let temp = mat3_mul(&unpack_u(uf), &transpose(ro));
    pack_u(&mat3_mul(ro, &temp))
}

/// Coefficients of the quadratic form giving `4 sin^2(theta)/lambda^2`
/// from Miller indices.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HklCoefficients {
    pub coef: [f64; 6],
}

impl HklCoefficients {
    /// Builds the coefficients for `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCell`] if any parameter is below 0.001.
    pub fn from_cell(cell: &[f32; 6]) -> Result<Self> {
        if cell.iter().any(|&p| p < 0.001) {
            return Err(Error::InvalidCell(cell.map(f64::from)));
        }
        let degtorad = 1.0f64.atan() / 45.0;
        let [a, b, c, alpha, beta, gamma] = cell.map(f64::from);
        let (alpha, beta, gamma) = (alpha * degtorad, beta * degtorad, gamma * degtorad);

        let ax = a;
        let bx = b * gamma.cos();
        let by = b * gamma.sin();
        let cx = c * beta.cos();
        let cy = (b * c * alpha.cos() - bx * cx) / by;
        let cz = (c * c - cx * cx - cy * cy).sqrt();

        let denom = ax * by * cz;
        let axst = 1.0 / ax;
        let ayst = -bx * cz / denom;
        let azst = (bx * cy - by * cx) / denom;
        let byst = 1.0 / by;
        let bzst = -ax * cy / denom;
        let czst = 1.0 / cz;

        Ok(Self {
            coef: [
                0.25 * (axst * axst + ayst * ayst + azst * azst),
                0.5 * (ayst * byst + azst * bzst),
                0.5 * (azst * czst),
                0.25 * (byst * byst + bzst * bzst),
                0.5 * (bzst * czst),
                0.25 * (czst * czst),
            ],
        })
    }

    /// `1/d^2` for the reflection `hkl`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolution(&self, hkl: [i32; 3]) -> f32 {
        let [h, k, l] = hkl.map(f64::from);
        let c = &self.coef;
        (4.0 * (h * h * c[0] + h * k * c[1] + h * l * c[2] + k * k * c[3] + k * l * c[4] + l * l * c[5]))
            as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_orthorhombic_volume() {
        let cell = UnitCell::new(10.0, 20.0, 30.0, 90.0, 90.0, 90.0);
        assert_relative_eq!(cell.volume(), 6000.0, max_relative = 1e-6);
    }

    #[test]
    fn test_cells_differ() {
        let c1 = UnitCell::new(50.0, 60.0, 70.0, 90.0, 90.0, 90.0);
        let c2 = UnitCell::new(50.01, 60.0, 70.0, 90.0, 90.0, 90.0);
        assert!(!c1.cells_differ(&c2, 0.002));

        let c3 = UnitCell::new(55.0, 60.0, 70.0, 90.0, 90.0, 90.0);
        assert_eq!(c1.difference(&c3, 0.002), Some(CellDifference::Volume));
    }

    #[test]
    fn test_cell_shape_checks() {
        let hex = UnitCell::new(40.0, 40.0, 90.0, 90.0, 90.0, 120.0);
        assert!(hex.is_hexagonal(0.01));
        assert!(!hex.is_rhombohedral(0.01));

        let rh = UnitCell::new(50.0, 50.0, 50.0, 80.0, 80.0, 80.0);
        assert!(rh.is_rhombohedral(0.01));
        assert!(!rh.is_hexagonal(0.01));
    }

    #[test]
    fn test_frac_orth_roundtrip() {
        let cell = UnitCell::new(30.0, 40.0, 50.0, 80.0, 95.0, 100.0);
        let (ro, rf, vol) = cell.frac_orth_matrices(1).unwrap();
        assert!(vol > 0.0);
        let xf = [0.1, 0.2, 0.3];
        let back = orth_to_frac(&rf, &frac_to_orth(&ro, &xf));
        for i in 0..3 {
            assert_relative_eq!(back[i], xf[i], epsilon = 1e-10);
        }
        assert!(cell.frac_orth_matrices(9).is_err());
    }

    #[test]
    fn test_u_tensor_roundtrip() {
        let cell = UnitCell::new(30.0, 40.0, 50.0, 90.0, 100.0, 90.0);
        let (ro, rf, _) = cell.frac_orth_matrices(1).unwrap();
        let uo = [0.2, 0.3, 0.25, 0.01, -0.02, 0.03];
        let back = fracu_to_orthu(&ro, &orthu_to_fracu(&rf, &uo));
        for i in 0..6 {
            assert_relative_eq!(back[i], uo[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_reciprocal_orthogonal() {
        let cell = UnitCell::new(10.0, 20.0, 40.0, 90.0, 90.0, 90.0);
        let (rcell, rvol) = cell.reciprocal();
        assert_relative_eq!(rcell[0], 0.1, epsilon = 1e-5);
        assert_relative_eq!(rcell[1], 0.05, epsilon = 1e-5);
        assert_relative_eq!(rcell[2], 0.025, epsilon = 1e-5);
        assert_relative_eq!(rcell[3], 90.0, epsilon = 1e-3);
        assert_relative_eq!(rvol, 1.0 / 8000.0, max_relative = 1e-5);
    }

    #[test]
    fn test_resolution_from_indices() {
        let coefs = HklCoefficients::from_cell(&[10.0, 20.0, 40.0, 90.0, 90.0, 90.0]).unwrap();
        // 1/d^2 = h^2/a^2 for (1,0,0)
        assert_relative_eq!(coefs.resolution([1, 0, 0]), 0.01, epsilon = 1e-6);
        assert_relative_eq!(coefs.resolution([0, 2, 0]), 0.01, epsilon = 1e-6);
        assert!(HklCoefficients::from_cell(&[0.0; 6]).is_err());
    }
}
