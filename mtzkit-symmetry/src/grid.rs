//! FFT grid sampling and real-space ASU limits.

const FACTORS: [i32; 8] = [2, 3, 5, 7, 11, 13, 17, 19];

/// True if `n` has no prime factor greater than 19.
#[must_use]
pub fn all_factors_le_19(n: i32) -> bool {
    if n <= 0 {
        return false;
    }
    let mut nn = n;
    for f in FACTORS {
        while nn % f == 0 {
            nn /= f;
        }
        if nn == 1 {
            return true;
        }
    }
    nn == 1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn rint(x: f32) -> i32 {
    x.round_ties_even() as i32
}

/// Chooses an FFT grid dimension.
///
/// The result is a multiple of `nmul` with all prime factors at most 19,
/// first searched downward from `sample * minsmp` (1.6 by default), then
/// upward from `0.95 * sample * minsmp` (1.4 by default) to `4 * minsmp`.
/// `minsmp <= 0` returns `nmul`; `None` means no suitable size exists.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn grid_sample(minsmp: i32, nmul: i32, sample: f32) -> Option<i32> {
    if minsmp <= 0 {
        return Some(nmul);
    }
    if nmul <= 0 {
        return None;
    }
    let (r1min, mut r1max, mut r2min, r2max) = (1.0_f32, 1.6_f32, 1.4_f32, 4.0_f32);
    if sample >= 1.0 {
        r1max = sample;
        r2min = (sample * 0.95).max(1.0);
    }
    let minsmp_f = minsmp as f32;
    let nmul_f = nmul as f32;

    let mut n = rint(r1max * minsmp_f / nmul_f) * nmul;
    while n > rint(r1min * minsmp_f) {
        if all_factors_le_19(n) {
            return Some(n);
        }
        n -= nmul;
    }

    n = rint(r2min * minsmp_f / nmul_f) * nmul;
    while n < rint(r2max * minsmp_f) {
        if all_factors_le_19(n) {
            return Some(n);
        }
        n += nmul;
    }
    None
}

/// Converts a range such as `"0<=x<=1/2"` into `[lower, upper]`.
///
/// Strict bounds are pulled inward by 1e-5 and inclusive bounds pushed
/// outward by the same amount, so that a plain `<` comparison against
/// the limits honours the original relation. Only single-digit values
/// and fractions are recognised.
#[must_use]
pub fn range_to_limits(range: &str) -> [f32; 2] {
    const DELTA: f32 = 0.00001;
    let mut limits = [0.0_f32; 2];
    let mut in_value = true;
    let (mut neg, mut frac, mut equal) = (false, false, false);
    let (mut value1, mut value2) = (0.0_f32, 1.0_f32);

    let finish = |v1: f32, v2: f32, frac: bool, neg: bool| {
        let v = if frac { v1 / v2 } else { v1 };
        if neg {
            -v
        } else {
            v
        }
    };

    for ch in range.chars() {
        match ch {
            '<' => {
                if in_value {
                    limits[0] = finish(value1, value2, frac, neg) + DELTA;
                    neg = false;
                    frac = false;
                    in_value = false;
                } else {
                    in_value = true;
                }
            }
            '-' => neg = true,
            '/' => frac = true,
            '=' => {
                if in_value {
                    equal = true;
                } else {
                    limits[0] -= 2.0 * DELTA;
                }
            }
            ';' | ' ' => {}
            c if in_value => {
                #[allow(clippy::cast_precision_loss)]
                let digit = c.to_digit(10).unwrap_or(0) as f32;
                if frac {
                    value2 = digit;
                } else {
                    value1 = digit;
                }
            }
            _ => {}
        }
    }
    limits[1] = finish(value1, value2, frac, neg) - DELTA;
    if equal {
        limits[1] += 2.0 * DELTA;
    }
    limits
}
