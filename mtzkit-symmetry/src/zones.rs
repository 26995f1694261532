//! Centric and epsilon reflection zones.
//!
//! A zone is a lattice plane or row of reflections sharing a special
//! symmetry property. Twelve candidate centric zones and thirteen
//! epsilon zones are tested against the operators of a spacegroup once,
//! at load time; per-reflection queries then only evaluate the zone
//! conditions.

use mtzkit_core::Symop;

/// Number of candidate centric zones.
pub const NUM_CENTRIC_ZONES: usize = 12;

/// Number of epsilon zones, including the general `hkl` zone.
pub const NUM_EPSILON_ZONES: usize = 13;

const CENTRIC_TEST_HKL: [[i32; 3]; NUM_CENTRIC_ZONES] = [
    [0, 1, 2],
    [1, 0, 2],
    [1, 2, 0],
    [1, 1, 10],
    [1, 10, 1],
    [10, 1, 1],
    [1, -1, 10],
    [1, 10, -1],
    [10, 1, -1],
    [-1, 2, 10],
    [2, -1, 10],
    [1, 4, 8],
];

const EPSILON_TEST_HKL: [[i32; 3]; NUM_EPSILON_ZONES] = [
    [1, 0, 0],
    [0, 2, 0],
    [0, 0, 2],
    [1, 1, 0],
    [1, 0, 1],
    [0, 1, 1],
    [1, -1, 0],
    [1, 0, -1],
    [0, 1, -1],
    [-1, 2, 0],
    [2, -1, 0],
    [1, 1, 1],
    [1, 2, 3],
];

/// Reflection types of the centric zones.
pub const CENTRIC_ZONE_NAMES: [&str; NUM_CENTRIC_ZONES] = [
    "0kl", "h0l", "hk0", "hhl", "hkh", "hkk", "h -hl", "hk -h", "hk -k", "-h 2h l", "2h -h l", "hkl",
];

/// Reflection types of the epsilon zones.
pub const EPSILON_ZONE_NAMES: [&str; NUM_EPSILON_ZONES] = [
    "h00", "0k0", "00l", "hh0", "h0h", "0kk", "h -h0", "h0 -h", "0k -k", "-h 2h 0", "2h -h 0",
    "hhh", "hkl",
];

/// Zero when `(h, k, l)` lies in centric zone `zone` (0-based).
#[must_use]
pub fn centric_zone_check(zone: usize, h: i32, k: i32, l: i32) -> i32 {
    match zone {
        0 => h,
        1 => k,
        2 => l,
        3 => h - k,
        4 => h - l,
        5 => k - l,
        6 => h + k,
        7 => h + l,
        8 => k + l,
        9 => 2 * h + k,
        10 => h + 2 * k,
        _ => 0,
    }
}

/// Zero when `(h, k, l)` lies in epsilon zone `zone` (0-based).
#[must_use]
pub fn epsilon_zone_check(zone: usize, h: i32, k: i32, l: i32) -> i32 {
    const BIG: i32 = 1000;
    match zone {
        0 => BIG * k + l,
        1 => h + BIG * l,
        2 => h + BIG * k,
        3 => h - k + BIG * l,
        4 => h + BIG * k - l,
        5 => BIG * h + k - l,
        6 => h + k + BIG * l,
        7 => h + BIG * k + l,
        8 => BIG * h + k + l,
        9 => 2 * h + k + BIG * l,
        10 => h + 2 * k + BIG * l,
        11 => h + BIG * k - (BIG + 1) * l,
        _ => 0,
    }
}

/// For each centric zone, the 1-based index of the first operator that
/// maps the zone's test reflection onto its Friedel mate, or 0.
pub(crate) fn centric_zones(ops: &[Symop]) -> [usize; NUM_CENTRIC_ZONES] {
    let mut centrics = [0; NUM_CENTRIC_ZONES];
    for (zone, hkl) in CENTRIC_TEST_HKL.iter().enumerate() {
        let friedel = hkl.map(|x| -x);
        if let Some(j) = ops.iter().position(|op| op.apply_to_hkl(*hkl) == friedel) {
            centrics[zone] = j + 1;
        }
    }
    centrics
}

/// Epsilon factor of each zone; 0 for zones that are not special.
///
/// `prim_ops` are the primitive operators and `nsym` the total operator
/// count, so that centering multiplies every factor.
pub(crate) fn epsilon_zones(prim_ops: &[Symop], nsym: usize) -> [usize; NUM_EPSILON_ZONES] {
    let ncent = if prim_ops.is_empty() {
        1
    } else {
        nsym / prim_ops.len()
    };
    let mut epsilon = [0; NUM_EPSILON_ZONES];
    for (zone, hkl) in EPSILON_TEST_HKL.iter().enumerate().take(NUM_EPSILON_ZONES - 1) {
        let neps = prim_ops
            .iter()
            .filter(|op| op.apply_to_hkl(*hkl) == *hkl)
            .count();
        if neps > 1 {
            epsilon[zone] = neps * ncent;
        }
    }
    epsilon[NUM_EPSILON_ZONES - 1] = ncent;
    epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtzkit_core::parse_symop_list;

    #[test]
    fn test_monoclinic_zones() {
        let ops = parse_symop_list("x,y,z * -x,y+1/2,-z").unwrap();
        let centrics = centric_zones(&ops);
        // only h0l is centric in 2/m
        assert_eq!(centrics[1], 2);
        assert_eq!(centrics.iter().filter(|c| **c != 0).count(), 1);

        let eps = epsilon_zones(&ops, 2);
        assert_eq!(eps[1], 2);
        assert_eq!(eps[0], 0);
        assert_eq!(eps[12], 1);
    }

    #[test]
    fn test_zone_checks() {
        assert_eq!(centric_zone_check(1, 3, 0, 5), 0);
        assert_ne!(centric_zone_check(1, 3, 1, 5), 0);
        assert_eq!(centric_zone_check(11, 3, 1, 5), 0);
        assert_eq!(epsilon_zone_check(1, 0, 4, 0), 0);
        assert_ne!(epsilon_zone_check(1, 1, 4, 0), 0);
        assert_eq!(epsilon_zone_check(11, 2, 2, 2), 0);
        assert_eq!(EPSILON_ZONE_NAMES[11], "hhh");
    }
}
