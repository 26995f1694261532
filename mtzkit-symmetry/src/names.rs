//! Spacegroup and point-group name matching.
//!
//! Names are compared case-insensitively with blanks ignored after the
//! lattice letter. `:H`/`:R` setting suffixes are folded away, and a
//! full symbol such as `P 1 21 1` also matches its short form `P 21`.

use mtzkit_core::Symop;

/// Case-insensitive exact name comparison.
#[must_use]
pub fn name_equal(a: &str, b: &str) -> bool {
    a.to_ascii_uppercase() == b.to_ascii_uppercase()
}

/// Compares a reference-table name with a user-supplied name.
#[must_use]
pub fn name_equal_to_lib(lib_name: &str, name: &str) -> bool {
    let lib = de_colon(&lib_name.to_ascii_uppercase());
    let user = de_colon(&name.to_ascii_uppercase());
    if compare_ignoring_blanks(&lib, &user) {
        return true;
    }
    if lib.contains(" 1 ") && !user.contains(" 1 ") {
        let short = to_short_name(&lib);
        return compare_ignoring_blanks(&short, &user);
    }
    false
}

/// Compares point-group names, ignoring a leading `PG`.
#[must_use]
pub fn pgname_equal(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        let up = s.to_ascii_uppercase();
        up.strip_prefix("PG").map_or(up.clone(), str::to_string)
    };
    compare_ignoring_blanks(&strip(a), &strip(b))
}

/// Short form of a full Hermann-Mauguin symbol: `"P 1 21 1"` becomes
/// `"P21"`. Trigonal symbols keep their `1` axes.
#[must_use]
pub fn to_short_name(name: &str) -> String {
    if name == "P 1" {
        return "P1".to_string();
    }
    let trigonal = ["P 3", "P -3", "R 3", "R -3"]
        .iter()
        .any(|p| name.starts_with(p));
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    let mut i = 0;
    while i < chars.len() {
        if !trigonal && chars[i] == ' ' && chars.get(i + 1) == Some(&'1') {
            i += 2;
            continue;
        }
        if chars[i] != ' ' {
            out.push(chars[i]);
        }
        i += 1;
    }
    out
}

/// Replaces a `:R` or `:H` setting suffix with blanks; a `:H` suffix
/// also turns the lattice letter `R` into `H`.
#[must_use]
pub fn de_colon(name: &str) -> String {
    if let Some(pos) = name.find(":R") {
        let mut s = name.to_string();
        s.replace_range(pos..pos + 2, "  ");
        return s;
    }
    if let Some(pos) = name.find(":H") {
        let mut s = name.to_string();
        s.replace_range(pos..pos + 2, "  ");
        if let Some(r) = s.find('R') {
            s.replace_range(r..=r, "H");
        }
        return s;
    }
    name.to_string()
}

/// First characters must agree; the rest is compared without blanks.
fn compare_ignoring_blanks(a: &str, b: &str) -> bool {
    let mut ai = a.chars();
    let mut bi = b.chars();
    if ai.next() != bi.next() {
        return false;
    }
    let rest_a: String = ai.filter(|c| *c != ' ').collect();
    let rest_b: String = bi.filter(|c| *c != ' ').collect();
    rest_a == rest_b
}

/// Centering operators for the lattice letter of a Hall symbol.
///
/// Returns the identity followed by the centering translations. An
/// unknown lattice yields an empty list.
#[must_use]
pub fn centering_operators(hall: &str) -> Vec<Symop> {
    const HALF: f32 = 0.5;
    const THIRD: f32 = 1.0 / 3.0;
    const TWO_THIRDS: f32 = 2.0 / 3.0;

    let translations: &[[f32; 3]] = if hall.contains('P') {
        &[]
    } else if hall.contains('A') {
        &[[0.0, HALF, HALF]]
    } else if hall.contains('B') {
        &[[HALF, 0.0, HALF]]
    } else if hall.contains('C') {
        &[[HALF, HALF, 0.0]]
    } else if hall.contains('F') {
        &[[0.0, HALF, HALF], [HALF, 0.0, HALF], [HALF, HALF, 0.0]]
    } else if hall.contains('I') {
        &[[HALF, HALF, HALF]]
    } else if hall.contains('H') {
        &[[TWO_THIRDS, THIRD, THIRD], [THIRD, TWO_THIRDS, TWO_THIRDS]]
    } else if hall.contains('R') {
        &[]
    } else {
        return Vec::new();
    };

    let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    std::iter::once(Symop::identity())
        .chain(translations.iter().map(|t| Symop::from_parts(identity, *t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lib_name_matching() {
        assert!(name_equal_to_lib("P 21 21 21", "p212121"));
        assert!(name_equal_to_lib("P 1 21 1", "P 1 21 1"));
        assert!(name_equal_to_lib("P 1 21 1", "P21"));
        assert!(name_equal_to_lib("C 1 2 1", "C2"));
        assert!(!name_equal_to_lib("P 1 21 1", "C2"));
        assert!(name_equal_to_lib("R 3 :H", "H3"));
        assert!(name_equal_to_lib("R 3 :R", "R3"));
        assert!(!name_equal_to_lib("P 4", "P 41"));
    }

    #[test]
    fn test_short_names() {
        assert_eq!(to_short_name("P 1"), "P1");
        assert_eq!(to_short_name("P 1 21 1"), "P21");
        assert_eq!(to_short_name("C 1 2/c 1"), "C2/c");
        assert_eq!(to_short_name("P 3 1 2"), "P312");
        assert_eq!(to_short_name("P 21 21 21"), "P212121");
    }

    #[test]
    fn test_plain_name_equal() {
        assert!(name_equal("p 21 21 21", "P 21 21 21"));
        assert!(!name_equal("P212121", "P 21 21 21"));
    }

    #[test]
    fn test_pgname() {
        assert!(pgname_equal("PG222", "222"));
        assert!(pgname_equal("pg4/mmm", "PG4/m m m"));
        assert!(!pgname_equal("PG4/mmm", "PG 4/mmm"));
        assert!(!pgname_equal("PG4", "PG422"));
    }

    #[test]
    fn test_centering() {
        assert_eq!(centering_operators(" P 2ac 2ab").len(), 1);
        let c = centering_operators(" C 2y");
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].trn(), [0.5, 0.5, 0.0]);
        assert_eq!(centering_operators("-F 4 2 3").len(), 4);
        assert_eq!(centering_operators(" R 3").len(), 1);
        assert_eq!(centering_operators("H").len(), 3);
        assert!(centering_operators("X").is_empty());
    }
}
