//! Hierarchical names and wildcard lookup.
//!
//! Crystals, datasets and columns are addressed by paths of the form
//! `/crystal`, `/crystal/dataset` and `/crystal/dataset/label`. A partial
//! path is right-justified by prefixing `*` components, so `F` looks up
//! the first column labelled `F` in any dataset.

use crate::model::{ColumnRef, DatasetRef, Mtz};

/// Completes `partial` to a path of `depth` components by prefixing `/`
/// and as many `*/` components as needed.
#[must_use]
pub fn rjust_path(partial: &str, depth: usize) -> String {
    let mut count = partial.matches('/').count();
    let mut path = String::new();
    if count < depth {
        path.push('/');
        count += 1;
        while count < depth {
            path.push_str("*/");
            count += 1;
        }
    }
    path.push_str(partial);
    path
}

/// Matches two paths component by component. A component that starts
/// with `*` in either path matches any component.
#[must_use]
pub fn path_match(path1: &str, path2: &str) -> bool {
    let (p1, p2) = (path1.as_bytes(), path2.as_bytes());
    let (mut i, mut j) = (0, 0);
    loop {
        match (p1.get(i), p2.get(j)) {
            (None, None) => return true,
            (None, Some(_)) | (Some(_), None) => return false,
            (Some(a), Some(b)) if a == b => {
                i += 1;
                j += 1;
            }
            (Some(a), Some(b)) => {
                if *a != b'*' && *b != b'*' {
                    return false;
                }
                while p1.get(i).is_some_and(|&c| c != b'/') {
                    i += 1;
                }
                while p2.get(j).is_some_and(|&c| c != b'/') {
                    j += 1;
                }
            }
        }
    }
}

impl Mtz {
    /// Path `/crystal` of a crystal.
    #[must_use]
    pub fn crystal_path(&self, crystal: usize) -> Option<String> {
        self.crystal(crystal).map(|x| format!("/{}", x.name))
    }

    /// Path `/crystal/dataset` of a dataset.
    #[must_use]
    pub fn dataset_path(&self, set: DatasetRef) -> Option<String> {
        let xtal = self.crystal(set.crystal)?;
        let s = self.dataset(set)?;
        Some(format!("/{}/{}", xtal.name, s.name))
    }

    /// Path `/crystal/dataset/label` of a column.
    #[must_use]
    pub fn column_path(&self, col: ColumnRef) -> Option<String> {
        let set = self.column_dataset(col)?;
        let c = self.column(col)?;
        Some(format!("{}/{}", self.dataset_path(set)?, c.label))
    }

    /// First crystal matching a (possibly partial) name.
    #[must_use]
    pub fn crystal_lookup(&self, name: &str) -> Option<usize> {
        let path = rjust_path(name, 1);
        (0..self.crystals.len()).find(|&x| {
            self.crystal_path(x)
                .is_some_and(|p| path_match(&path, &p))
        })
    }

    /// First dataset matching a (possibly partial) path.
    #[must_use]
    pub fn dataset_lookup(&self, name: &str) -> Option<DatasetRef> {
        let path = rjust_path(name, 2);
        self.dataset_refs().find(|&set| {
            self.dataset_path(set)
                .is_some_and(|p| path_match(&path, &p))
        })
    }

    /// First column matching a (possibly partial) path.
    #[must_use]
    pub fn column_lookup(&self, label: &str) -> Option<ColumnRef> {
        let path = rjust_path(label, 3);
        self.dataset_refs().find_map(|set| {
            let prefix = self.dataset_path(set)?;
            self.dataset(set)?.columns.iter().copied().find(|&c| {
                let full = format!("{}/{}", prefix, self.columns[c.0].label);
                path_match(&path, &full)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rjust() {
        assert_eq!(rjust_path("H", 3), "/*/*/H");
        assert_eq!(rjust_path("native/F", 3), "/*/native/F");
        assert_eq!(rjust_path("/x/d/F", 3), "/x/d/F");
        assert_eq!(rjust_path("HKL_base/HKL_base", 2), "/HKL_base/HKL_base");
        assert_eq!(rjust_path("xtal", 1), "/xtal");
    }

    #[test]
    fn test_match() {
        assert!(path_match("/*/*/F", "/xtal/native/F"));
        assert!(path_match("/xtal/*/F", "/xtal/native/F"));
        assert!(!path_match("/*/*/F", "/xtal/native/FP"));
        assert!(!path_match("/*/*/FP", "/xtal/native/F"));
        assert!(!path_match("/other/*/F", "/xtal/native/F"));
        assert!(path_match("/xtal/native/F", "/xtal/native/F"));
    }

    #[test]
    fn test_lookups() {
        let mut mtz = Mtz::new();
        let x = mtz.add_crystal("xtal", "proj", [0.0; 6]).unwrap();
        let native = mtz.add_dataset(x, "native", 1.0).unwrap();
        let deriv = mtz.add_dataset(x, "deriv", 1.0).unwrap();
        let f1 = mtz.add_column(native, "F", "F").unwrap();
        let f2 = mtz.add_column(deriv, "F", "F").unwrap();

        assert_eq!(mtz.column_lookup("F"), Some(f1));
        assert_eq!(mtz.column_lookup("deriv/F"), Some(f2));
        assert_eq!(mtz.column_lookup("/xtal/deriv/F"), Some(f2));
        assert_eq!(mtz.column_lookup("SIGF"), None);
        assert_eq!(mtz.dataset_lookup("deriv"), Some(deriv));
        assert_eq!(mtz.dataset_lookup("HKL_base/HKL_base"), Some(DatasetRef::new(0, 0)));
        assert_eq!(mtz.crystal_lookup("xtal"), Some(x));
        assert_eq!(mtz.column_path(f2).as_deref(), Some("/xtal/deriv/F"));
    }
}
