//! Column label assignment for programs.
//!
//! The symmetry column of unmerged data is labelled `M/ISYM` in files
//! and in programs, but `/` separates path components, so it is stored
//! as `M_ISYM` and translated back wherever a label leaves the model.

use mtzkit_core::{keymatch, Context, Tokenizer};

use crate::error::{Error, Result};
use crate::model::{ColumnRef, DatasetRef, Mtz, BASE_NAME, LABEL_LEN};

/// Label of the symmetry column as written in files.
pub const MISYM_LABEL: &str = "M/ISYM";
/// Label of the symmetry column as stored in the model.
pub const MISYM_INTERNAL: &str = "M_ISYM";

/// Stored form of a label read from a header record.
#[must_use]
pub fn internal_label(label: &str, col_type: &str) -> String {
    if col_type.starts_with('Y') && label.starts_with(MISYM_LABEL) {
        MISYM_INTERNAL.to_string()
    } else {
        label.to_string()
    }
}

/// Form of a stored label written to files and listings.
#[must_use]
pub fn external_label<'a>(label: &'a str, col_type: &str) -> &'a str {
    if col_type == "Y" && label == MISYM_INTERNAL {
        MISYM_LABEL
    } else {
        label
    }
}

fn program_label<'a>(label: &'a str, col_type: &str) -> &'a str {
    if col_type == "Y" && label == MISYM_LABEL {
        MISYM_INTERNAL
    } else {
        label
    }
}

/// One entry of a column listing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnListing {
    pub label: String,
    pub col_type: String,
    pub dataset_id: i32,
}

impl Mtz {
    /// Lists every column in hierarchy order.
    #[must_use]
    pub fn list_columns(&self) -> Vec<ColumnListing> {
        self.dataset_refs()
            .flat_map(|set| {
                let s = &self.crystals[set.crystal].datasets[set.dataset];
                s.columns.iter().map(move |&c| (s.id, c))
            })
            .map(|(id, c)| self.listing(c, id))
            .collect()
    }

    /// Lists the columns read from file, in file order.
    #[must_use]
    pub fn list_input_columns(&self) -> Vec<ColumnListing> {
        let mut found: Vec<(usize, ColumnListing)> = self
            .dataset_refs()
            .flat_map(|set| {
                let s = &self.crystals[set.crystal].datasets[set.dataset];
                s.columns.iter().map(move |&c| (s.id, c))
            })
            .filter(|&(_, c)| self.columns[c.0].source != 0)
            .map(|(id, c)| (self.columns[c.0].source, self.listing(c, id)))
            .collect();
        found.sort_by_key(|(source, _)| *source);
        found.into_iter().map(|(_, l)| l).collect()
    }

    fn listing(&self, c: ColumnRef, dataset_id: i32) -> ColumnListing {
        let col = &self.columns[c.0];
        ColumnListing {
            label: external_label(&col.label, &col.col_type).to_string(),
            col_type: col.col_type.clone(),
            dataset_id,
        }
    }

    /// Finds the input columns a program asked for.
    ///
    /// An empty label gives `None`. When the requested type is blank it
    /// is replaced by the type found in the file, or `R` if that is blank
    /// too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnTypeMismatch`] when the first character of
    /// a requested type differs from the file's.
    pub fn lookup_input_columns(
        &self,
        labels: &[&str],
        types: &mut [String],
    ) -> Result<Vec<Option<ColumnRef>>> {
        let mut lookup = Vec::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                lookup.push(None);
                continue;
            }
            let requested = types.get(i).map_or("", String::as_str);
            let found = self.column_lookup(program_label(label, requested));
            if let Some(c) = found {
                let col = &self.columns[c.0];
                if requested.is_empty() {
                    let actual = if col.col_type.is_empty() { "R" } else { col.col_type.as_str() };
                    if let Some(t) = types.get_mut(i) {
                        *t = actual.to_string();
                    }
                } else if col.col_type.chars().next() != requested.chars().next() {
                    return Err(Error::ColumnTypeMismatch {
                        label: col.label.clone(),
                        expected: requested.to_string(),
                        found: col.col_type.clone(),
                    });
                }
            }
            lookup.push(found);
        }
        Ok(lookup)
    }

    /// Assigns output columns for a program.
    ///
    /// Unless `append` is set every existing column is deactivated first.
    /// Labels found in the file are reactivated; new labels become columns
    /// of the base dataset, or of the first dataset if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullDataset`] when the file has no dataset to put
    /// new columns in.
    pub fn assign_output_columns(
        &mut self,
        labels: &[&str],
        types: &[&str],
        append: bool,
    ) -> Result<Vec<ColumnRef>> {
        if !append {
            for c in &mut self.columns {
                c.active = false;
            }
        }
        let default_set = self
            .dataset_lookup(&format!("{BASE_NAME}/{BASE_NAME}"))
            .or_else(|| self.dataset(DatasetRef::new(0, 0)).map(|_| DatasetRef::new(0, 0)));

        let mut lookup = Vec::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            let col_type = types.get(i).copied().unwrap_or("");
            let col = match self.column_lookup(program_label(label, col_type)) {
                Some(c) => {
                    self.columns[c.0].active = true;
                    c
                }
                None => {
                    let set = default_set
                        .ok_or_else(|| Error::NullDataset("no dataset for new columns".into()))?;
                    self.add_column(set, label, col_type)?
                }
            };
            lookup.push(col);
        }
        Ok(lookup)
    }
}

/// Parses a `LABIN`/`LABOUT` style line of `program=user` label pairs.
///
/// Returns the user label for each entry of `program_labels`, or `None`
/// if the line did not assign it. Either label of a pair may come first.
///
/// # Errors
///
/// Returns [`Error::ParamError`] for a label longer than 30 characters,
/// an unpaired label, or a pair in which neither label is known.
pub fn parse_labin(ctx: &Context, line: &str, program_labels: &[&str]) -> Result<Vec<Option<String>>> {
    let tokens = Tokenizer::default().tokenize(line);
    let key = tokens.first().map_or("", |t| t.text.as_str());
    if !(keymatch(key, "LABI") || keymatch(key, "LABO") || keymatch(key, "COMP")) {
        ctx.warn("parse_labin", "input is not a LABIN or LABOUT line");
    }

    let too_long = |l: &str| l.chars().count() > LABEL_LEN;
    let mut user: Vec<Option<String>> = vec![None; program_labels.len()];
    let mut errors = Vec::new();
    for pair in tokens.get(1..).unwrap_or_default().chunks(2) {
        let label1 = pair[0].text.as_str();
        if too_long(label1) {
            errors.push(format!("labels cannot be longer than 30 characters: \"{label1}\""));
            break;
        }
        let Some(label2) = pair.get(1).map(|t| t.text.as_str()) else {
            errors.push(format!("run out of labels trying to match \"{label1}\""));
            break;
        };
        if too_long(label2) {
            errors.push(format!("labels cannot be longer than 30 characters: \"{label2}\""));
            break;
        }
        if let Some(j) = program_labels.iter().position(|p| *p == label1) {
            user[j] = Some(label2.to_string());
        } else if let Some(j) = program_labels.iter().position(|p| *p == label2) {
            user[j] = Some(label1.to_string());
        } else {
            errors.push(format!("neither label recognised: {label1} {label2}"));
        }
    }

    if errors.is_empty() {
        Ok(user)
    } else {
        for e in &errors {
            ctx.error("parse_labin", e);
        }
        Err(Error::ParamError(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Context {
        Context::new("labels").with_verbosity(0)
    }

    fn sample() -> Mtz {
        let mut mtz = Mtz::new();
        let base = DatasetRef::new(0, 0);
        for l in ["H", "K", "L"] {
            mtz.add_column(base, l, "H").unwrap();
        }
        let x = mtz.add_crystal("xtal", "proj", [0.0; 6]).unwrap();
        let set = mtz.add_dataset(x, "native", 1.0).unwrap();
        mtz.add_column(set, "M/ISYM", "Y").unwrap();
        mtz.add_column(set, "FP", "F").unwrap();
        mtz
    }

    #[test]
    fn test_misym_shim() {
        let mtz = sample();
        let misym = mtz.column_lookup(MISYM_INTERNAL).unwrap();
        assert_eq!(mtz.column(misym).unwrap().label, "M_ISYM");
        let listing = mtz.list_columns();
        assert_eq!(listing[3].label, "M/ISYM");
        assert_eq!(listing[3].dataset_id, 1);

        let mut types = vec!["Y".to_string()];
        let found = mtz.lookup_input_columns(&["M/ISYM"], &mut types).unwrap();
        assert_eq!(found, vec![Some(misym)]);
    }

    #[test]
    fn test_lookup_types() {
        let mtz = sample();
        let mut types = vec![String::new(), "F".to_string(), String::new()];
        let found = mtz.lookup_input_columns(&["FP", "FP", ""], &mut types).unwrap();
        assert_eq!(types[0], "F");
        assert!(found[0].is_some());
        assert_eq!(found[2], None);

        let mut wrong = vec!["J".to_string()];
        assert!(matches!(
            mtz.lookup_input_columns(&["FP"], &mut wrong),
            Err(Error::ColumnTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_assign_output_columns() {
        let mut mtz = sample();
        let out = mtz.assign_output_columns(&["H", "FC"], &["H", "F"], false).unwrap();
        assert_eq!(mtz.num_active_columns(), 2);
        assert_eq!(mtz.column_dataset(out[1]), Some(DatasetRef::new(0, 0)));
        assert_eq!(mtz.column(out[1]).unwrap().label, "FC");

        mtz.assign_output_columns(&["FP"], &["F"], true).unwrap();
        assert_eq!(mtz.num_active_columns(), 3);
    }

    #[test]
    fn test_parse_labin() {
        let ctx = quiet();
        let prog = ["FP", "SIGFP", "FREE"];
        let user = parse_labin(&ctx, "LABIN FP=F SIGF=SIGFP", &prog).unwrap();
        assert_eq!(user[0].as_deref(), Some("F"));
        assert_eq!(user[1].as_deref(), Some("SIGF"));
        assert_eq!(user[2], None);

        assert!(parse_labin(&ctx, "LABIN FP=F SIGFP", &prog).is_err());
        assert!(parse_labin(&ctx, "LABIN X=Y", &prog).is_err());
    }
}
