//! Provenance stamp for columns created in memory.

use chrono::Local;

/// Environment variable holding the id of the running task.
pub const TASK_ID_VAR: &str = "CCP4_TASK_ID";

const STAMP_LEN: usize = 36;

/// Provenance string written to the `COLSRC` record of new columns: the
/// task id if the environment sets one, otherwise the creation time.
#[must_use]
pub fn column_source_stamp() -> String {
    let stamp = match std::env::var(TASK_ID_VAR) {
        Ok(task) => task.chars().take(STAMP_LEN).collect(),
        Err(_) => Local::now().format("CREATED_%d/%m/%Y_%H:%M:%S").to_string(),
    };
    stamp.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_shape() {
        let stamp = column_source_stamp();
        assert!(!stamp.is_empty());
        assert!(stamp.chars().count() <= STAMP_LEN);
        assert!(!stamp.contains(' '));
        if std::env::var(TASK_ID_VAR).is_err() {
            assert!(stamp.starts_with("CREATED_"));
            assert_eq!(stamp.len(), "CREATED_dd/mm/yyyy_hh:mm:ss".len());
        }
    }
}
