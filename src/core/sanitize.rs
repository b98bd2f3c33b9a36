use crate::adapters::repo::ClonedRepo;
use crate::core::entities::{ChangeType, FileChangeRequest};
use std::collections::BTreeMap;
use tracing::warn;

/// Filters the files about to be committed down to the ones the plan asked for.
///
/// A file survives when a change request names it and its path stays inside the
/// checkout. A `modify` target must still exist on disk. Returns the filtered
/// map and whether anything was removed.
pub fn validate_and_sanitize(
    files: BTreeMap<String, String>,
    file_change_requests: &[FileChangeRequest],
    repo: &ClonedRepo,
) -> (BTreeMap<String, String>, bool) {
    let before = files.len();
    let sanitized: BTreeMap<String, String> = files
        .into_iter()
        .filter(|(path, _)| {
            let Some(fcr) = file_change_requests.iter().find(|f| &f.filename == path) else {
                warn!("Dropping {} from the commit: no change request names it", path);
                return false;
            };
            if repo.resolve(path).is_err() {
                warn!("Dropping {} from the commit: outside the repository", path);
                return false;
            }
            if fcr.change_type == ChangeType::Modify && !repo.exists(path) {
                warn!("Dropping {} from the commit: file no longer exists", path);
                return false;
            }
            true
        })
        .collect();
    let removed = sanitized.len() != before;
    (sanitized, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::ChangeStatus;

    fn fcr(filename: &str, change_type: ChangeType) -> FileChangeRequest {
        FileChangeRequest {
            filename: filename.to_string(),
            change_type,
            instructions: String::new(),
            status: ChangeStatus::Succeeded,
        }
    }

    fn files(paths: &[&str]) -> BTreeMap<String, String> {
        paths
            .iter()
            .map(|p| (p.to_string(), "contents\n".to_string()))
            .collect()
    }

    #[test]
    fn test_keeps_requested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "old\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());

        let (kept, removed) = validate_and_sanitize(
            files(&["lib.rs", "new.rs"]),
            &[fcr("lib.rs", ChangeType::Modify), fcr("new.rs", ChangeType::Create)],
            &repo,
        );
        assert!(!removed);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["lib.rs", "new.rs"]);
    }

    #[test]
    fn test_drops_unrequested_escaping_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "old\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());

        let (kept, removed) = validate_and_sanitize(
            files(&["lib.rs", "stray.rs", "../outside.rs", "gone.rs"]),
            &[
                fcr("lib.rs", ChangeType::Modify),
                fcr("../outside.rs", ChangeType::Create),
                fcr("gone.rs", ChangeType::Modify),
            ],
            &repo,
        );
        assert!(removed);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["lib.rs"]);
    }
}
