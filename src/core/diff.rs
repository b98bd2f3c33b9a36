use crate::core::entities::{ModifiedFiles, PrDiff};
use similar::TextDiff;
use std::collections::BTreeMap;

const DIFF_CONTEXT_LINES: usize = 5;

/// Unified diff hunks between two versions of a file, without file headers.
/// Returns an empty string when the contents are identical.
pub fn generate_diff(old_content: &str, new_content: &str) -> String {
    let diff = TextDiff::from_lines(old_content, new_content);
    let mut unified = diff.unified_diff();
    unified.context_radius(DIFF_CONTEXT_LINES);
    let mut output = String::new();
    for hunk in unified.iter_hunks() {
        output.push_str(&hunk.to_string());
    }
    output
}

/// Wraps each PR patch in `<file>` tags inside a `<files_changed>` block for prompts.
pub fn format_pr_diff_string(pr_diffs: &[PrDiff]) -> String {
    let patches = pr_diffs
        .iter()
        .map(|diff| format!("<file file_path=\"{}\">\n{}\n</file>", diff.file_name, diff.patch))
        .collect::<Vec<_>>();
    format!("<files_changed>\n{}\n</files_changed>", patches.join("\n"))
}

/// Renders `--- path`/`+++ path` sections for every modified file that made it
/// into the commit. Files whose contents did not change are skipped.
pub fn render_committed_patch(
    modified_files: &ModifiedFiles,
    committed: &BTreeMap<String, String>,
) -> String {
    let mut patch_diff = String::new();
    for (file_path, file_data) in modified_files {
        if !committed.contains_key(file_path) {
            continue;
        }
        let diff = generate_diff(&file_data.original_contents, &file_data.contents);
        if diff.is_empty() {
            continue;
        }
        patch_diff.push_str(&format!(
            "--- {}\n+++ {}\n{}\n\n",
            file_path, file_path, diff
        ));
    }
    patch_diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::ModifiedFile;

    #[test]
    fn test_generate_diff() {
        let old = "line1\nline2\nline3\n";
        let new = "line1\nmodified\nline3\nline4\n";

        let diff = generate_diff(old, new);
        assert!(diff.starts_with("@@ "));
        assert!(diff.contains("-line2\n"));
        assert!(diff.contains("+modified\n"));
        assert!(diff.contains("+line4\n"));
        assert!(!diff.contains("+++"));
    }

    #[test]
    fn test_generate_diff_identical_is_empty() {
        assert_eq!(generate_diff("same\n", "same\n"), "");
    }

    #[test]
    fn test_format_pr_diff_string() {
        let diffs = vec![PrDiff {
            file_name: "src/a.rs".to_string(),
            patch: "@@ -1 +1 @@\n-a\n+b".to_string(),
        }];
        assert_eq!(
            format_pr_diff_string(&diffs),
            "<files_changed>\n<file file_path=\"src/a.rs\">\n@@ -1 +1 @@\n-a\n+b\n</file>\n</files_changed>"
        );
    }

    #[test]
    fn test_render_committed_patch_skips_dropped_and_unchanged() {
        let mut modified = ModifiedFiles::new();
        modified.insert(
            "kept.rs".to_string(),
            ModifiedFile {
                original_contents: "a\n".to_string(),
                contents: "b\n".to_string(),
            },
        );
        modified.insert(
            "dropped.rs".to_string(),
            ModifiedFile {
                original_contents: "a\n".to_string(),
                contents: "c\n".to_string(),
            },
        );
        modified.insert(
            "unchanged.rs".to_string(),
            ModifiedFile {
                original_contents: "same\n".to_string(),
                contents: "same\n".to_string(),
            },
        );
        let mut committed = BTreeMap::new();
        committed.insert("kept.rs".to_string(), "b\n".to_string());
        committed.insert("unchanged.rs".to_string(), "same\n".to_string());

        let patch = render_committed_patch(&modified, &committed);
        assert!(patch.starts_with("--- kept.rs\n+++ kept.rs\n@@"));
        assert!(!patch.contains("dropped.rs"));
        assert!(!patch.contains("unchanged.rs"));
    }
}
