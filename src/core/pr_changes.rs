use crate::adapters::github::GithubClient;
use crate::core::entities::PrDiff;
use anyhow::{Context, Result};
use tracing::debug;

// Patches longer than this are dropped instead of being sent to the planner.
const MAX_PATCH_CHARS: usize = 20_000;

/// Per-file patches for the files a pull request modifies, plus the paths that
/// were left out because they had no usable patch.
pub async fn get_pr_changes(
    github: &dyn GithubClient,
    repo_full_name: &str,
    pr_number: u64,
) -> Result<(Vec<PrDiff>, Vec<String>)> {
    let files = github
        .list_pull_request_files(repo_full_name, pr_number)
        .await
        .with_context(|| format!("Failed to list files of #{}", pr_number))?;

    let mut pr_diffs = Vec::new();
    let mut dropped_files = Vec::new();
    for file in files {
        match file.patch {
            Some(patch) if patch.chars().count() > MAX_PATCH_CHARS => {
                debug!("Dropping {}: patch too large", file.filename);
                dropped_files.push(file.filename);
            }
            Some(patch) if file.status == "modified" => pr_diffs.push(PrDiff {
                file_name: file.filename,
                patch,
            }),
            Some(_) => {}
            None => {
                debug!("Dropping {}: no patch (binary or too large)", file.filename);
                dropped_files.push(file.filename);
            }
        }
    }
    Ok((pr_diffs, dropped_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::{
        CommentRef, Issue, PullRequest, PullRequestFile, Reaction,
    };
    use async_trait::async_trait;

    struct FilesOnly(Vec<PullRequestFile>);

    #[async_trait]
    impl GithubClient for FilesOnly {
        async fn get_pull_request(&self, _: &str, _: u64) -> Result<PullRequest> {
            unimplemented!()
        }
        async fn get_issue(&self, _: &str, _: u64) -> Result<Issue> {
            unimplemented!()
        }
        async fn get_file_contents(&self, _: &str, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }
        async fn list_pull_request_files(&self, _: &str, _: u64) -> Result<Vec<PullRequestFile>> {
            Ok(self.0.clone())
        }
        async fn create_issue_comment(&self, _: &str, _: u64, _: &str) -> Result<CommentRef> {
            unimplemented!()
        }
        async fn create_review_comment_reply(
            &self,
            _: &str,
            _: u64,
            _: u64,
            _: &str,
        ) -> Result<CommentRef> {
            unimplemented!()
        }
        async fn edit_comment(&self, _: &str, _: CommentRef, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn create_reaction(&self, _: &str, _: CommentRef, _: &str) -> Result<Reaction> {
            unimplemented!()
        }
        async fn list_reactions(&self, _: &str, _: CommentRef) -> Result<Vec<Reaction>> {
            unimplemented!()
        }
        async fn delete_reaction(&self, _: &str, _: CommentRef, _: u64) -> Result<()> {
            unimplemented!()
        }
    }

    fn file(filename: &str, status: &str, patch: Option<&str>) -> PullRequestFile {
        PullRequestFile {
            filename: filename.to_string(),
            status: status.to_string(),
            patch: patch.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_splits_modified_and_dropped_files() {
        let huge = "+x\n".repeat(MAX_PATCH_CHARS);
        let github = FilesOnly(vec![
            file("src/lib.rs", "modified", Some("@@ -1 +1 @@\n-a\n+b")),
            file("src/new.rs", "added", Some("@@ -0,0 +1 @@\n+c")),
            file("logo.png", "modified", None),
            file("data.json", "modified", Some(&huge)),
        ]);

        let (diffs, dropped) = get_pr_changes(&github, "acme/widgets", 3).await.unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].file_name, "src/lib.rs");
        assert_eq!(diffs[0].patch, "@@ -1 +1 @@\n-a\n+b");
        assert_eq!(dropped, vec!["logo.png".to_string(), "data.json".to_string()]);
    }
}
