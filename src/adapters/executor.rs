use crate::adapters::llm::{LLMAdapter, LLMRequest};
use crate::adapters::repo::ClonedRepo;
use crate::core::entities::{ChangeStatus, ChangeType, FileChangeRequest, ModifiedFile, ModifiedFiles};
use crate::core::str_utils::{add_line_numbers, extract_xml_tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

const EDIT_SYSTEM_PROMPT: &str = r#"You are a careful engineer applying one planned change to one file.
Rewrite the whole file with the change applied. Keep everything unrelated exactly as it is.
Answer with the complete new file inside a single <updated_file> block and nothing else."#;

#[async_trait]
pub trait EditExecutor: Send + Sync {
    /// Materializes the change requests. Returns the touched files, whether
    /// anything changed, and the requests with their final status.
    async fn execute(
        &self,
        file_change_requests: Vec<FileChangeRequest>,
        repo: &ClonedRepo,
        username: &str,
        installation_id: Option<u64>,
    ) -> Result<(ModifiedFiles, bool, Vec<FileChangeRequest>)>;
}

pub struct LlmEditExecutor {
    adapter: Arc<dyn LLMAdapter>,
}

impl LlmEditExecutor {
    pub fn new(adapter: Arc<dyn LLMAdapter>) -> Self {
        Self { adapter }
    }

    fn build_prompt(fcr: &FileChangeRequest, current_contents: &str) -> String {
        let file_block = if current_contents.is_empty() {
            "(this file does not exist yet)".to_string()
        } else {
            add_line_numbers(current_contents, 1)
        };
        format!(
            "<file path=\"{}\">\n{}\n</file>\n\n<instructions>\n{}\n</instructions>",
            fcr.filename, file_block, fcr.instructions
        )
    }

    async fn rewrite(&self, fcr: &FileChangeRequest, current_contents: &str) -> Result<Option<String>> {
        let response = self
            .adapter
            .complete(LLMRequest {
                system_prompt: EDIT_SYSTEM_PROMPT.to_string(),
                user_prompt: Self::build_prompt(fcr, current_contents),
                temperature: None,
                max_tokens: None,
            })
            .await
            .with_context(|| format!("Edit request for {} failed", fcr.filename))?;
        Ok(extract_xml_tag(&response.content, "updated_file", false).map(|contents| {
            if contents.ends_with('\n') {
                contents
            } else {
                format!("{}\n", contents)
            }
        }))
    }
}

#[async_trait]
impl EditExecutor for LlmEditExecutor {
    async fn execute(
        &self,
        mut file_change_requests: Vec<FileChangeRequest>,
        repo: &ClonedRepo,
        username: &str,
        installation_id: Option<u64>,
    ) -> Result<(ModifiedFiles, bool, Vec<FileChangeRequest>)> {
        info!(
            "Applying {} changes for {} (installation {:?})",
            file_change_requests.len(),
            username,
            installation_id
        );
        let mut modified_files = ModifiedFiles::new();

        for fcr in file_change_requests.iter_mut() {
            let original_contents = match modified_files.get(&fcr.filename) {
                Some(file) => file.original_contents.clone(),
                None => match fcr.change_type {
                    ChangeType::Modify => repo.get_file_contents(&fcr.filename)?,
                    ChangeType::Create => String::new(),
                },
            };
            let current_contents = modified_files
                .get(&fcr.filename)
                .map(|file| file.contents.clone())
                .unwrap_or_else(|| original_contents.clone());

            match self.rewrite(fcr, &current_contents).await? {
                Some(contents) => {
                    fcr.status = ChangeStatus::Succeeded;
                    modified_files.insert(
                        fcr.filename.clone(),
                        ModifiedFile {
                            original_contents,
                            contents,
                        },
                    );
                }
                None => {
                    warn!("No <updated_file> block returned for {}", fcr.filename);
                    fcr.status = ChangeStatus::Failed;
                }
            }
        }

        let changes_made = modified_files
            .values()
            .any(|file| file.contents != file.original_contents);
        Ok((modified_files, changes_made, file_change_requests))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::planner::tests::ScriptedLlm;

    fn fcr(filename: &str, change_type: ChangeType) -> FileChangeRequest {
        FileChangeRequest {
            filename: filename.to_string(),
            change_type,
            instructions: "Rename helpr to helper.".to_string(),
            status: ChangeStatus::Queued,
        }
    }

    #[tokio::test]
    async fn test_execute_modifies_and_creates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn helpr() {}\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());
        let llm = Arc::new(ScriptedLlm::new(&[
            "<updated_file>\nfn helper() {}\n</updated_file>",
            "<updated_file>\nmod lib;",
        ]));
        let executor = LlmEditExecutor::new(llm.clone());

        let (modified, changed, fcrs) = executor
            .execute(
                vec![fcr("lib.rs", ChangeType::Modify), fcr("main.rs", ChangeType::Create)],
                &repo,
                "alice",
                Some(1),
            )
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(modified["lib.rs"].original_contents, "fn helpr() {}\n");
        assert_eq!(modified["lib.rs"].contents, "fn helper() {}\n");
        assert_eq!(modified["main.rs"].original_contents, "");
        assert_eq!(modified["main.rs"].contents, "mod lib;\n");
        assert!(fcrs.iter().all(|f| f.status == ChangeStatus::Succeeded));

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].user_prompt.contains("1 | fn helpr() {}"));
        assert!(requests[1].user_prompt.contains("does not exist yet"));
    }

    #[tokio::test]
    async fn test_missing_updated_file_marks_request_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());
        let executor = LlmEditExecutor::new(Arc::new(ScriptedLlm::new(&["I can't do that."])));

        let (modified, changed, fcrs) = executor
            .execute(vec![fcr("lib.rs", ChangeType::Modify)], &repo, "alice", None)
            .await
            .unwrap();

        assert!(modified.is_empty());
        assert!(!changed);
        assert_eq!(fcrs[0].status, ChangeStatus::Failed);
    }

    #[tokio::test]
    async fn test_unchanged_rewrite_reports_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());
        let executor = LlmEditExecutor::new(Arc::new(ScriptedLlm::new(&[
            "<updated_file>\nfn a() {}\n</updated_file>",
        ])));

        let (modified, changed, _) = executor
            .execute(vec![fcr("lib.rs", ChangeType::Modify)], &repo, "alice", None)
            .await
            .unwrap();

        assert_eq!(modified.len(), 1);
        assert!(!changed);
    }
}
