use crate::adapters::llm::{LLMAdapter, LLMRequest};
use crate::adapters::repo::ClonedRepo;
use crate::core::entities::{ChangeStatus, ChangeType, FileChangeRequest, Snippet};
use crate::core::str_utils::{extract_xml_tag, objects_to_xml};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

static PLAN_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<(create|modify)\s+file="([^"]+)"\s*>(.*?)</(?:create|modify)>"#).unwrap()
});

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a senior engineer resolving a code review comment on a pull request.
Decide which files must change to resolve the request and describe each change precisely.

First explain your reasoning in a few sentences. Then answer with a single <plan> block:

<plan>
<modify file="path/to/existing_file">
Concrete instructions for this file.
</modify>
<create file="path/to/new_file">
Concrete instructions for the new file.
</create>
</plan>

Only modify files that exist in the repository. Only create files that do not exist yet.
Use paths relative to the repository root."#;

#[derive(Debug, Error, PartialEq)]
pub enum PlanValidationError {
    #[error("Cannot modify {0}: the file does not exist")]
    MissingModifyTarget(String),
    #[error("Cannot create {0}: the file already exists")]
    ExistingCreateTarget(String),
    #[error("{0} is not a path inside the repository")]
    OutsideRepository(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Returns the ordered change requests and a free-form description of the plan.
    async fn plan(
        &self,
        snippets: &[Snippet],
        read_only_snippets: &[Snippet],
        problem_statement: &str,
        repo_name: &str,
        pr_diffs: Option<&str>,
        repo: &ClonedRepo,
    ) -> Result<(Vec<FileChangeRequest>, String)>;
}

pub fn validate_file_change_requests(
    file_change_requests: &[FileChangeRequest],
    repo: &ClonedRepo,
) -> Result<(), PlanValidationError> {
    for fcr in file_change_requests {
        if repo.resolve(&fcr.filename).is_err() {
            return Err(PlanValidationError::OutsideRepository(fcr.filename.clone()));
        }
        match fcr.change_type {
            ChangeType::Modify if !repo.exists(&fcr.filename) => {
                return Err(PlanValidationError::MissingModifyTarget(fcr.filename.clone()));
            }
            ChangeType::Create if repo.exists(&fcr.filename) => {
                return Err(PlanValidationError::ExistingCreateTarget(fcr.filename.clone()));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Pulls `<create>`/`<modify>` entries out of the `<plan>` block of a response.
pub fn parse_plan(response: &str) -> (Vec<FileChangeRequest>, String) {
    let description = match response.find("<plan>") {
        Some(index) => response[..index].trim().to_string(),
        None => response.trim().to_string(),
    };
    let Some(plan) = extract_xml_tag(response, "plan", false) else {
        return (Vec::new(), description);
    };

    let file_change_requests = PLAN_ENTRY
        .captures_iter(&plan)
        .map(|captures| FileChangeRequest {
            filename: captures[2].trim().trim_start_matches("./").to_string(),
            change_type: if &captures[1] == "create" {
                ChangeType::Create
            } else {
                ChangeType::Modify
            },
            instructions: captures[3].trim().to_string(),
            status: ChangeStatus::Queued,
        })
        .collect();
    (file_change_requests, description)
}

pub struct LlmPlanner {
    adapter: Arc<dyn LLMAdapter>,
}

impl LlmPlanner {
    pub fn new(adapter: Arc<dyn LLMAdapter>) -> Self {
        Self { adapter }
    }

    fn build_prompt(
        snippets: &[Snippet],
        read_only_snippets: &[Snippet],
        problem_statement: &str,
        repo_name: &str,
        pr_diffs: Option<&str>,
    ) -> Result<String> {
        let mut prompt = format!("<repo_name>\n{}\n</repo_name>\n\n", repo_name);
        prompt.push_str(&objects_to_xml(snippets, "snippet", Some("relevant_snippets"))?);
        prompt.push_str("\n\n");
        if !read_only_snippets.is_empty() {
            prompt.push_str(&objects_to_xml(
                read_only_snippets,
                "snippet",
                Some("read_only_snippets"),
            )?);
            prompt.push_str("\n\n");
        }
        if let Some(diffs) = pr_diffs.filter(|d| !d.trim().is_empty()) {
            prompt.push_str("These changes were already made in the pull request:\n");
            prompt.push_str(diffs);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "<request>\n{}\n</request>",
            problem_statement.trim()
        ));
        Ok(prompt)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        snippets: &[Snippet],
        read_only_snippets: &[Snippet],
        problem_statement: &str,
        repo_name: &str,
        pr_diffs: Option<&str>,
        repo: &ClonedRepo,
    ) -> Result<(Vec<FileChangeRequest>, String)> {
        let user_prompt = Self::build_prompt(
            snippets,
            read_only_snippets,
            problem_statement,
            repo_name,
            pr_diffs,
        )?;
        debug!(
            "Planning against {} snippets in {}",
            snippets.len(),
            repo.root().display()
        );

        let response = self
            .adapter
            .complete(LLMRequest {
                system_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
                user_prompt,
                temperature: None,
                max_tokens: None,
            })
            .await
            .context("Planning request failed")?;

        let (file_change_requests, description) = parse_plan(&response.content);
        info!(
            "{} proposed {} file changes ({} tokens)",
            response.model,
            file_change_requests.len(),
            response.usage.map(|u| u.total_tokens).unwrap_or_default()
        );
        Ok((file_change_requests, description))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::llm::LLMResponse;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every request.
    pub(crate) struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        pub requests: Mutex<Vec<LLMRequest>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMAdapter for ScriptedLlm {
        async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
            self.requests.lock().unwrap().push(request);
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .context("no scripted response left")?;
            Ok(LLMResponse {
                content,
                model: "scripted".to_string(),
                usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn fcr(filename: &str, change_type: ChangeType) -> FileChangeRequest {
        FileChangeRequest {
            filename: filename.to_string(),
            change_type,
            instructions: "x".to_string(),
            status: ChangeStatus::Queued,
        }
    }

    #[test]
    fn test_parse_plan() {
        let response = r#"The helper is misnamed.

<plan>
<modify file="src/lib.rs">
Rename `helpr` to `helper`.
</modify>
<create file="./src/helper_test.rs">
Add a test for `helper`.
</create>
</plan>"#;
        let (fcrs, description) = parse_plan(response);
        assert_eq!(description, "The helper is misnamed.");
        assert_eq!(fcrs.len(), 2);
        assert_eq!(fcrs[0].filename, "src/lib.rs");
        assert_eq!(fcrs[0].change_type, ChangeType::Modify);
        assert_eq!(fcrs[0].instructions, "Rename `helpr` to `helper`.");
        assert_eq!(fcrs[1].filename, "src/helper_test.rs");
        assert_eq!(fcrs[1].change_type, ChangeType::Create);
    }

    #[test]
    fn test_parse_plan_without_plan_block() {
        let (fcrs, description) = parse_plan("Nothing needs to change.");
        assert!(fcrs.is_empty());
        assert_eq!(description, "Nothing needs to change.");
    }

    #[test]
    fn test_validate_file_change_requests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exists.rs"), "fn main() {}\n").unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());

        assert!(validate_file_change_requests(
            &[fcr("exists.rs", ChangeType::Modify), fcr("new.rs", ChangeType::Create)],
            &repo
        )
        .is_ok());
        assert_eq!(
            validate_file_change_requests(&[fcr("missing.rs", ChangeType::Modify)], &repo),
            Err(PlanValidationError::MissingModifyTarget("missing.rs".to_string()))
        );
        assert_eq!(
            validate_file_change_requests(&[fcr("exists.rs", ChangeType::Create)], &repo),
            Err(PlanValidationError::ExistingCreateTarget("exists.rs".to_string()))
        );
        assert_eq!(
            validate_file_change_requests(&[fcr("../escape.rs", ChangeType::Create)], &repo),
            Err(PlanValidationError::OutsideRepository("../escape.rs".to_string()))
        );
    }

    #[tokio::test]
    async fn test_llm_planner_prompt_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ClonedRepo::new("acme/widgets", "main", dir.path().to_path_buf());
        let llm = Arc::new(ScriptedLlm::new(&[
            "<plan>\n<modify file=\"src/lib.rs\">\nDo it.\n</modify>\n</plan>",
        ]));
        let planner = LlmPlanner::new(llm.clone());
        let snippets = vec![Snippet::from_file("src/lib.rs", "fn helpr() {}\n")];

        let (fcrs, _) = planner
            .plan(
                &snippets,
                &[],
                "rename helpr",
                "widgets",
                Some("<files_changed>\n</files_changed>"),
                &repo,
            )
            .await
            .unwrap();

        assert_eq!(fcrs.len(), 1);
        let requests = llm.requests.lock().unwrap();
        let prompt = &requests[0].user_prompt;
        assert!(prompt.contains("<relevant_snippets>\n<snippet>\n<file_path>\nsrc/lib.rs\n</file_path>"));
        assert!(prompt.contains("<request>\nrename helpr\n</request>"));
        assert!(prompt.contains("already made in the pull request"));
        assert!(!prompt.contains("<read_only_snippets>"));
    }
}
