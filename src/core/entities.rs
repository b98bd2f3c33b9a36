use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A comment left on a pull request, as delivered by the webhook dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEvent {
    pub repo_full_name: String,
    #[serde(default)]
    pub repo_description: String,
    pub comment: String,
    #[serde(default)]
    pub pr_path: Option<String>,
    #[serde(default)]
    pub pr_line_position: Option<usize>,
    pub username: String,
    pub installation_id: u64,
    pub pr_number: u64,
    #[serde(default)]
    pub comment_id: Option<u64>,
    #[serde(default)]
    pub tracking_id: Option<String>,
}

impl CommentEvent {
    /// True when the comment is attached to a specific line of a file.
    pub fn is_file_comment(&self) -> bool {
        self.pr_path.as_deref().is_some_and(|p| !p.trim().is_empty())
            && self.pr_line_position.is_some_and(|line| line > 0)
    }

    pub fn split_repo_name(&self) -> (String, String) {
        match self.repo_full_name.split_once('/') {
            Some((org, name)) => (org.to_string(), name.to_string()),
            None => (String::new(), self.repo_full_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

impl CommentOutcome {
    pub fn noop(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            commit_sha: None,
        }
    }

    pub fn committed(sha: impl Into<String>) -> Self {
        Self {
            success: true,
            message: None,
            commit_sha: Some(sha.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: PullRequestState,
    pub head_ref: String,
    pub assignee: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub author: String,
}

/// A file touched by a pull request, as listed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommentKind {
    Issue,
    Review,
}

/// A comment the bot can react to or edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentRef {
    pub kind: CommentKind,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub id: u64,
    pub content: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub file_path: String,
    pub start: usize,
    pub end: usize,
    pub content: String,
}

impl Snippet {
    pub fn from_file(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let end = content.lines().count();
        Self {
            file_path: file_path.into(),
            start: 0,
            end,
            content,
        }
    }

    pub fn denotation(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Modify,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    #[default]
    Queued,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChangeRequest {
    pub filename: String,
    pub change_type: ChangeType,
    pub instructions: String,
    #[serde(default)]
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModifiedFile {
    pub original_contents: String,
    pub contents: String,
}

pub type ModifiedFiles = BTreeMap<String, ModifiedFile>;

/// A single file's patch within a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrDiff {
    pub file_name: String,
    pub patch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CommentEvent {
        serde_json::from_str(
            r#"{
                "repo_full_name": "acme/widgets",
                "comment": "rename this",
                "pr_path": "src/lib.rs",
                "pr_line_position": 4,
                "username": "alice",
                "installation_id": 7,
                "pr_number": 12
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_comment_event_defaults() {
        let event = sample_event();
        assert_eq!(event.repo_description, "");
        assert_eq!(event.comment_id, None);
        assert!(event.is_file_comment());
        assert_eq!(
            event.split_repo_name(),
            ("acme".to_string(), "widgets".to_string())
        );
    }

    #[test]
    fn test_file_comment_requires_path_and_line() {
        let mut event = sample_event();
        event.pr_line_position = None;
        assert!(!event.is_file_comment());

        let mut event = sample_event();
        event.pr_path = Some("  ".to_string());
        assert!(!event.is_file_comment());

        let mut event = sample_event();
        event.pr_line_position = Some(0);
        assert!(!event.is_file_comment());
    }

    #[test]
    fn test_snippet_from_file() {
        let snippet = Snippet::from_file("a.rs", "one\ntwo\nthree\n");
        assert_eq!(snippet.start, 0);
        assert_eq!(snippet.end, 3);
        assert_eq!(snippet.denotation(), "a.rs:0-3");
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&CommentOutcome::noop("closed")).unwrap();
        assert_eq!(json, r#"{"success":true,"message":"closed"}"#);
    }
}
