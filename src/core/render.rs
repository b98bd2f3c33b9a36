use crate::core::entities::{ChangeType, FileChangeRequest};
use crate::core::str_utils::{blockquote, create_checkbox, inline_code};

const SWEEPING_GIF_URL: &str =
    "https://raw.githubusercontent.com/sweepai/sweep/main/.assets/sweeping.gif";

pub const SEARCHING_MESSAGE: &str = "Searching for relevant snippets...";
pub const CHANGING_MESSAGE: &str =
    "I just completed searching for relevant files, now I'm making changes...";
pub const CLOSED_PR_MESSAGE: &str = "PR is closed. No event fired.";

fn center(text: &str) -> String {
    format!("<div align='center'>{}</div>", text)
}

/// Banner shown at the top of the progress comment while work is underway.
pub fn working_banner() -> String {
    let gif = format!(
        "<img src=\"{}\" alt=\"Sweeping\" width=\"100\" />",
        SWEEPING_GIF_URL
    );
    format!(
        "{}\n\n<div align='center'><h3>Sweep is working on resolving your comment...<h3/></div>\n\n",
        center(&gif)
    )
}

pub fn error_message(title: &str) -> String {
    format!(
        "❌ {}\n\nPlease report this on our [community forum](https://community.sweep.dev/).",
        title
    )
}

pub fn search_failure_message(error: &str, trace: &str) -> String {
    error_message(&format!(
        "An error occured!\n\nThe exception message is:{}\n\nThe stack trace is:{}",
        error, trace
    ))
}

pub fn change_failure_message(error: &str, trace: &str) -> String {
    error_message(&format!(
        "Failed to make changes:\n\nThe exception message is:{}\n\nThe stack trace is:{}",
        error, trace
    ))
}

/// Markdown checklist describing every planned file change.
pub fn render_fcrs(file_change_requests: &[FileChangeRequest]) -> String {
    file_change_requests
        .iter()
        .map(|fcr| {
            let verb = match fcr.change_type {
                ChangeType::Create => "Create",
                ChangeType::Modify => "Modify",
            };
            let title = format!("{} {}", verb, inline_code(&fcr.filename));
            create_checkbox(&title, &blockquote(fcr.instructions.trim()), false)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn planning_message(comment: &str, username: &str, file_change_requests: &[FileChangeRequest]) -> String {
    let sweep_response = format!(
        "I'm going to make the following changes:\n\n{}\n\nI'm currently validating these changes using parsers and linters to check for syntax errors and undefined variables...",
        render_fcrs(file_change_requests)
    );
    let quoted_comment = format!("{}\n\n", blockquote(comment));
    format!(
        "{}{}\n\nHi @{},\n\n{}",
        working_banner(),
        quoted_comment,
        username,
        sweep_response
    )
}

pub fn resolved_message(repo_full_name: &str, commit_sha: &str, patch_diff: &str) -> String {
    let short_sha: String = commit_sha.chars().take(7).collect();
    let header = format!(
        "### 🚀 Resolved via [{}](https://github.com/{}/commit/{})",
        short_sha, repo_full_name, commit_sha
    );
    if patch_diff.is_empty() {
        header
    } else {
        format!(
            "{}\n\nHere were the changes I made:\n```diff\n{}\n```",
            header, patch_diff
        )
    }
}

/// Problem statement for the planner when the comment sits on a specific line.
pub fn review_comment_query(pr_path: &str, comment: &str, formatted_chunk: &str) -> String {
    format!(
        "The user left this GitHub PR Review comment in `{}`:\n<comment>\n{}\n</comment>\nThis was where they left their comment on the PR:\n<review_code_chunk>\n{}\n</review_code_chunk>.\n\nResolve their comment.",
        pr_path, comment, formatted_chunk
    )
}
