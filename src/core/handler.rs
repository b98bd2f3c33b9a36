use crate::adapters::chat_logger::{ChatLogger, ChatSession};
use crate::adapters::executor::EditExecutor;
use crate::adapters::github::{CommitCreator, GithubClient};
use crate::adapters::planner::{validate_file_change_requests, Planner};
use crate::adapters::repo::ClonedRepo;
use crate::adapters::retrieval::{RetrievedContext, SnippetRetriever};
use crate::adapters::telemetry::{capture_in_background, Properties, TelemetrySink};
use crate::config::HandlerConfig;
use crate::core::diff::{format_pr_diff_string, generate_diff, render_committed_patch};
use crate::core::entities::{
    CommentEvent, CommentKind, CommentOutcome, CommentRef, ModifiedFiles, PullRequest,
    PullRequestState, Reaction, Snippet,
};
use crate::core::pr_changes::get_pr_changes;
use crate::core::render;
use crate::core::sanitize::validate_and_sanitize;
use crate::core::str_utils::{sanitize_for_github, FASTER_MODEL_MESSAGE};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

const IMPROVEMENTS_MARKER: &str = "<details>\n<summary><b>🎉 Latest improvements to Sweep:";

static ISSUE_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Fixes #(\d+)\.").unwrap());

#[derive(Debug, Error)]
#[error("I couldn't find any relevant files to change.")]
pub struct NoFilesError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{}", FASTER_MODEL_MESSAGE)]
    FasterModelRequired,
    #[error("{0:#}")]
    Discovery(anyhow::Error),
    #[error("{0:#}")]
    ChangeApplication(anyhow::Error),
    #[error("{0:#}")]
    Platform(anyhow::Error),
}

impl HandlerError {
    pub fn is_no_relevant_files(&self) -> bool {
        matches!(self, HandlerError::ChangeApplication(err) if err.downcast_ref::<NoFilesError>().is_some())
    }
}

/// The collaborators a handler sequences.
pub struct Collaborators {
    pub github: Arc<dyn GithubClient>,
    pub committer: Arc<dyn CommitCreator>,
    pub chat_logger: Option<Arc<dyn ChatLogger>>,
    pub retriever: Arc<dyn SnippetRetriever>,
    pub planner: Arc<dyn Planner>,
    pub executor: Arc<dyn EditExecutor>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// The region of a file around a line-anchored comment.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentWindow {
    pub pr_chunk: String,
    pub formatted_pr_chunk: String,
}

/// Cuts `radius` lines on each side of 1-based `line`, clamped to the file,
/// and marks the commented line inline.
pub fn comment_window(
    contents: &str,
    line: usize,
    comment: &str,
    radius: usize,
) -> Result<CommentWindow> {
    let lines: Vec<&str> = contents.lines().collect();
    if line == 0 || line > lines.len() {
        anyhow::bail!(
            "Line {} is outside the file, which has {} lines",
            line,
            lines.len()
        );
    }
    let start = line.saturating_sub(radius + 1);
    let end = lines.len().min(line + radius);

    let pr_chunk = lines[start..end].join("\n");
    let formatted_pr_chunk = format!(
        "{}\n{} <--- GITHUB COMMENT: {} --->\n{}",
        lines[start..line - 1].join("\n"),
        lines[line - 1],
        comment.trim(),
        lines[line..end].join("\n")
    );
    Ok(CommentWindow {
        pr_chunk,
        formatted_pr_chunk,
    })
}

fn strip_improvements(body: Option<&str>) -> String {
    let body = body.unwrap_or_default();
    match body.find(IMPROVEMENTS_MARKER) {
        Some(index) => body[..index].to_string(),
        None => body.to_string(),
    }
}

fn merged(base: &Properties, extra: Value) -> Properties {
    let mut properties = base.clone();
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    properties
}

/// The single bot comment that reports progress for one invocation.
struct ProgressComment<'a> {
    github: &'a dyn GithubClient,
    repo_full_name: &'a str,
    bot_suffix: &'a str,
    comment: Option<CommentRef>,
}

impl<'a> ProgressComment<'a> {
    async fn post(&mut self, event: &CommentEvent, body: &str) -> Result<()> {
        let body = format!("{}{}", sanitize_for_github(body), self.bot_suffix);
        let comment = match (event.is_file_comment(), event.comment_id) {
            (true, Some(comment_id)) => {
                self.github
                    .create_review_comment_reply(
                        self.repo_full_name,
                        event.pr_number,
                        comment_id,
                        &body,
                    )
                    .await?
            }
            _ => {
                self.github
                    .create_issue_comment(self.repo_full_name, event.pr_number, &body)
                    .await?
            }
        };
        self.comment = Some(comment);
        Ok(())
    }

    async fn edit(&self, body: &str) -> Result<()> {
        let Some(comment) = self.comment else {
            return Ok(());
        };
        let body = format!("{}\n{}", sanitize_for_github(body), self.bot_suffix);
        self.github
            .edit_comment(self.repo_full_name, comment, &body)
            .await
    }
}

/// What discovery hands to the change-application phase.
struct Discovery {
    cloned_repo: ClonedRepo,
    retrieved: RetrievedContext,
    snippets: Vec<Snippet>,
    pr_diff_string: String,
    window: Option<CommentWindow>,
}

struct Applied {
    modified_files: ModifiedFiles,
    committed: BTreeMap<String, String>,
    commit_sha: String,
}

#[derive(Clone, Copy)]
enum Stage {
    Discovery,
    ChangeApplication,
}

pub struct CommentHandler {
    config: HandlerConfig,
    checkout_root: PathBuf,
    github: Arc<dyn GithubClient>,
    committer: Arc<dyn CommitCreator>,
    chat_logger: Option<Arc<dyn ChatLogger>>,
    retriever: Arc<dyn SnippetRetriever>,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn EditExecutor>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl CommentHandler {
    pub fn new(config: HandlerConfig, checkout_root: PathBuf, collaborators: Collaborators) -> Self {
        Self {
            config,
            checkout_root,
            github: collaborators.github,
            committer: collaborators.committer,
            chat_logger: collaborators.chat_logger,
            retriever: collaborators.retriever,
            planner: collaborators.planner,
            executor: collaborators.executor,
            telemetry: collaborators.telemetry,
        }
    }

    pub async fn handle(&self, event: &CommentEvent) -> Result<CommentOutcome, HandlerError> {
        let span = info_span!(
            "on_comment",
            tracking_id = %event.tracking_id.as_deref().unwrap_or_default()
        );
        self.handle_inner(event).instrument(span).await
    }

    async fn handle_inner(&self, event: &CommentEvent) -> Result<CommentOutcome, HandlerError> {
        info!(
            "Handling comment on {}#{}: {}",
            event.repo_full_name, event.pr_number, event.comment
        );
        let start = Instant::now();
        let repo_full_name = event.repo_full_name.as_str();

        let pr = self
            .github
            .get_pull_request(repo_full_name, event.pr_number)
            .await
            .map_err(HandlerError::Platform)?;
        if pr.state == PullRequestState::Closed {
            info!("Pull request #{} is closed", pr.number);
            return Ok(CommentOutcome::noop(render::CLOSED_PR_MESSAGE));
        }

        let pr_body = strip_improvements(pr.body.as_deref());
        let issue_number = ISSUE_REFERENCE
            .captures(&pr_body)
            .and_then(|captures| captures[1].parse::<u64>().ok());

        let is_paying_user = self.check_tier(event, &pr, issue_number).await?;

        let metadata = self.metadata(event, &pr, issue_number, is_paying_user);
        self.capture(
            &event.username,
            "started",
            merged(&metadata, json!({ "duration": start.elapsed().as_secs_f64() })),
        )
        .await;

        let mut progress = ProgressComment {
            github: self.github.as_ref(),
            repo_full_name,
            bot_suffix: &self.config.bot_suffix,
            comment: None,
        };
        let mut eyes = None;

        let discovery = match self.discover(event, &pr, &mut progress, &mut eyes).await {
            Ok(discovery) => discovery,
            Err(err) => {
                self.report_failure(Stage::Discovery, &err, event, &progress, &metadata, start)
                    .await;
                return Err(HandlerError::Discovery(err));
            }
        };

        let applied = match self.apply_changes(event, &pr, discovery, &progress).await {
            Ok(applied) => applied,
            Err(err) => {
                self.report_failure(
                    Stage::ChangeApplication,
                    &err,
                    event,
                    &progress,
                    &metadata,
                    start,
                )
                .await;
                return Err(HandlerError::ChangeApplication(err));
            }
        };

        if let Some((target, reaction)) = eyes {
            if let Err(err) = self
                .github
                .delete_reaction(repo_full_name, target, reaction.id)
                .await
            {
                debug!("Could not remove eyes reaction: {}", err);
            }
        }
        if let Some(comment_id) = event.comment_id {
            self.react(repo_full_name, comment_id, "rocket").await;
        }

        let patch_diff = render_committed_patch(&applied.modified_files, &applied.committed);
        let resolved = render::resolved_message(repo_full_name, &applied.commit_sha, &patch_diff);
        if let Err(err) = progress.edit(&resolved).await {
            warn!("Could not post the resolved message: {}", err);
        }

        capture_in_background(
            self.telemetry.clone(),
            event.username.clone(),
            "success",
            merged(&metadata, json!({ "duration": start.elapsed().as_secs_f64() })),
        );
        info!("Resolved comment with commit {}", applied.commit_sha);
        Ok(CommentOutcome::committed(applied.commit_sha))
    }

    /// Returns whether the caller is on the paid tier. Fails when the caller
    /// is restricted to the faster model.
    async fn check_tier(
        &self,
        event: &CommentEvent,
        pr: &PullRequest,
        issue_number: Option<u64>,
    ) -> Result<bool, HandlerError> {
        let Some(chat_logger) = &self.chat_logger else {
            return Ok(true);
        };
        let author = match (&pr.assignee, issue_number) {
            (Some(assignee), _) => assignee.clone(),
            (None, Some(number)) => {
                self.github
                    .get_issue(&event.repo_full_name, number)
                    .await
                    .map_err(HandlerError::Platform)?
                    .author
            }
            (None, None) => return Ok(true),
        };
        info!("Author of original issue is {}", author);

        let (_, repo_name) = event.split_repo_name();
        let session = ChatSession {
            repo_name,
            title: format!("(Comment) {}", pr.title),
            issue_url: pr.html_url.clone(),
            repo_full_name: event.repo_full_name.clone(),
            repo_description: event.repo_description.clone(),
            comment: event.comment.clone(),
            pr_path: event.pr_path.clone(),
            pr_line_position: event.pr_line_position,
            username: author,
            installation_id: event.installation_id,
            pr_number: event.pr_number,
        };
        let is_paying_user = chat_logger
            .is_paying_user(&session)
            .await
            .map_err(HandlerError::Platform)?;
        let use_faster_model = chat_logger
            .use_faster_model(&session)
            .await
            .map_err(HandlerError::Platform)?;
        if use_faster_model {
            return Err(HandlerError::FasterModelRequired);
        }
        Ok(is_paying_user)
    }

    fn metadata(
        &self,
        event: &CommentEvent,
        pr: &PullRequest,
        issue_number: Option<u64>,
        is_paying_user: bool,
    ) -> Properties {
        let (organization, repo_name) = event.split_repo_name();
        let username = if event.username.starts_with(&self.config.bot_username_prefix) {
            json!(pr.assignee)
        } else {
            json!(event.username)
        };
        let pr_number = if event.pr_number != 0 {
            event.pr_number
        } else {
            pr.id
        };
        let tier = if is_paying_user { "pro" } else { "free" };
        let value = json!({
            "repo_full_name": event.repo_full_name,
            "repo_name": repo_name,
            "organization": organization,
            "repo_description": event.repo_description,
            "installation_id": event.installation_id,
            "username": username,
            "function": "on_comment",
            "model": self.config.model,
            "tier": tier,
            "mode": self.config.environment,
            "pr_path": event.pr_path,
            "pr_line_position": event.pr_line_position,
            "pr_number": pr_number,
            "pr_html_url": pr.html_url,
            "comment_id": event.comment_id,
            "comment": event.comment,
            "issue_number": issue_number.map(|n| n.to_string()).unwrap_or_default(),
            "tracking_id": event.tracking_id,
        });
        merged(&Properties::new(), value)
    }

    async fn discover(
        &self,
        event: &CommentEvent,
        pr: &PullRequest,
        progress: &mut ProgressComment<'_>,
        eyes: &mut Option<(CommentRef, Reaction)>,
    ) -> Result<Discovery> {
        let repo_full_name = event.repo_full_name.as_str();
        if let Some(comment_id) = event.comment_id {
            *eyes = self.react(repo_full_name, comment_id, "eyes").await;
            if let Some((target, _)) = eyes {
                self.remove_stale_rockets(repo_full_name, *target).await;
            }
        }

        let placeholder = format!("{}{}", render::working_banner(), render::SEARCHING_MESSAGE);
        progress.post(event, &placeholder).await?;

        let branch = pr.head_ref.as_str();
        let cloned_repo = ClonedRepo::open(repo_full_name, branch, &self.checkout_root)?;

        let (pr_diffs, dropped_files) =
            get_pr_changes(self.github.as_ref(), repo_full_name, pr.number).await?;
        if !dropped_files.is_empty() {
            debug!("Ignoring files without usable patches: {:?}", dropped_files);
        }
        let pr_diff_string = format_pr_diff_string(&pr_diffs);

        let mut window = None;
        if let (true, Some(pr_path), Some(line)) = (
            event.is_file_comment(),
            event.pr_path.as_deref(),
            event.pr_line_position,
        ) {
            let contents = self
                .github
                .get_file_contents(repo_full_name, pr_path.trim(), branch)
                .await?;
            window = Some(
                comment_window(
                    &contents,
                    line,
                    &event.comment,
                    self.config.comment_window_lines,
                )
                .with_context(|| format!("Cannot locate the comment in {}", pr_path))?,
            );
        }

        let mut search_query = event.comment.trim_matches('\n').to_string();
        if let Some(window) = &window {
            search_query.push('\n');
            search_query.push_str(&window.pr_chunk);
        }
        let retrieved = self.retriever.retrieve(&cloned_repo, &search_query).await?;

        let mut snippets = pr_diffs
            .iter()
            .map(|pr_diff| -> Result<Snippet> {
                Ok(Snippet::from_file(
                    pr_diff.file_name.clone(),
                    cloned_repo.get_file_contents(&pr_diff.file_name)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        snippets.extend(retrieved.current_top_snippets.iter().cloned());
        snippets.truncate(self.config.num_snippets_to_query);
        info!("Collected {} snippets", snippets.len());

        Ok(Discovery {
            cloned_repo,
            retrieved,
            snippets,
            pr_diff_string,
            window,
        })
    }

    async fn apply_changes(
        &self,
        event: &CommentEvent,
        pr: &PullRequest,
        discovery: Discovery,
        progress: &ProgressComment<'_>,
    ) -> Result<Applied> {
        info!("Fetching files to modify/create...");
        progress
            .edit(&format!(
                "{}{}",
                render::working_banner(),
                render::CHANGING_MESSAGE
            ))
            .await?;

        let formatted_query = match (&discovery.window, event.pr_path.as_deref()) {
            (Some(window), Some(pr_path)) => {
                render::review_comment_query(pr_path, &event.comment, &window.formatted_pr_chunk)
            }
            _ => event.comment.trim_matches('\n').to_string(),
        };
        let (_, repo_name) = event.split_repo_name();
        let (file_change_requests, plan) = self
            .planner
            .plan(
                &discovery.snippets,
                &discovery.retrieved.read_only_snippets,
                &formatted_query,
                &repo_name,
                Some(&discovery.pr_diff_string),
                &discovery.cloned_repo,
            )
            .await?;
        debug!("Plan: {}", plan);
        validate_file_change_requests(&file_change_requests, &discovery.cloned_repo)?;
        if file_change_requests.is_empty() {
            return Err(NoFilesError.into());
        }

        progress
            .edit(&render::planning_message(
                &event.comment,
                &event.username,
                &file_change_requests,
            ))
            .await?;

        let (modified_files, changes_made, file_change_requests) = self
            .executor
            .execute(
                file_change_requests,
                &discovery.cloned_repo,
                &event.username,
                Some(event.installation_id),
            )
            .await?;
        info!(
            "Edits finished ({} files, changes made: {})",
            modified_files.len(),
            changes_made
        );
        for (file_path, file_data) in &modified_files {
            debug!(
                "{}\n{}",
                file_path,
                generate_diff(&file_data.original_contents, &file_data.contents)
            );
        }

        let commit_message: String = format!("feat: Updated {} files", modified_files.len())
            .chars()
            .take(self.config.commit_message_max_len)
            .collect();
        let to_commit: BTreeMap<String, String> = modified_files
            .iter()
            .map(|(path, file)| (path.clone(), file.contents.clone()))
            .collect();
        let old_keys = to_commit.keys().cloned().collect::<Vec<_>>().join(",");
        let (committed, files_removed) =
            validate_and_sanitize(to_commit, &file_change_requests, &discovery.cloned_repo);
        if files_removed && !event.username.is_empty() {
            let new_keys = committed.keys().cloned().collect::<Vec<_>>().join(",");
            self.capture(
                &event.username,
                "polluted_commits_error",
                merged(
                    &Properties::new(),
                    json!({ "old_keys": old_keys, "new_keys": new_keys }),
                ),
            )
            .await;
        }

        let commit_sha = self
            .committer
            .commit_files(
                &event.repo_full_name,
                &committed,
                &commit_message,
                &pr.head_ref,
            )
            .await?;
        info!("Done!");

        Ok(Applied {
            modified_files,
            committed,
            commit_sha,
        })
    }

    async fn report_failure(
        &self,
        stage: Stage,
        err: &anyhow::Error,
        event: &CommentEvent,
        progress: &ProgressComment<'_>,
        metadata: &Properties,
        start: Instant,
    ) {
        let trace = format!("{:?}", err);
        let message = format!("{:#}", err);
        error!("{}", trace);

        let duration = start.elapsed().as_secs_f64();
        let (properties, body) = match stage {
            Stage::Discovery => (
                json!({
                    "error": message,
                    "traceback": format!(
                        "An error occured during the search! The stack trace is below:\n\n{}",
                        trace
                    ),
                    "duration": duration,
                }),
                render::search_failure_message(&message, &trace),
            ),
            Stage::ChangeApplication => (
                json!({
                    "error": message,
                    "reason": "Failed to make changes",
                    "traceback": &trace,
                    "duration": duration,
                }),
                render::change_failure_message(&message, &trace),
            ),
        };
        self.capture(&event.username, "failed", merged(metadata, properties))
            .await;
        if let Err(edit_err) = progress.edit(&body).await {
            warn!("Could not report the failure on the pull request: {}", edit_err);
        }
    }

    /// Adds a reaction to the triggering comment, trying it as a review
    /// comment first and then as an issue comment.
    async fn react(
        &self,
        repo_full_name: &str,
        comment_id: u64,
        content: &str,
    ) -> Option<(CommentRef, Reaction)> {
        for kind in [CommentKind::Review, CommentKind::Issue] {
            let target = CommentRef { kind, id: comment_id };
            match self.github.create_reaction(repo_full_name, target, content).await {
                Ok(reaction) => return Some((target, reaction)),
                Err(err) => debug!("{} reaction on {:?} failed: {}", content, target, err),
            }
        }
        None
    }

    async fn remove_stale_rockets(&self, repo_full_name: &str, target: CommentRef) {
        let reactions = match self.github.list_reactions(repo_full_name, target).await {
            Ok(reactions) => reactions,
            Err(err) => {
                debug!("Could not list reactions: {}", err);
                return;
            }
        };
        for reaction in reactions
            .iter()
            .filter(|r| r.content == "rocket" && r.user == self.config.bot_username)
        {
            if let Err(err) = self
                .github
                .delete_reaction(repo_full_name, target, reaction.id)
                .await
            {
                debug!("Could not remove stale rocket: {}", err);
            }
        }
    }

    async fn capture(&self, distinct_id: &str, event: &str, properties: Properties) {
        if let Err(err) = self.telemetry.capture(distinct_id, event, properties).await {
            warn!("Telemetry event {} failed: {}", event, err);
        }
    }
}
