use crate::adapters::http::send_with_retry;
use crate::core::entities::{
    CommentKind, CommentRef, Issue, PullRequest, PullRequestFile, PullRequestState, Reaction,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Issue and pull request operations on the hosting platform.
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest>;
    async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue>;
    async fn get_file_contents(&self, repo: &str, path: &str, git_ref: &str) -> Result<String>;
    async fn list_pull_request_files(&self, repo: &str, number: u64)
        -> Result<Vec<PullRequestFile>>;
    async fn create_issue_comment(&self, repo: &str, issue_number: u64, body: &str)
        -> Result<CommentRef>;
    async fn create_review_comment_reply(
        &self,
        repo: &str,
        pr_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<CommentRef>;
    async fn edit_comment(&self, repo: &str, comment: CommentRef, body: &str) -> Result<()>;
    async fn create_reaction(&self, repo: &str, comment: CommentRef, content: &str)
        -> Result<Reaction>;
    async fn list_reactions(&self, repo: &str, comment: CommentRef) -> Result<Vec<Reaction>>;
    async fn delete_reaction(&self, repo: &str, comment: CommentRef, reaction_id: u64)
        -> Result<()>;
}

/// Creates a commit on a branch from a set of full file contents.
#[async_trait]
pub trait CommitCreator: Send + Sync {
    async fn commit_files(
        &self,
        repo: &str,
        files: &BTreeMap<String, String>,
        message: &str,
        branch: &str,
    ) -> Result<String>;
}

pub struct GithubRestClient {
    client: Client,
    api_base: String,
}

#[derive(Deserialize)]
struct UserPayload {
    login: String,
}

#[derive(Deserialize)]
struct HeadPayload {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    id: u64,
    number: u64,
    title: String,
    body: Option<String>,
    state: PullRequestState,
    head: HeadPayload,
    assignee: Option<UserPayload>,
    html_url: String,
}

#[derive(Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    user: UserPayload,
}

#[derive(Deserialize)]
struct CommentPayload {
    id: u64,
}

#[derive(Deserialize)]
struct ReactionPayload {
    id: u64,
    content: String,
    user: UserPayload,
}

#[derive(Deserialize)]
struct ShaPayload {
    sha: String,
}

#[derive(Deserialize)]
struct RefPayload {
    object: ShaPayload,
}

#[derive(Deserialize)]
struct CommitPayload {
    tree: ShaPayload,
}

impl From<ReactionPayload> for Reaction {
    fn from(payload: ReactionPayload) -> Self {
        Reaction {
            id: payload.id,
            content: payload.content,
            user: payload.user.login,
        }
    }
}

fn comment_path(repo: &str, comment: CommentRef) -> String {
    match comment.kind {
        CommentKind::Issue => format!("/repos/{}/issues/comments/{}", repo, comment.id),
        CommentKind::Review => format!("/repos/{}/pulls/comments/{}", repo, comment.id),
    }
}

impl GithubRestClient {
    pub fn new(api_base: impl Into<String>, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("commentfix"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("Invalid GitHub token")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = send_with_retry("GitHub", || self.client.get(&url))
            .await
            .with_context(|| format!("Failed to GET {}", path))?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        let response = send_with_retry("GitHub", || {
            self.client.request(method.clone(), &url).json(payload)
        })
        .await
        .with_context(|| format!("Failed to {} {}", method, path))?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

#[async_trait]
impl GithubClient for GithubRestClient {
    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest> {
        let payload: PullRequestPayload = self
            .get_json(&format!("/repos/{}/pulls/{}", repo, number))
            .await?;
        Ok(PullRequest {
            id: payload.id,
            number: payload.number,
            title: payload.title,
            body: payload.body,
            state: payload.state,
            head_ref: payload.head.git_ref,
            assignee: payload.assignee.map(|a| a.login),
            html_url: payload.html_url,
        })
    }

    async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue> {
        let payload: IssuePayload = self
            .get_json(&format!("/repos/{}/issues/{}", repo, number))
            .await?;
        Ok(Issue {
            number: payload.number,
            title: payload.title,
            author: payload.user.login,
        })
    }

    async fn get_file_contents(&self, repo: &str, path: &str, git_ref: &str) -> Result<String> {
        let url = self.url(&format!("/repos/{}/contents/{}", repo, path));
        let response = send_with_retry("GitHub", || {
            self.client
                .get(&url)
                .query(&[("ref", git_ref)])
                .header(ACCEPT, "application/vnd.github.raw+json")
        })
        .await
        .with_context(|| format!("Failed to fetch {} at {}", path, git_ref))?;
        Ok(response.text().await?)
    }

    async fn list_pull_request_files(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>> {
        const PER_PAGE: usize = 100;
        let url = self.url(&format!("/repos/{}/pulls/{}/files", repo, number));
        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let page_value = page.to_string();
            let per_page = PER_PAGE.to_string();
            let chunk: Vec<PullRequestFile> = send_with_retry("GitHub", || {
                self.client.get(&url).query(&[
                    ("per_page", per_page.as_str()),
                    ("page", page_value.as_str()),
                ])
            })
            .await
            .context("Failed to list pull request files")?
            .json()
            .await
            .context("Failed to parse pull request files")?;
            let chunk_len = chunk.len();
            files.extend(chunk);
            if chunk_len < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(files)
    }

    async fn create_issue_comment(
        &self,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<CommentRef> {
        let payload: CommentPayload = self
            .send_json(
                reqwest::Method::POST,
                &format!("/repos/{}/issues/{}/comments", repo, issue_number),
                &json!({ "body": body }),
            )
            .await?;
        Ok(CommentRef {
            kind: CommentKind::Issue,
            id: payload.id,
        })
    }

    async fn create_review_comment_reply(
        &self,
        repo: &str,
        pr_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<CommentRef> {
        let payload: CommentPayload = self
            .send_json(
                reqwest::Method::POST,
                &format!(
                    "/repos/{}/pulls/{}/comments/{}/replies",
                    repo, pr_number, comment_id
                ),
                &json!({ "body": body }),
            )
            .await?;
        Ok(CommentRef {
            kind: CommentKind::Review,
            id: payload.id,
        })
    }

    async fn edit_comment(&self, repo: &str, comment: CommentRef, body: &str) -> Result<()> {
        let _: CommentPayload = self
            .send_json(
                reqwest::Method::PATCH,
                &comment_path(repo, comment),
                &json!({ "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn create_reaction(
        &self,
        repo: &str,
        comment: CommentRef,
        content: &str,
    ) -> Result<Reaction> {
        let payload: ReactionPayload = self
            .send_json(
                reqwest::Method::POST,
                &format!("{}/reactions", comment_path(repo, comment)),
                &json!({ "content": content }),
            )
            .await?;
        Ok(payload.into())
    }

    async fn list_reactions(&self, repo: &str, comment: CommentRef) -> Result<Vec<Reaction>> {
        let payload: Vec<ReactionPayload> = self
            .get_json(&format!("{}/reactions", comment_path(repo, comment)))
            .await?;
        Ok(payload.into_iter().map(Reaction::from).collect())
    }

    async fn delete_reaction(
        &self,
        repo: &str,
        comment: CommentRef,
        reaction_id: u64,
    ) -> Result<()> {
        let url = self.url(&format!(
            "{}/reactions/{}",
            comment_path(repo, comment),
            reaction_id
        ));
        send_with_retry("GitHub", || self.client.delete(&url))
            .await
            .context("Failed to delete reaction")?;
        Ok(())
    }
}

#[async_trait]
impl CommitCreator for GithubRestClient {
    async fn commit_files(
        &self,
        repo: &str,
        files: &BTreeMap<String, String>,
        message: &str,
        branch: &str,
    ) -> Result<String> {
        let head: RefPayload = self
            .get_json(&format!("/repos/{}/git/ref/heads/{}", repo, branch))
            .await
            .with_context(|| format!("Failed to resolve branch {}", branch))?;
        let parent_sha = head.object.sha;
        let parent: CommitPayload = self
            .get_json(&format!("/repos/{}/git/commits/{}", repo, parent_sha))
            .await?;

        let entries = files
            .iter()
            .map(|(path, content)| {
                json!({
                    "path": path,
                    "mode": "100644",
                    "type": "blob",
                    "content": content,
                })
            })
            .collect::<Vec<_>>();
        let tree: ShaPayload = self
            .send_json(
                reqwest::Method::POST,
                &format!("/repos/{}/git/trees", repo),
                &json!({ "base_tree": parent.tree.sha, "tree": entries }),
            )
            .await
            .context("Failed to create tree")?;

        let commit: ShaPayload = self
            .send_json(
                reqwest::Method::POST,
                &format!("/repos/{}/git/commits", repo),
                &json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent_sha],
                }),
            )
            .await
            .context("Failed to create commit")?;

        let _: RefPayload = self
            .send_json(
                reqwest::Method::PATCH,
                &format!("/repos/{}/git/refs/heads/{}", repo, branch),
                &json!({ "sha": commit.sha, "force": false }),
            )
            .await
            .with_context(|| format!("Failed to move {} to the new commit", branch))?;

        Ok(commit.sha)
    }
}
