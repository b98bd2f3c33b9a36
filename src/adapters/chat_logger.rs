use crate::config::BillingConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Who a comment run is billed to.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub repo_name: String,
    pub title: String,
    pub issue_url: String,
    pub repo_full_name: String,
    pub repo_description: String,
    pub comment: String,
    pub pr_path: Option<String>,
    pub pr_line_position: Option<usize>,
    pub username: String,
    pub installation_id: u64,
    pub pr_number: u64,
}

#[async_trait]
pub trait ChatLogger: Send + Sync {
    async fn is_paying_user(&self, session: &ChatSession) -> Result<bool>;
    async fn use_faster_model(&self, session: &ChatSession) -> Result<bool>;
}

/// Tier decisions from the static lists in the `billing` config section.
pub struct ConfigChatLogger {
    config: BillingConfig,
}

impl ConfigChatLogger {
    pub fn new(config: BillingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChatLogger for ConfigChatLogger {
    async fn is_paying_user(&self, session: &ChatSession) -> Result<bool> {
        Ok(self
            .config
            .paying_users
            .iter()
            .any(|user| user.eq_ignore_ascii_case(&session.username)))
    }

    async fn use_faster_model(&self, session: &ChatSession) -> Result<bool> {
        if self.is_paying_user(session).await? {
            return Ok(false);
        }
        Ok(self
            .config
            .faster_model_users
            .iter()
            .any(|user| user.eq_ignore_ascii_case(&session.username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(username: &str) -> ChatSession {
        ChatSession {
            repo_name: "widgets".to_string(),
            title: "(Comment) Add widgets".to_string(),
            issue_url: "https://github.com/acme/widgets/pull/1".to_string(),
            repo_full_name: "acme/widgets".to_string(),
            repo_description: String::new(),
            comment: "fix".to_string(),
            pr_path: None,
            pr_line_position: None,
            username: username.to_string(),
            installation_id: 1,
            pr_number: 1,
        }
    }

    #[tokio::test]
    async fn test_tiers_from_config() {
        let logger = ConfigChatLogger::new(BillingConfig {
            paying_users: vec!["Alice".to_string(), "dave".to_string()],
            faster_model_users: vec!["carol".to_string(), "dave".to_string()],
        });

        assert!(logger.is_paying_user(&session("alice")).await.unwrap());
        assert!(!logger.use_faster_model(&session("alice")).await.unwrap());
        assert!(!logger.is_paying_user(&session("carol")).await.unwrap());
        assert!(logger.use_faster_model(&session("carol")).await.unwrap());
        assert!(!logger.use_faster_model(&session("dave")).await.unwrap());
        assert!(!logger.use_faster_model(&session("bob")).await.unwrap());
    }
}
