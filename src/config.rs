use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    pub api_key: Option<String>,
    pub base_url: Option<String>,

    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    pub github_token: Option<String>,

    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    pub bot_suffix: Option<String>,

    #[serde(default = "default_environment")]
    pub environment: String,

    pub posthog_api_key: Option<String>,
    #[serde(default = "default_posthog_host")]
    pub posthog_host: String,

    #[serde(default)]
    pub handler: HandlerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub billing: BillingConfig,
}

/// Knobs for a single comment-handling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default = "default_num_snippets")]
    pub num_snippets_to_query: usize,

    #[serde(default = "default_window_lines")]
    pub comment_window_lines: usize,

    #[serde(default = "default_commit_message_max_len")]
    pub commit_message_max_len: usize,

    #[serde(default = "default_bot_prefix")]
    pub bot_username_prefix: String,

    // Filled from the top-level settings by `Config::handler_config`.
    #[serde(skip, default = "default_bot_username")]
    pub bot_username: String,

    #[serde(skip)]
    pub bot_suffix: String,

    #[serde(skip, default = "default_model")]
    pub model: String,

    #[serde(skip, default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_exclude_exts")]
    pub exclude_exts: Vec<String>,

    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BillingConfig {
    #[serde(default)]
    pub paying_users: Vec<String>,

    #[serde(default)]
    pub faster_model_users: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            base_url: None,
            github_api_base: default_github_api_base(),
            github_token: None,
            bot_username: default_bot_username(),
            bot_suffix: None,
            environment: default_environment(),
            posthog_api_key: None,
            posthog_host: default_posthog_host(),
            handler: HandlerConfig::default(),
            retrieval: RetrievalConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            num_snippets_to_query: default_num_snippets(),
            comment_window_lines: default_window_lines(),
            commit_message_max_len: default_commit_message_max_len(),
            bot_username: default_bot_username(),
            bot_username_prefix: default_bot_prefix(),
            bot_suffix: crate::core::str_utils::DEFAULT_BOT_SUFFIX.to_string(),
            model: default_model(),
            environment: default_environment(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            exclude_exts: default_exclude_exts(),
            exclude_dirs: default_exclude_dirs(),
            exclude_patterns: Vec::new(),
            chunk_lines: default_chunk_lines(),
            max_results: default_max_results(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        for candidate in [".commentfix.yml", ".commentfix.yaml"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".commentfix.yml");
            if home_config.exists() {
                return Self::load_from(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn merge_with_cli(&mut self, cli_model: Option<String>, cli_environment: Option<String>) {
        if let Some(model) = cli_model {
            self.model = model;
        }
        if let Some(environment) = cli_environment {
            self.environment = environment;
        }
    }

    pub fn github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    /// Copies the top-level identity settings into the handler section.
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            bot_username: self.bot_username.clone(),
            bot_suffix: crate::core::str_utils::resolve_bot_suffix(self.bot_suffix.as_deref()),
            model: self.model.clone(),
            environment: self.environment.clone(),
            ..self.handler.clone()
        }
    }

    pub fn model_config(&self) -> crate::adapters::llm::ModelConfig {
        crate::adapters::llm::ModelConfig {
            model_name: self.model.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> usize {
    4000
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_bot_username() -> String {
    "sweep-ai[bot]".to_string()
}

fn default_bot_prefix() -> String {
    "sweep".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_posthog_host() -> String {
    "https://app.posthog.com".to_string()
}

fn default_num_snippets() -> usize {
    30
}

fn default_window_lines() -> usize {
    10
}

fn default_commit_message_max_len() -> usize {
    50
}

fn default_exclude_exts() -> Vec<String> {
    [
        ".min.js", ".min.css", ".lock", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".pdf",
        ".zip", ".gz", ".tar", ".woff", ".woff2", ".ttf", ".mp4", ".mp3", ".pyc", ".so", ".dll",
        ".exe", ".bin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    [".git", "node_modules", "target", "dist", "build", "venv", ".venv", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_chunk_lines() -> usize {
    40
}

fn default_max_results() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_handler_constants() {
        let config = Config::default();
        assert_eq!(config.handler.num_snippets_to_query, 30);
        assert_eq!(config.handler.comment_window_lines, 10);
        assert_eq!(config.handler.commit_message_max_len, 50);
        assert_eq!(config.github_api_base, "https://api.github.com");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
model: claude-3-5-sonnet
bot_username: fixer[bot]
bot_suffix: "\\n\\n_fixed by a bot_"
handler:
  num_snippets_to_query: 12
billing:
  faster_model_users: [carol]
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.handler.num_snippets_to_query, 12);
        assert_eq!(config.handler.comment_window_lines, 10);
        assert_eq!(config.billing.faster_model_users, vec!["carol".to_string()]);
        assert_eq!(config.retrieval.chunk_lines, 40);

        config.merge_with_cli(None, Some("production".to_string()));
        let handler = config.handler_config();
        assert_eq!(handler.bot_username, "fixer[bot]");
        assert_eq!(handler.model, "claude-3-5-sonnet");
        assert_eq!(handler.environment, "production");
        assert_eq!(handler.bot_suffix, "\n\n_fixed by a bot_");
        assert_eq!(handler.num_snippets_to_query, 12);
    }

    #[test]
    fn test_handler_section_ignores_identity_keys() {
        let yaml = r#"
bot_username: fixer[bot]
handler:
  bot_username: someone-else[bot]
  model: gpt-3.5-turbo
  bot_username_prefix: fixer
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.handler.bot_username, default_bot_username());
        let handler = config.handler_config();
        assert_eq!(handler.bot_username, "fixer[bot]");
        assert_eq!(handler.model, default_model());
        assert_eq!(handler.bot_username_prefix, "fixer");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commentfix.yml");
        std::fs::write(&path, "environment: staging\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.model, "gpt-4o");
    }
}
