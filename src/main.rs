mod adapters;
mod config;
mod core;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::chat_logger::{ChatLogger, ConfigChatLogger};
use crate::adapters::executor::LlmEditExecutor;
use crate::adapters::github::GithubRestClient;
use crate::adapters::llm::LLMAdapter;
use crate::adapters::planner::LlmPlanner;
use crate::adapters::retrieval::LexicalRetriever;
use crate::adapters::telemetry::{NoopSink, PosthogSink, TelemetrySink};
use crate::core::entities::CommentEvent;
use crate::core::handler::{Collaborators, CommentHandler};

#[derive(Parser)]
#[command(name = "commentfix")]
#[command(about = "Resolves pull request comments by planning, applying and committing code edits", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true, help = "Environment tag reported with telemetry")]
    environment: Option<String>,

    #[arg(long, global = true, help = "Path to a config file (defaults to .commentfix.yml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve one pull request comment and commit the result")]
    Resolve {
        #[arg(long, help = "Path to the comment event JSON (reads from stdin if not provided)")]
        event: Option<PathBuf>,

        #[arg(long, default_value = ".", help = "Local checkout of the pull request branch")]
        repo_path: PathBuf,

        #[arg(
            short,
            long,
            help = "Output file path (prints to stdout if not provided)"
        )]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => config::Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::Config::load().unwrap_or_default(),
    };
    config.merge_with_cli(cli.model.clone(), cli.environment.clone());
    if let Some(temp) = cli.temperature {
        config.temperature = temp;
    }
    if let Some(tokens) = cli.max_tokens {
        config.max_tokens = tokens;
    }

    match cli.command {
        Commands::Resolve {
            event,
            repo_path,
            output,
        } => {
            resolve_command(config, event, repo_path, output).await?;
        }
    }

    Ok(())
}

async fn read_event(path: Option<PathBuf>) -> Result<CommentEvent> {
    let raw = if let Some(path) = path {
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else if std::io::stdin().is_terminal() {
        anyhow::bail!("No comment event provided. Pass --event or pipe the JSON on stdin.");
    } else {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    };
    serde_json::from_str(&raw).context("Failed to parse comment event")
}

fn build_handler(config: &config::Config, repo_path: PathBuf) -> Result<CommentHandler> {
    let token = config
        .github_token()
        .context("GitHub token not found. Set GITHUB_TOKEN or github_token in the config")?;
    let github = Arc::new(GithubRestClient::new(config.github_api_base.clone(), &token)?);

    let adapter: Arc<dyn LLMAdapter> =
        Arc::from(adapters::llm::create_adapter(&config.model_config())?);

    let telemetry: Arc<dyn TelemetrySink> = match &config.posthog_api_key {
        Some(api_key) => Arc::new(PosthogSink::new(api_key.clone(), config.posthog_host.clone())?),
        None => Arc::new(NoopSink),
    };

    let billing = &config.billing;
    let chat_logger: Option<Arc<dyn ChatLogger>> =
        if billing.paying_users.is_empty() && billing.faster_model_users.is_empty() {
            None
        } else {
            Some(Arc::new(ConfigChatLogger::new(billing.clone())))
        };

    Ok(CommentHandler::new(
        config.handler_config(),
        repo_path,
        Collaborators {
            github: github.clone(),
            committer: github,
            chat_logger,
            retriever: Arc::new(LexicalRetriever::new(config.retrieval.clone())?),
            planner: Arc::new(LlmPlanner::new(adapter.clone())),
            executor: Arc::new(LlmEditExecutor::new(adapter)),
            telemetry,
        },
    ))
}

async fn resolve_command(
    config: config::Config,
    event_path: Option<PathBuf>,
    repo_path: PathBuf,
    output_path: Option<PathBuf>,
) -> Result<()> {
    let event = read_event(event_path).await?;
    info!(
        "Resolving comment on {}#{} by {}",
        event.repo_full_name, event.pr_number, event.username
    );

    let handler = build_handler(&config, repo_path)?;
    let outcome = handler.handle(&event).await?;
    let rendered = serde_json::to_string_pretty(&outcome)?;

    if let Some(path) = output_path {
        tokio::fs::write(path, rendered).await?;
    } else {
        println!("{}", rendered);
    }

    // Lets the spawned success event flush before the runtime shuts down.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
