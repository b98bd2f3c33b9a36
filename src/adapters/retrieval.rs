use crate::adapters::repo::ClonedRepo;
use crate::config::RetrievalConfig;
use crate::core::entities::Snippet;
use anyhow::Result;
use async_trait::async_trait;
use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const MIN_FILE_BYTES: u64 = 10;
const MAX_FILE_BYTES: u64 = 240_000;

static QUERY_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{2,}").unwrap());

/// Snippets selected for a query.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub current_top_snippets: Vec<Snippet>,
    pub read_only_snippets: Vec<Snippet>,
}

#[async_trait]
pub trait SnippetRetriever: Send + Sync {
    async fn retrieve(&self, repo: &ClonedRepo, query: &str) -> Result<RetrievedContext>;
}

/// Ranks fixed-size line windows of every eligible file by query-term overlap.
pub struct LexicalRetriever {
    config: RetrievalConfig,
    exclude_patterns: Vec<glob::Pattern>,
}

impl LexicalRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            exclude_patterns,
        })
    }

    fn should_index(&self, relative: &str, path: &Path) -> bool {
        if self
            .config
            .exclude_exts
            .iter()
            .any(|ext| relative.ends_with(ext.as_str()))
        {
            return false;
        }
        if relative
            .split('/')
            .any(|part| self.config.exclude_dirs.iter().any(|dir| dir == part))
        {
            return false;
        }
        if self.exclude_patterns.iter().any(|p| p.matches(relative)) {
            return false;
        }
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_file() && (MIN_FILE_BYTES..=MAX_FILE_BYTES).contains(&meta.len()),
            Err(_) => false,
        }
    }

    fn chunk_file(&self, relative: &str, content: &str) -> Vec<Snippet> {
        let lines: Vec<&str> = content.lines().collect();
        let chunk_lines = self.config.chunk_lines.max(1);
        lines
            .chunks(chunk_lines)
            .enumerate()
            .map(|(i, chunk)| Snippet {
                file_path: relative.to_string(),
                start: i * chunk_lines,
                end: i * chunk_lines + chunk.len(),
                content: chunk.join("\n"),
            })
            .collect()
    }

    fn collect_files(&self, repo: &ClonedRepo) -> Vec<(String, String)> {
        let mut files = Vec::new();
        for entry in WalkBuilder::new(repo.root()).hidden(false).build().flatten() {
            let path = entry.path();
            let Some(relative) = repo.relative_path(path) else {
                continue;
            };
            if relative.is_empty() || !self.should_index(&relative, path) {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => files.push((relative, content)),
                Err(err) => debug!("Skipping unreadable file {}: {}", relative, err),
            }
        }
        files.sort();
        files
    }
}

fn query_terms(query: &str) -> HashSet<String> {
    QUERY_TERM
        .find_iter(query)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn score(terms: &HashSet<String>, snippet: &Snippet) -> usize {
    let haystack = format!("{}\n{}", snippet.file_path, snippet.content).to_lowercase();
    terms
        .iter()
        .map(|term| haystack.matches(term.as_str()).count())
        .sum()
}

#[async_trait]
impl SnippetRetriever for LexicalRetriever {
    async fn retrieve(&self, repo: &ClonedRepo, query: &str) -> Result<RetrievedContext> {
        let terms = query_terms(query);
        let files = self.collect_files(repo);
        info!("Indexed {} files for retrieval", files.len());

        let mut read_only_snippets = Vec::new();
        let mut scored = Vec::new();
        for (relative, content) in &files {
            if query.contains(relative.as_str()) {
                read_only_snippets.push(Snippet::from_file(relative.clone(), content.clone()));
            }
            for snippet in self.chunk_file(relative, content) {
                let snippet_score = score(&terms, &snippet);
                if snippet_score > 0 {
                    scored.push((snippet_score, snippet));
                }
            }
        }

        // Stable sort keeps path order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let current_top_snippets: Vec<Snippet> = scored
            .into_iter()
            .take(self.config.max_results)
            .map(|(_, snippet)| snippet)
            .collect();
        for snippet in &current_top_snippets {
            debug!("Retrieved {}", snippet.denotation());
        }

        Ok(RetrievedContext {
            current_top_snippets,
            read_only_snippets,
        })
    }
}
