use crate::core::git::GitIntegration;
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// A local checkout of the pull request's repository.
#[derive(Debug, Clone)]
pub struct ClonedRepo {
    pub repo_full_name: String,
    pub branch: String,
    root: PathBuf,
}

impl ClonedRepo {
    pub fn new(repo_full_name: impl Into<String>, branch: impl Into<String>, root: PathBuf) -> Self {
        Self {
            repo_full_name: repo_full_name.into(),
            branch: branch.into(),
            root,
        }
    }

    /// Opens a checkout and warns when it is not on the expected branch.
    pub fn open(repo_full_name: &str, branch: &str, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = match GitIntegration::new(root) {
            Ok(git) => {
                match git.get_current_branch() {
                    Ok(current) if current != branch => warn!(
                        "Checkout at {} is on {} but the pull request head is {}",
                        root.display(),
                        current,
                        branch
                    ),
                    Ok(_) => {}
                    Err(err) => warn!("Unable to read current branch: {}", err),
                }
                if let Ok(head) = git.head_commit_id() {
                    info!("Checkout head is {}", head);
                }
                git.workdir().unwrap_or_else(|| root.to_path_buf())
            }
            Err(err) => {
                warn!("{} is not a git checkout: {}", root.display(), err);
                root.to_path_buf()
            }
        };
        info!("Using checkout {} for {}", root.display(), repo_full_name);
        Ok(Self::new(repo_full_name, branch, root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a repository-relative path, rejecting anything that escapes the checkout.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if relative.trim().is_empty() || escapes {
            anyhow::bail!("{} is not a path inside the repository", relative);
        }
        Ok(self.root.join(path))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn get_file_contents(&self, relative: &str) -> Result<String> {
        let path = self.resolve(relative)?;
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", relative))
    }

    /// Repository-relative path with forward slashes.
    pub fn relative_path(&self, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(&self.root).ok()?;
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }
}
