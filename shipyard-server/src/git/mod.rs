//! Git integration
//!
//! - [`GitCommand`]: repository maintenance used by the trigger workflow
//! - [`backend`]: the smart-HTTP protocol handler clients push to

pub mod backend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git binary not found: {0}")]
    NotFound(#[from] which::Error),

    #[error("`git {command}` failed: {output}")]
    Command { command: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Repository operations needed by the pipeline
#[async_trait]
pub trait GitCommand: Send + Sync {
    /// Creates the shared bare repository clients push to
    async fn init_repository(&self) -> Result<(), GitError>;

    /// Clones the bare repository into the workspace
    async fn clone_repository(&self) -> Result<(), GitError>;

    /// Brings the workspace to the tip of `head`
    ///
    /// Switches branch (`fetch --prune` then `checkout`) when the workspace
    /// is on another branch, otherwise pulls.
    async fn sync_workspace(&self, head: &str) -> Result<(), GitError>;

    fn workspace(&self) -> &Path;
}

/// [`GitCommand`] backed by the local `git` binary
#[derive(Debug, Clone)]
pub struct DefaultGitCommand {
    bin: PathBuf,
    repository: PathBuf,
    workspace: PathBuf,
}

impl DefaultGitCommand {
    /// Locates `git` on the `PATH`
    ///
    /// # Arguments
    /// * `repository` - Path of the bare repository
    /// * `workspace` - Working tree the pipeline builds from
    pub fn new(repository: PathBuf, workspace: PathBuf) -> Result<Self, GitError> {
        let bin = which::which("git")?;
        info!("Using git at {}", bin.display());
        Ok(Self::with_binary(bin, repository, workspace))
    }

    pub fn with_binary(bin: PathBuf, repository: PathBuf, workspace: PathBuf) -> Self {
        Self {
            bin,
            repository,
            workspace,
        }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let command = args.join(" ");
        debug!("git {} (in {})", command, dir.display());

        let output = Command::new(&self.bin)
            .args(args)
            .current_dir(dir)
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(GitError::Command {
                command,
                output: combined.trim().to_string(),
            });
        }
        Ok(combined)
    }

    /// Branch currently checked out in the workspace
    async fn current_branch(&self) -> Result<String, GitError> {
        let head = tokio::fs::read_to_string(self.workspace.join(".git").join("HEAD")).await?;
        let head = head.trim();
        Ok(head
            .strip_prefix("ref: refs/heads/")
            .unwrap_or(head)
            .to_string())
    }
}

#[async_trait]
impl GitCommand for DefaultGitCommand {
    async fn init_repository(&self) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.repository).await?;
        self.git(&self.repository, &["init", "--bare", "--shared"])
            .await?;
        info!("Initialized bare repository {}", self.repository.display());
        Ok(())
    }

    async fn clone_repository(&self) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.workspace).await?;
        let repository = self.repository.to_string_lossy();
        let workspace = self.workspace.to_string_lossy();
        self.git(&self.workspace, &["clone", &repository, &workspace])
            .await?;
        info!("Cloned repository into {}", workspace);
        Ok(())
    }

    async fn sync_workspace(&self, head: &str) -> Result<(), GitError> {
        let current = self.current_branch().await?;

        if current != head {
            info!("Switching workspace from {} to {}", current, head);
            self.git(&self.workspace, &["fetch", "--prune"]).await?;
            self.git(&self.workspace, &["checkout", head]).await?;
        } else {
            self.git(&self.workspace, &["pull"]).await?;
        }
        Ok(())
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }
}
