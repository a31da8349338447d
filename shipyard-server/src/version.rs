//! Version identifiers
//!
//! The trigger workflow names every build after the revision it was made
//! from. By default this is the abbreviated hash of the last commit that
//! touched the workspace; a custom command can replace it.

use async_trait::async_trait;
use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::exec::ExecSpec;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

use crate::exec::{self, ExecError};

/// Length of the abbreviated commit hash
const SHORT_SHA_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("unexpected version output: {0:?}")]
    WrongVersionOutput(String),

    #[error("git log failed: {0}")]
    Git(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Computes the identifier of the revision in the workspace
#[async_trait]
pub trait VersionCommand: Send + Sync {
    async fn version(&self) -> Result<String, VersionError>;
}

pub struct DefaultVersionCommand {
    git_bin: PathBuf,
    workspace: PathBuf,
    custom: ExecSpec,
}

impl DefaultVersionCommand {
    /// # Arguments
    /// * `git_bin` - git executable used for the default version
    /// * `workspace` - working tree to inspect
    /// * `custom` - replaces the commit hash when it has a command
    pub fn new(git_bin: PathBuf, workspace: PathBuf, custom: ExecSpec) -> Self {
        Self {
            git_bin,
            workspace,
            custom: custom.with_name("version"),
        }
    }

    async fn commit_version(&self) -> Result<String, VersionError> {
        let output = Command::new(&self.git_bin)
            .args(["log", "--format=%H", "-1", "."])
            .current_dir(&self.workspace)
            .output()
            .await?;

        if !output.status.success() {
            return Err(VersionError::Git(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sha = stdout.trim();
        match sha.get(..SHORT_SHA_LEN) {
            Some(short) => Ok(short.to_string()),
            None => Err(VersionError::WrongVersionOutput(sha.to_string())),
        }
    }

    async fn custom_version(&self) -> Result<String, VersionError> {
        let spec = self.custom.clone().with_output("version");
        let version = exec::run(&spec, &self.workspace, &EnvVars::new())
            .await?
            .map(|v| v.value.trim().to_string())
            .unwrap_or_default();

        if version.is_empty() {
            return Err(VersionError::WrongVersionOutput(version));
        }
        Ok(version)
    }
}

#[async_trait]
impl VersionCommand for DefaultVersionCommand {
    async fn version(&self) -> Result<String, VersionError> {
        if self.custom.is_empty() {
            self.commit_version().await
        } else {
            self.custom_version().await
        }
    }
}
