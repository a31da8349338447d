//! Trigger workflow
//!
//! Turns pushes into builds. At most one build is in flight; pushes
//! arriving meanwhile collapse into a single follow-up build started as
//! soon as the deploy workflow reports back.

use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::event::{Event, EventKind};
use shipyard_core::domain::exec::ExecSpec;
use shipyard_core::domain::state::{RunnerName, RunnerStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::forward;
use super::pipeline::StepRunner;
use crate::git::GitCommand;
use crate::state::StateClient;
use crate::version::VersionCommand;

pub struct TriggerWorkflow {
    head: String,
    git: Arc<dyn GitCommand>,
    version: Arc<dyn VersionCommand>,
    state: Arc<dyn StateClient>,
    /// No sync attempted yet; its failure is expected before the first push
    first_sync: bool,
    deploying: bool,
    /// A push arrived while deploying
    pending: bool,
}

impl TriggerWorkflow {
    pub fn new(
        head: impl Into<String>,
        git: Arc<dyn GitCommand>,
        version: Arc<dyn VersionCommand>,
        state: Arc<dyn StateClient>,
    ) -> Self {
        Self {
            head: head.into(),
            git,
            version,
            state,
            first_sync: true,
            deploying: false,
            pending: false,
        }
    }

    /// Handles events until `cancel` fires or every sender is gone
    ///
    /// # Arguments
    /// * `inbox` - Pushes, manual starts and `deployed` acknowledgements
    /// * `deploy` - Input of the deploy workflow
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Event>,
        deploy: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("Starting trigger workflow on {}", self.head);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event.kind {
                EventKind::Triggered if self.deploying => {
                    debug!("Build in progress, trigger coalesced");
                    self.pending = true;
                }
                EventKind::Triggered => self.trigger(&deploy, &cancel).await,
                EventKind::Deployed => {
                    self.deploying = false;
                    if std::mem::take(&mut self.pending) {
                        self.trigger(&deploy, &cancel).await;
                    }
                }
            }
        }

        info!("Stopping trigger workflow");
        Ok(())
    }

    /// Syncs the workspace, computes the version and starts a build
    async fn trigger(&mut self, deploy: &mpsc::Sender<Event>, cancel: &CancellationToken) {
        let first_sync = std::mem::replace(&mut self.first_sync, false);

        if let Err(e) = self.git.sync_workspace(&self.head).await {
            if first_sync {
                info!("Cannot sync on first capture, not deploying");
            } else {
                error!("Cannot sync workspace: {}", e);
            }
            return;
        }

        let version = match self.version.version().await {
            Ok(version) => version,
            Err(e) => {
                error!("Cannot compute version: {}", e);
                return;
            }
        };

        StepRunner::new(
            version.as_str(),
            RunnerName::Trigger,
            self.git.workspace(),
            self.state.clone(),
        )
        .record(
            ExecSpec::new("version").with_name("version"),
            &EnvVars::new(),
            RunnerStatus::Success,
        )
        .await;

        info!(version = %version, "Version computed, deploying");
        let mut envs = EnvVars::new();
        envs.push("version", version);
        self.deploying = forward(deploy, Event::triggered(envs), cancel).await;
    }
}
