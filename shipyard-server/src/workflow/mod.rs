//! Workflow orchestrator
//!
//! Three long-running tasks connected by channels:
//!
//! ```text
//! webhook / api ──triggered──▶ trigger ──triggered──▶ deploy ──deployed──▶ release
//!                                 ▲                      │
//!                                 └───────deployed───────┘
//! ```
//!
//! Every channel holds a single event, so a sender waits until the
//! receiving workflow is ready for more work.

pub mod deploy;
pub mod pipeline;
pub mod release;
pub mod trigger;

use anyhow::Context;
use shipyard_core::domain::event::Event;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{DeployConfig, ReleaseConfig};
use crate::git::GitCommand;
use crate::notifier::Notifier;
use crate::state::StateClient;
use crate::upstream::Upstream;
use crate::version::VersionCommand;

pub use deploy::DeployWorkflow;
pub use release::ReleaseWorkflow;
pub use trigger::TriggerWorkflow;

/// Capacity of every pipeline channel
pub const CHANNEL_CAPACITY: usize = 1;

/// Sends `event`, giving up when `cancel` fires first
///
/// Returns `false` when the event was not delivered.
pub(crate) async fn forward(to: &mpsc::Sender<Event>, event: Event, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = to.send(event) => sent.is_ok(),
    }
}

/// Everything the workflows need
pub struct Orchestrator {
    pub head: String,
    pub deploy: DeployConfig,
    pub release: ReleaseConfig,
    /// Directory holding artifacts and release output
    pub execs: PathBuf,
    pub git: Arc<dyn GitCommand>,
    pub version: Arc<dyn VersionCommand>,
    pub state: Arc<dyn StateClient>,
    pub upstream: Arc<dyn Upstream>,
    pub notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    /// Clones the repository and runs the workflows until `cancel` fires
    ///
    /// # Arguments
    /// * `inbox` - Receiving end of the trigger channel
    /// * `trigger` - Sending end of the same channel, used by deploy to report back
    pub async fn run(
        self,
        inbox: mpsc::Receiver<Event>,
        trigger: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        self.git
            .clone_repository()
            .await
            .context("Cannot clone repository into the workspace")?;

        let (deploy_tx, deploy_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (release_tx, release_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let release = ReleaseWorkflow::new(
            &self.release,
            self.execs.clone(),
            self.upstream,
            self.notifier,
            self.state.clone(),
        )
        .context("Cannot start release workflow")?;
        let deploy = DeployWorkflow::new(
            self.deploy,
            self.git.workspace().to_path_buf(),
            self.execs,
            self.state.clone(),
        );
        let trigger_workflow = TriggerWorkflow::new(self.head, self.git, self.version, self.state);

        let mut tasks = JoinSet::new();
        tasks.spawn(trigger_workflow.run(inbox, deploy_tx, cancel.clone()));
        tasks.spawn(deploy.run(deploy_rx, release_tx, trigger, cancel.clone()));
        tasks.spawn(release.run(release_rx, cancel.clone()));
        info!("Workflows started");

        supervise(tasks, &cancel).await
    }
}

/// Waits for every task; the first failure cancels the others and is returned
pub(crate) async fn supervise(
    mut tasks: JoinSet<anyhow::Result<()>>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut outcome = Ok(());
    while let Some(result) = tasks.join_next().await {
        let failure = match result {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => anyhow::Error::new(e).context("Task panicked"),
        };
        error!("Task stopped: {:#}", failure);
        cancel.cancel();
        if outcome.is_ok() {
            outcome = Err(failure);
        }
    }
    outcome
}
