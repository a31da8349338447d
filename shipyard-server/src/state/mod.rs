//! State manager
//!
//! In-memory history of every version going through the pipeline.
//!
//! Workflows report step results through a [`StateClient`]; notifications
//! are queued to a single [`StateManager`] task, the only writer of the
//! history. The status API reads it through a [`StateStore`] handle.

pub mod retention;
pub mod store;

use async_trait::async_trait;
use shipyard_core::domain::state::{RunnerName, RunnerStatus, Step};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use retention::{KeepAll, RetentionPolicy};
pub use store::StateStore;

/// Notifications waiting to be applied
const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown version {0}")]
    NoVersion(String),

    #[error("no captured output for version {0}")]
    NoLogFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One step result for one version
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub version: String,
    pub runner: RunnerName,
    pub status: RunnerStatus,
    pub step: Step,
}

/// Write side used by the workflows
#[async_trait]
pub trait StateClient: Send + Sync {
    async fn notify_step(&self, version: &str, runner: RunnerName, status: RunnerStatus, step: Step);
}

/// [`StateClient`] feeding a [`StateManager`]
#[derive(Debug, Clone)]
pub struct ChannelStateClient {
    sender: mpsc::Sender<StepEvent>,
}

#[async_trait]
impl StateClient for ChannelStateClient {
    async fn notify_step(&self, version: &str, runner: RunnerName, status: RunnerStatus, step: Step) {
        let event = StepEvent {
            version: version.to_string(),
            runner,
            status,
            step,
        };
        if self.sender.send(event).await.is_err() {
            warn!("State manager stopped, dropping {} step of {}", runner, version);
        }
    }
}

/// Single writer of the version history
pub struct StateManager {
    sender: mpsc::Sender<StepEvent>,
    inbox: mpsc::Receiver<StepEvent>,
    store: StateStore,
    retention: Box<dyn RetentionPolicy>,
}

impl StateManager {
    pub fn new(retention: Box<dyn RetentionPolicy>) -> Self {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        Self {
            sender,
            inbox,
            store: StateStore::new(),
            retention,
        }
    }

    pub fn client(&self) -> ChannelStateClient {
        ChannelStateClient {
            sender: self.sender.clone(),
        }
    }

    pub fn store(&self) -> StateStore {
        self.store.clone()
    }

    /// Applies notifications until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("Starting state manager");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stopping state manager");
                    return Ok(());
                }
                Some(event) = self.inbox.recv() => {
                    debug!(
                        version = %event.version,
                        runner = %event.runner,
                        status = %event.status,
                        "step {}", event.step.name
                    );
                    self.store.apply(event, self.retention.as_ref());
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shipyard_core::domain::env::EnvVars;
    use shipyard_core::domain::exec::ExecSpec;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records notifications for assertions
    #[derive(Default)]
    pub struct MockStateClient {
        pub events: Mutex<Vec<StepEvent>>,
    }

    impl MockStateClient {
        pub fn events(&self) -> Vec<StepEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StateClient for MockStateClient {
        async fn notify_step(&self, version: &str, runner: RunnerName, status: RunnerStatus, step: Step) {
            self.events.lock().unwrap().push(StepEvent {
                version: version.to_string(),
                runner,
                status,
                step,
            });
        }
    }

    /// Polls `check` until it holds or a few seconds elapse
    pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_manager_applies_notifications() {
        let manager = StateManager::new(Box::new(KeepAll));
        let client = manager.client();
        let store = manager.store();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(manager.run(cancel.clone()));

        let step = Step::new(ExecSpec::new("version").with_name("version"), EnvVars::new());
        client
            .notify_step("abcd", RunnerName::Trigger, RunnerStatus::Success, step)
            .await;

        assert!(eventually(|| store.list_versions().versions == vec!["abcd"]).await);
        let details = store.list_version_details("abcd").unwrap();
        assert_eq!(details.workflows[0].status, RunnerStatus::Success);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_after_shutdown_does_not_block() {
        let manager = StateManager::new(Box::new(KeepAll));
        let client = manager.client();
        drop(manager);

        let step = Step::new(ExecSpec::new("true"), EnvVars::new());
        client
            .notify_step("abcd", RunnerName::Deploy, RunnerStatus::Failure, step)
            .await;
    }
}
