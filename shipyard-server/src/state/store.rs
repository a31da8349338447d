//! Read side of the state manager

use shipyard_core::domain::state::SyntheticWorkflow;
use shipyard_core::dto::version::{LogKind, VersionDetails, VersionList};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::retention::RetentionPolicy;
use super::{StateError, StepEvent};

#[derive(Debug, Default)]
struct Versions {
    /// Creation order
    order: Vec<String>,
    workflows: HashMap<String, SyntheticWorkflow>,
    /// Versions dropped by the retention policy; late steps must not revive them
    evicted: HashSet<String>,
}

/// Shared handle on the per-version history
///
/// Only the state manager task writes through [`StateStore::apply`]; HTTP
/// handlers read concurrently.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<Versions>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All known versions, oldest first
    pub fn list_versions(&self) -> VersionList {
        let versions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        VersionList {
            versions: versions.order.clone(),
        }
    }

    /// Runners of `version` in `trigger`, `deploy`, `release` order
    pub fn list_version_details(&self, version: &str) -> Result<VersionDetails, StateError> {
        let versions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let workflow = versions
            .workflows
            .get(version)
            .ok_or_else(|| StateError::NoVersion(version.to_string()))?;

        Ok(VersionDetails {
            version: workflow.version.clone(),
            workflows: workflow.ordered_runners(),
        })
    }

    /// Content of the captured release output of `version`
    pub async fn log_version(&self, version: &str, kind: LogKind) -> Result<Vec<u8>, StateError> {
        let path = {
            let versions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let workflow = versions
                .workflows
                .get(version)
                .ok_or_else(|| StateError::NoVersion(version.to_string()))?;
            workflow
                .release_file(kind.file_index())
                .cloned()
                .ok_or_else(|| StateError::NoLogFile(version.to_string()))?
        };

        Ok(tokio::fs::read(path).await?)
    }

    pub(super) fn apply(&self, event: StepEvent, retention: &dyn RetentionPolicy) {
        let mut versions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Versions {
            order,
            workflows,
            evicted,
        } = &mut *versions;

        if evicted.contains(&event.version) {
            debug!(version = %event.version, runner = %event.runner, "Dropping step of evicted version");
            return;
        }

        let workflow = workflows.entry(event.version.clone()).or_insert_with(|| {
            order.push(event.version.clone());
            SyntheticWorkflow::new(event.version.clone())
        });
        workflow.record(event.runner, event.status, event.step);

        let expired = retention.expired(order);
        for version in order.drain(..expired) {
            workflows.remove(&version);
            evicted.insert(version);
        }
    }
}
