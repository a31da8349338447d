//! Pipeline events
//!
//! The single message type exchanged on every pipeline channel
//! (webhook → trigger → deploy → release, and back to trigger).

use super::env::EnvVars;
use serde::{Deserialize, Serialize};

/// What happened upstream of the receiving workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A push (or manual action) asks for a new build
    Triggered,
    /// The deploy pipeline finished, with or without success
    Deployed,
}

/// Message flowing between workflows
///
/// Consumed exactly once by the receiver; `envs` carries the variables
/// accumulated so far (`version`, `artifact`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub envs: EnvVars,
}

impl Event {
    pub fn new(kind: EventKind, envs: EnvVars) -> Self {
        Self { kind, envs }
    }

    pub fn triggered(envs: EnvVars) -> Self {
        Self::new(EventKind::Triggered, envs)
    }

    pub fn deployed(envs: EnvVars) -> Self {
        Self::new(EventKind::Deployed, envs)
    }
}
