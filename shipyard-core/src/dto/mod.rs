//! Data Transfer Objects for the status API
//!
//! Payloads exchanged between the orchestrator's admin listener and its
//! clients (the `shipyard` CLI, scripts, dashboards).

pub mod action;
pub mod version;

use serde::{Deserialize, Serialize};

/// Generic `{"message": ...}` body used for acknowledgements and errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
