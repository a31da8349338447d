//! Action DTOs

use serde::{Deserialize, Serialize};

/// Command accepted by the manual action endpoint
pub const START_COMMAND: &str = "start";

/// Body of `POST /v0/actions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub command: String,
}

impl ActionRequest {
    pub fn start() -> Self {
        Self {
            command: START_COMMAND.to_string(),
        }
    }

    pub fn is_start(&self) -> bool {
        self.command == START_COMMAND
    }
}
