//! Version DTOs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::state::Runner;

/// Response of `GET /v0/versions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionList {
    pub versions: Vec<String>,
}

/// Response of `GET /v0/versions/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub version: String,
    pub workflows: Vec<Runner>,
}

/// Which captured release output to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Err,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Log => "log",
            LogKind::Err => "err",
        }
    }

    /// Position of the file in the release step's captured files
    pub fn file_index(&self) -> usize {
        match self {
            LogKind::Log => 0,
            LogKind::Err => 1,
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "log" => Ok(LogKind::Log),
            "err" => Ok(LogKind::Err),
            other => Err(format!("unknown log kind: {other}")),
        }
    }
}
