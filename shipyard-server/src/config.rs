//! Orchestrator configuration
//!
//! Configuration is an explicit value handed to every component at
//! construction time. It is assembled in three layers:
//!
//! 1. built-in defaults (a Go project: `go test`, `go build`, run the binary)
//! 2. an optional JSON file named by `SHIPYARD_CONFIG`
//! 3. scalar `SHIPYARD_*` environment overrides
//!
//! and checked with [`Config::validate`] before anything starts.

use serde::Deserialize;
use shipyard_core::domain::exec::ExecSpec;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::port;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub main: MainConfig,
    pub trigger: TriggerConfig,
    pub deploy: DeployConfig,
    pub release: ReleaseConfig,
    pub notifier: NotifierConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// Name of the repository clients push to (`/<repository>/...`)
    pub repository: String,
    /// Branch that gets built
    pub head: String,
    /// Colorize log output
    pub color: bool,
    pub api: ApiConfig,
    pub proxy: ProxyConfig,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            repository: "myrepo".to_string(),
            head: "main".to_string(),
            color: false,
            api: ApiConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// Admin listener: git endpoints and status API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ApiConfig {
    /// Basic credentials, only when both parts are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Public listener forwarding to the live release
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub addr: String,
    /// Allowed CORS origins; no CORS layer when empty
    pub origins: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8081".to_string(),
            origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Custom version command; the short commit SHA is used when empty
    pub version: ExecSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub artifact: ArtifactConfig,
    pub install: ExecSpec,
    pub test: ExecSpec,
    pub pre_build: ExecSpec,
    pub build: ExecSpec,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            artifact: ArtifactConfig::default(),
            install: ExecSpec::default(),
            test: ExecSpec::new("go").with_args(["test", "-v", "./..."]),
            pre_build: ExecSpec::default(),
            build: ExecSpec::new("go").with_args(["build", "-o", "${artifact}", "."]),
        }
    }
}

/// Where the deploy pipeline puts the built executable
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// File name template, e.g. `go-${version}`
    pub filename: String,
    /// Directory template, relative to the `execs` directory
    pub directory: String,
    pub extension: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            filename: "go-${version}".to_string(),
            directory: String::new(),
            extension: if cfg!(windows) { ".exe" } else { "" }.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub port_range: PortRange,
    pub run: ExecSpec,
    /// Seconds a new process has to accept connections
    pub health_timeout: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange {
                min: 8090,
                max: 8100,
            },
            run: ExecSpec::new("${artifact}")
                .with_env("ADDR", "localhost:${port}")
                .with_env("PORT", ":${port}"),
            health_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub slack: SlackConfig,
}

/// Slack settings; both values may reference OS variables (`${SLACK_TOKEN}`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: "${SLACK_TOKEN}".to_string(),
            channel: "general".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Number of versions kept in memory; unbounded when unset
    pub keep_versions: Option<usize>,
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// Recognized variables:
    /// - SHIPYARD_CONFIG (optional JSON file)
    /// - SHIPYARD_REPOSITORY, SHIPYARD_HEAD, SHIPYARD_COLOR
    /// - SHIPYARD_API_ADDR, SHIPYARD_API_USERNAME, SHIPYARD_API_PASSWORD
    /// - SHIPYARD_PROXY_ADDR, SHIPYARD_PROXY_ORIGINS (comma separated)
    /// - SHIPYARD_PORT_MIN, SHIPYARD_PORT_MAX, SHIPYARD_HEALTH_TIMEOUT
    /// - SHIPYARD_KEEP_VERSIONS
    /// - SHIPYARD_SLACK_TOKEN, SHIPYARD_SLACK_CHANNEL
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SHIPYARD_CONFIG") {
            Some(path) if !path.is_empty() => Self::from_file(PathBuf::from(path))?,
            _ => Self::default(),
        };

        if let Some(v) = lookup("SHIPYARD_REPOSITORY") {
            config.main.repository = v;
        }
        if let Some(v) = lookup("SHIPYARD_HEAD") {
            config.main.head = v;
        }
        if let Some(v) = lookup("SHIPYARD_COLOR") {
            config.main.color = parse_bool("SHIPYARD_COLOR", &v)?;
        }
        if let Some(v) = lookup("SHIPYARD_API_ADDR") {
            config.main.api.addr = v;
        }
        if let Some(v) = lookup("SHIPYARD_API_USERNAME") {
            config.main.api.username = Some(v);
        }
        if let Some(v) = lookup("SHIPYARD_API_PASSWORD") {
            config.main.api.password = Some(v);
        }
        if let Some(v) = lookup("SHIPYARD_PROXY_ADDR") {
            config.main.proxy.addr = v;
        }
        if let Some(v) = lookup("SHIPYARD_PROXY_ORIGINS") {
            config.main.proxy.origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("SHIPYARD_PORT_MIN") {
            config.release.port_range.min = parse("SHIPYARD_PORT_MIN", &v)?;
        }
        if let Some(v) = lookup("SHIPYARD_PORT_MAX") {
            config.release.port_range.max = parse("SHIPYARD_PORT_MAX", &v)?;
        }
        if let Some(v) = lookup("SHIPYARD_HEALTH_TIMEOUT") {
            config.release.health_timeout = parse("SHIPYARD_HEALTH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SHIPYARD_KEEP_VERSIONS") {
            config.state.keep_versions = Some(parse("SHIPYARD_KEEP_VERSIONS", &v)?);
        }
        if let Some(v) = lookup("SHIPYARD_SLACK_TOKEN") {
            config.notifier.slack.token = v;
        }
        if let Some(v) = lookup("SHIPYARD_SLACK_CHANNEL") {
            config.notifier.slack.channel = v;
        }

        Ok(config)
    }

    /// Reads a JSON file; missing fields keep their defaults
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.repository.trim().is_empty() {
            return Err(ConfigError::Invalid("repository cannot be empty".into()));
        }

        if self.main.repository.contains('/') {
            return Err(ConfigError::Invalid(
                "repository must be a single path segment".into(),
            ));
        }

        // The status API owns this prefix on the admin listener
        if self.main.repository == "v0" {
            return Err(ConfigError::Invalid(
                "repository cannot be named v0".into(),
            ));
        }

        if self.main.head.trim().is_empty() {
            return Err(ConfigError::Invalid("head cannot be empty".into()));
        }

        let range = self.release.port_range;
        port::check_range(range.min, range.max)
            .map_err(|e| ConfigError::Invalid(format!("port_range: {e}")))?;

        if self.release.run.is_empty() {
            return Err(ConfigError::Invalid("release run command cannot be empty".into()));
        }

        if self.release.health_timeout == 0 {
            return Err(ConfigError::Invalid(
                "health_timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
