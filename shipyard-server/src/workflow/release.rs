//! Release workflow
//!
//! Starts every successfully built version on a leased port, waits for it
//! to accept connections, then points the proxy at it and stops the
//! previous release.

use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::event::{Event, EventKind};
use shipyard_core::domain::exec::ExecSpec;
use shipyard_core::domain::state::{RunnerName, RunnerStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pipeline::StepRunner;
use crate::config::ReleaseConfig;
use crate::exec::ExecError;
use crate::notifier::Notifier;
use crate::port::{PortError, PortPool};
use crate::state::StateClient;
use crate::upstream::Upstream;

const HEALTH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("nothing accepted connections on port {0} in time")]
    ConnectionFailed(u16),

    #[error("release interrupted by shutdown")]
    Cancelled,

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub struct ReleaseWorkflow {
    run: ExecSpec,
    execs: PathBuf,
    ports: PortPool,
    /// Running releases by leased port
    processes: BTreeMap<u16, Child>,
    upstream: Arc<dyn Upstream>,
    notifier: Arc<dyn Notifier>,
    state: Arc<dyn StateClient>,
    health_timeout: Duration,
}

impl ReleaseWorkflow {
    /// # Arguments
    /// * `config` - Port range, run command and health-check timeout
    /// * `execs` - Working directory of released processes, also holds their output
    /// * `upstream` - Registry switched at cutover
    /// * `notifier` - Told about every release attempt
    /// * `state` - Where step results are reported
    pub fn new(
        config: &ReleaseConfig,
        execs: PathBuf,
        upstream: Arc<dyn Upstream>,
        notifier: Arc<dyn Notifier>,
        state: Arc<dyn StateClient>,
    ) -> Result<Self, ReleaseError> {
        let ports = PortPool::new(config.port_range.min, config.port_range.max)?;
        Ok(Self {
            run: config.run.clone().with_name("run"),
            execs,
            ports,
            processes: BTreeMap::new(),
            upstream,
            notifier,
            state,
            health_timeout: Duration::from_secs(config.health_timeout),
        })
    }

    /// Releases every deployed version until `cancel` fires, then stops
    /// every process it started
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Event>, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("Starting release workflow");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if event.kind != EventKind::Deployed {
                debug!("Ignoring {:?} event", event.kind);
                continue;
            }
            self.release(event.envs, &cancel).await;
        }

        info!("Stopping release workflow");
        self.kill_all().await;
        Ok(())
    }

    async fn release(&mut self, mut envs: EnvVars, cancel: &CancellationToken) {
        let port = match self.ports.get_port() {
            Ok(port) => port,
            Err(e) => {
                error!("Cannot reserve a port: {}", e);
                return;
            }
        };

        // Each release works on its own copy of the command template
        let command = self.run.clone();
        if command.is_empty() {
            warn!("No run command configured, skipping release");
            self.ports.release_port(port);
            return;
        }

        envs.push("port", port.to_string());
        let version = envs.get("version").unwrap_or_default().to_string();
        let label = envs
            .replace(&command.command)
            .unwrap_or_else(|_| command.command.clone());
        info!(version = %version, "Releasing on port {}", port);

        let message = match self.switch_processes(port, &command, &envs, &version, cancel).await {
            Ok(()) => {
                info!(version = %version, "Release succeeded, serving from port {}", port);
                format!("{label} has started on {port}")
            }
            Err(e) => {
                error!(version = %version, "Release failed: {}", e);
                format!("{label} has failed to start, error: {e}")
            }
        };

        if let Err(e) = self.notifier.send_message(&message).await {
            warn!("Cannot send release notification: {}", e);
        }
    }

    /// Starts the candidate and, once healthy, makes it the only release
    async fn switch_processes(
        &mut self,
        port: u16,
        command: &ExecSpec,
        envs: &EnvVars,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReleaseError> {
        let runner = StepRunner::new(version, RunnerName::Release, self.execs.clone(), self.state.clone());

        let child = match runner.start(command, envs, &self.execs).await {
            Ok(child) => child,
            Err(e) => {
                self.ports.release_port(port);
                return Err(e.into());
            }
        };
        self.processes.insert(port, child);

        let started = Instant::now();
        let health = check_connect("localhost", port, self.health_timeout, cancel).await;
        let status = match health {
            Ok(()) => RunnerStatus::Success,
            Err(_) => RunnerStatus::Failure,
        };
        runner
            .record_timed(
                ExecSpec::new(format!("localhost:{port}")).with_name("healthcheck"),
                envs,
                status,
                started.elapsed(),
            )
            .await;

        if let Err(e) = health {
            self.retire(port).await;
            return Err(e);
        }

        self.upstream.set_default(format!("localhost:{port}"));

        let previous: Vec<u16> = self
            .processes
            .keys()
            .copied()
            .filter(|p| *p != port)
            .collect();
        for p in previous {
            self.retire(p).await;
        }
        Ok(())
    }

    /// Kills the process on `port` and returns the port to the pool
    async fn retire(&mut self, port: u16) {
        if let Some(mut child) = self.processes.remove(&port) {
            debug!("Stopping release on port {}", port);
            if let Err(e) = child.kill().await {
                warn!("Cannot kill release on port {}: {}", port, e);
            }
        }
        self.ports.release_port(port);
    }

    async fn kill_all(&mut self) {
        let ports: Vec<u16> = self.processes.keys().copied().collect();
        for port in ports {
            self.retire(port).await;
        }
    }
}

/// Polls `host:port` every second until it accepts a connection
async fn check_connect(
    host: &str,
    port: u16,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), ReleaseError> {
    // Each attempt is bounded so a hung connect cannot outlive the deadline
    let attempts = async {
        let mut tick = tokio::time::interval(HEALTH_INTERVAL);
        loop {
            tick.tick().await;
            let attempt = tokio::time::timeout(HEALTH_INTERVAL, TcpStream::connect((host, port)));
            if let Ok(Ok(_)) = attempt.await {
                return;
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ReleaseError::Cancelled),
        _ = tokio::time::sleep(timeout) => Err(ReleaseError::ConnectionFailed(port)),
        _ = attempts => {
            debug!("Opened {}:{}", host, port);
            Ok(())
        }
    }
}
