//! Deploy workflow
//!
//! Builds one version: resolves where the artifact goes, then runs the
//! `install`, `test`, `pre_build` and `build` steps in that order.

use anyhow::Context;
use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::event::{Event, EventKind};
use shipyard_core::domain::exec::ExecSpec;
use shipyard_core::domain::state::{RunnerName, RunnerStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::forward;
use super::pipeline::StepRunner;
use crate::config::DeployConfig;
use crate::state::StateClient;

pub struct DeployWorkflow {
    config: DeployConfig,
    workspace: PathBuf,
    execs: PathBuf,
    state: Arc<dyn StateClient>,
}

impl DeployWorkflow {
    /// # Arguments
    /// * `config` - Artifact templates and build steps
    /// * `workspace` - Checkout the steps run in
    /// * `execs` - Directory artifact paths are relative to
    /// * `state` - Where step results are reported
    pub fn new(config: DeployConfig, workspace: PathBuf, execs: PathBuf, state: Arc<dyn StateClient>) -> Self {
        Self {
            config,
            workspace,
            execs,
            state,
        }
    }

    /// Steps in execution order, named after their configuration key
    fn steps(&self) -> [ExecSpec; 4] {
        [
            self.config.install.clone().with_name("install"),
            self.config.test.clone().with_name("test"),
            self.config.pre_build.clone().with_name("pre_build"),
            self.config.build.clone().with_name("build"),
        ]
    }

    /// Builds every triggered version until `cancel` fires
    ///
    /// # Arguments
    /// * `inbox` - Versions to build
    /// * `release` - Receives the variables of every successful build
    /// * `trigger` - Told about every finished build, successful or not
    pub async fn run(
        self,
        mut inbox: mpsc::Receiver<Event>,
        release: mpsc::Sender<Event>,
        trigger: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("Starting deploy workflow");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if event.kind != EventKind::Triggered {
                debug!("Ignoring {:?} event", event.kind);
                continue;
            }

            match self.deploy(event.envs).await {
                Ok(envs) => {
                    if !forward(&release, Event::deployed(envs), &cancel).await {
                        break;
                    }
                }
                Err(e) => error!("Deploy failed: {:#}", e),
            }

            if !forward(&trigger, Event::deployed(EnvVars::new()), &cancel).await {
                break;
            }
        }

        info!("Stopping deploy workflow");
        Ok(())
    }

    /// Runs the build steps, returning the variables they produced
    async fn deploy(&self, mut envs: EnvVars) -> anyhow::Result<EnvVars> {
        let version = envs.get("version").unwrap_or_default().to_string();
        info!(version = %version, "Deploying");
        let runner = StepRunner::new(
            version.as_str(),
            RunnerName::Deploy,
            self.workspace.clone(),
            self.state.clone(),
        );

        if let Err(e) = self.add_artifact(&mut envs).await {
            runner
                .record(ExecSpec::default().with_name("artifact"), &envs, RunnerStatus::Failure)
                .await;
            return Err(e);
        }

        for spec in self.steps() {
            if spec.is_empty() {
                debug!(version = %version, "No {} step, skipping", spec.name);
                continue;
            }
            let output = runner
                .execute(&spec, &envs)
                .await
                .with_context(|| format!("{} step of {} failed", spec.name, version))?;
            if let Some(var) = output {
                envs.push_var(var);
            }
        }

        info!(version = %version, "Deploy succeeded");
        Ok(envs)
    }

    /// Adds `artifactDirectory`, `artifactFilename` and `artifact`
    ///
    /// The directory is created when missing.
    async fn add_artifact(&self, envs: &mut EnvVars) -> anyhow::Result<()> {
        let artifact = &self.config.artifact;
        let directory = self.execs.join(envs.replace(&artifact.directory)?);
        let filename = format!("{}{}", envs.replace(&artifact.filename)?, artifact.extension);
        let path = directory.join(&filename);

        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Cannot create {}", directory.display()))?;

        envs.push("artifactDirectory", directory.to_string_lossy());
        envs.push("artifactFilename", filename);
        envs.push("artifact", path.to_string_lossy());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ArtifactConfig;
    use crate::state::tests::MockStateClient;
    use std::time::Duration;

    fn config(test: ExecSpec, build: ExecSpec) -> DeployConfig {
        DeployConfig {
            artifact: ArtifactConfig {
                filename: "app-${version}".to_string(),
                directory: "bin".to_string(),
                extension: String::new(),
            },
            install: ExecSpec::new("true"),
            test,
            pre_build: ExecSpec::default(),
            build,
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        state: Arc<MockStateClient>,
        inbox: mpsc::Sender<Event>,
        release: mpsc::Receiver<Event>,
        trigger: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    }

    fn start(config: DeployConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("workspace");
        let execs = dir.path().join("execs");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::create_dir_all(&execs).unwrap();

        let state = Arc::new(MockStateClient::default());
        let workflow = DeployWorkflow::new(config, workspace, execs, state.clone());
        let (inbox, inbox_rx) = mpsc::channel(1);
        let (release_tx, release) = mpsc::channel(1);
        let (trigger_tx, trigger) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(workflow.run(inbox_rx, release_tx, trigger_tx, cancel.clone()));
        Harness {
            dir,
            state,
            inbox,
            release,
            trigger,
            cancel,
        }
    }

    fn version(v: &str) -> EnvVars {
        let mut envs = EnvVars::new();
        envs.push("version", v);
        envs
    }

    async fn recv(rx: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_deploy() {
        let build = ExecSpec::new("touch").with_args(["${artifact}"]);
        let mut h = start(config(ExecSpec::new("true"), build));

        h.inbox.send(Event::triggered(version("abcd"))).await.unwrap();

        let released = recv(&mut h.release).await;
        assert_eq!(released.kind, EventKind::Deployed);
        let artifact = h.dir.path().join("execs/bin/app-abcd");
        assert_eq!(released.envs.get("version"), Some("abcd"));
        assert_eq!(released.envs.get("artifactFilename"), Some("app-abcd"));
        assert_eq!(released.envs.get("artifact"), artifact.to_str());
        assert!(artifact.exists());

        let ack = recv(&mut h.trigger).await;
        assert_eq!(ack.kind, EventKind::Deployed);
        assert!(ack.envs.is_empty());

        let steps: Vec<_> = h
            .state
            .events()
            .into_iter()
            .map(|e| (e.runner, e.status, e.step.name))
            .collect();
        assert_eq!(
            steps,
            vec![
                (RunnerName::Deploy, RunnerStatus::Success, "install".to_string()),
                (RunnerName::Deploy, RunnerStatus::Success, "test".to_string()),
                (RunnerName::Deploy, RunnerStatus::Success, "build".to_string()),
            ]
        );
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_failed_step_aborts_and_unblocks_trigger() {
        let mut h = start(config(ExecSpec::new("false"), ExecSpec::new("true")));

        h.inbox.send(Event::triggered(version("abcd"))).await.unwrap();

        let ack = recv(&mut h.trigger).await;
        assert_eq!(ack.kind, EventKind::Deployed);
        assert!(h.release.try_recv().is_err());

        let events = h.state.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].step.name, "test");
        assert_eq!(events[1].status, RunnerStatus::Failure);
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_step_output_is_passed_on() {
        let build = ExecSpec::new("echo")
            .with_args(["built-${version}"])
            .with_output("buildId");
        let mut h = start(config(ExecSpec::new("true"), build));

        h.inbox.send(Event::triggered(version("abcd"))).await.unwrap();

        let released = recv(&mut h.release).await;
        assert_eq!(released.envs.get("buildId"), Some("built-abcd"));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_missing_variable_unblocks_trigger() {
        let mut cfg = config(ExecSpec::new("true"), ExecSpec::new("true"));
        cfg.artifact.filename = "app-${unknown}".to_string();
        let mut h = start(cfg);

        h.inbox.send(Event::triggered(version("abcd"))).await.unwrap();

        let ack = recv(&mut h.trigger).await;
        assert_eq!(ack.kind, EventKind::Deployed);
        assert!(h.release.try_recv().is_err());
        let events = h.state.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].step.name, "artifact");
        assert_eq!(events[0].status, RunnerStatus::Failure);
        h.cancel.cancel();
    }
}
