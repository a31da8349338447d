//! Step runner
//!
//! Runs the commands of one runner (trigger, deploy or release) for one
//! version and reports every step to the state manager.

use shipyard_core::domain::env::{EnvVar, EnvVars};
use shipyard_core::domain::exec::ExecSpec;
use shipyard_core::domain::state::{RunnerName, RunnerStatus, Step};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tracing::warn;

use crate::exec::{self, ExecError};
use crate::state::StateClient;

pub struct StepRunner {
    version: String,
    runner: RunnerName,
    basedir: PathBuf,
    state: Arc<dyn StateClient>,
}

impl StepRunner {
    /// # Arguments
    /// * `version` - Version the steps belong to
    /// * `runner` - Runner the steps are recorded under
    /// * `basedir` - Directory relative working directories resolve against
    /// * `state` - Where step results are reported
    pub fn new(
        version: impl Into<String>,
        runner: RunnerName,
        basedir: impl Into<PathBuf>,
        state: Arc<dyn StateClient>,
    ) -> Self {
        Self {
            version: version.into(),
            runner,
            basedir: basedir.into(),
            state,
        }
    }

    /// Runs `spec` to completion and records it as `success` or `failure`
    pub async fn execute(&self, spec: &ExecSpec, envs: &EnvVars) -> Result<Option<EnvVar>, ExecError> {
        let mut step = Step::new(spec.clone(), envs.clone());
        let started = Instant::now();

        let result = exec::run(spec, &self.basedir, envs).await;

        step.duration = Some(format_duration(started.elapsed()));
        let status = match &result {
            Ok(_) => RunnerStatus::Success,
            Err(e) => {
                warn!(version = %self.version, step = %spec.name, "{}", e);
                RunnerStatus::Failure
            }
        };
        self.state
            .notify_step(&self.version, self.runner, status, step)
            .await;
        result
    }

    /// Records a step performed outside the executor
    pub async fn record(&self, spec: ExecSpec, envs: &EnvVars, status: RunnerStatus) {
        let step = Step::new(spec, envs.clone());
        self.state
            .notify_step(&self.version, self.runner, status, step)
            .await;
    }

    /// Records a step that took `elapsed`
    pub async fn record_timed(&self, spec: ExecSpec, envs: &EnvVars, status: RunnerStatus, elapsed: Duration) {
        let mut step = Step::new(spec, envs.clone());
        step.duration = Some(format_duration(elapsed));
        self.state
            .notify_step(&self.version, self.runner, status, step)
            .await;
    }

    /// Starts `spec` in the background
    ///
    /// Output is captured in `log-<version>.out` and `err-<version>.out`
    /// under `dir`; the step is recorded as `started` with both files
    /// attached, or as `failure` when the process cannot be launched.
    pub async fn start(&self, spec: &ExecSpec, envs: &EnvVars, dir: &Path) -> Result<Child, ExecError> {
        let files = vec![
            dir.join(format!("log-{}.out", self.version)),
            dir.join(format!("err-{}.out", self.version)),
        ];

        let result = self.spawn(spec, envs, &files);

        let mut step = Step::new(spec.clone(), envs.clone());
        step.files = files;
        let status = match &result {
            Ok(_) => RunnerStatus::Started,
            Err(e) => {
                warn!(version = %self.version, step = %spec.name, "{}", e);
                RunnerStatus::Failure
            }
        };
        self.state
            .notify_step(&self.version, self.runner, status, step)
            .await;
        result
    }

    fn spawn(&self, spec: &ExecSpec, envs: &EnvVars, files: &[PathBuf]) -> Result<Child, ExecError> {
        let stdout = File::create(&files[0])?;
        let stderr = File::create(&files[1])?;
        exec::run_background(spec, &self.basedir, envs, stdout, stderr)
    }
}

fn format_duration(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::state::tests::MockStateClient;

    fn runner(state: &Arc<MockStateClient>, dir: &Path) -> StepRunner {
        StepRunner::new("abcd", RunnerName::Deploy, dir, state.clone())
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[tokio::test]
    async fn test_execute_records_success() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(MockStateClient::default());
        let mut envs = EnvVars::new();
        envs.push("version", "abcd");
        let spec = ExecSpec::new("echo").with_name("test").with_args(["ok"]);

        runner(&state, dir.path()).execute(&spec, &envs).await.unwrap();

        let events = state.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, "abcd");
        assert_eq!(events[0].runner, RunnerName::Deploy);
        assert_eq!(events[0].status, RunnerStatus::Success);
        assert_eq!(events[0].step.name, "test");
        assert_eq!(events[0].step.variables, envs);
        assert!(events[0].step.duration.as_deref().unwrap().ends_with("ms"));
    }

    #[tokio::test]
    async fn test_execute_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(MockStateClient::default());
        let spec = ExecSpec::new("false").with_name("build");

        let result = runner(&state, dir.path()).execute(&spec, &EnvVars::new()).await;

        assert!(result.is_err());
        assert_eq!(state.events()[0].status, RunnerStatus::Failure);
    }

    #[tokio::test]
    async fn test_start_attaches_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(MockStateClient::default());
        let spec = ExecSpec::new("sh").with_name("run").with_args(["-c", "echo up"]);

        let mut child = runner(&state, dir.path())
            .start(&spec, &EnvVars::new(), dir.path())
            .await
            .unwrap();
        child.wait().await.unwrap();

        let events = state.events();
        assert_eq!(events[0].status, RunnerStatus::Started);
        let log = dir.path().join("log-abcd.out");
        assert_eq!(events[0].step.files, vec![log.clone(), dir.path().join("err-abcd.out")]);
        assert_eq!(std::fs::read_to_string(log).unwrap(), "up\n");
    }

    #[tokio::test]
    async fn test_start_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(MockStateClient::default());
        let spec = ExecSpec::new("shipyard-command-that-does-not-exist").with_name("run");

        let result = runner(&state, dir.path())
            .start(&spec, &EnvVars::new(), dir.path())
            .await;

        assert!(matches!(result, Err(ExecError::Spawn { .. })));
        assert_eq!(state.events()[0].status, RunnerStatus::Failure);
    }
}
