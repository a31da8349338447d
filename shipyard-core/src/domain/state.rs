//! Per-version build history
//!
//! Records produced by the workflows and read back by the status API.

use super::env::EnvVars;
use super::exec::ExecSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage a runner belongs to
///
/// The derived ordering is the order runners are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerName {
    Trigger,
    Deploy,
    Release,
}

impl RunnerName {
    pub const ALL: [RunnerName; 3] = [RunnerName::Trigger, RunnerName::Deploy, RunnerName::Release];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerName::Trigger => "trigger",
            RunnerName::Deploy => "deploy",
            RunnerName::Release => "release",
        }
    }
}

impl fmt::Display for RunnerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a runner, overwritten on every step notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Started,
    Success,
    Failure,
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunnerStatus::Started => "started",
            RunnerStatus::Success => "success",
            RunnerStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// One executed command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub spec: ExecSpec,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Elapsed time such as `"12ms"`, set once the step completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Variables in effect when the step ran
    #[serde(rename = "flow.envs", default, skip_serializing_if = "EnvVars::is_empty")]
    pub variables: EnvVars,
    /// Captured output files (`log`, then `err`) of a background step
    #[serde(skip)]
    pub files: Vec<PathBuf>,
}

impl Step {
    pub fn new(spec: ExecSpec, variables: EnvVars) -> Self {
        Self {
            name: spec.name.clone(),
            spec,
            start_time: Some(Utc::now()),
            duration: None,
            variables,
            files: Vec::new(),
        }
    }
}

/// Steps recorded for one stage of one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub steps: Vec<Step>,
    pub name: RunnerName,
    pub status: RunnerStatus,
}

impl Runner {
    pub fn new(name: RunnerName) -> Self {
        Self {
            steps: Vec::new(),
            name,
            status: RunnerStatus::Started,
        }
    }
}

/// Everything known about one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticWorkflow {
    pub version: String,
    pub runners: BTreeMap<RunnerName, Runner>,
}

impl SyntheticWorkflow {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            runners: BTreeMap::new(),
        }
    }

    /// Appends `step` to the named runner and overwrites its status
    pub fn record(&mut self, name: RunnerName, status: RunnerStatus, step: Step) {
        let runner = self
            .runners
            .entry(name)
            .or_insert_with(|| Runner::new(name));
        runner.steps.push(step);
        runner.status = status;
    }

    /// Started runners in `trigger`, `deploy`, `release` order
    pub fn ordered_runners(&self) -> Vec<Runner> {
        self.runners.values().cloned().collect()
    }

    /// Captured file of the first release step; `index` 0 is stdout, 1 stderr
    pub fn release_file(&self, index: usize) -> Option<&PathBuf> {
        self.runners
            .get(&RunnerName::Release)?
            .steps
            .first()?
            .files
            .get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_order() {
        let mut workflow = SyntheticWorkflow::new("abcd");
        workflow.record(
            RunnerName::Release,
            RunnerStatus::Started,
            Step::new(ExecSpec::new("run").with_name("run"), EnvVars::new()),
        );
        workflow.record(
            RunnerName::Trigger,
            RunnerStatus::Success,
            Step::new(ExecSpec::new("version").with_name("version"), EnvVars::new()),
        );

        let names: Vec<_> = workflow.ordered_runners().iter().map(|r| r.name).collect();
        assert_eq!(names, vec![RunnerName::Trigger, RunnerName::Release]);
    }

    #[test]
    fn test_record_overwrites_status() {
        let mut workflow = SyntheticWorkflow::new("abcd");
        let step = Step::new(ExecSpec::new("go").with_name("test"), EnvVars::new());

        workflow.record(RunnerName::Deploy, RunnerStatus::Success, step.clone());
        workflow.record(RunnerName::Deploy, RunnerStatus::Failure, step);

        let deploy = &workflow.runners[&RunnerName::Deploy];
        assert_eq!(deploy.steps.len(), 2);
        assert_eq!(deploy.status, RunnerStatus::Failure);
    }

    #[test]
    fn test_release_file() {
        let mut workflow = SyntheticWorkflow::new("abcd");
        assert!(workflow.release_file(0).is_none());

        let mut step = Step::new(ExecSpec::new("run").with_name("run"), EnvVars::new());
        step.files = vec![PathBuf::from("log-abcd.out"), PathBuf::from("err-abcd.out")];
        workflow.record(RunnerName::Release, RunnerStatus::Started, step);

        assert_eq!(workflow.release_file(0), Some(&PathBuf::from("log-abcd.out")));
        assert_eq!(workflow.release_file(1), Some(&PathBuf::from("err-abcd.out")));
    }

    #[test]
    fn test_step_json_shape() {
        let spec = ExecSpec::new("go")
            .with_name("build")
            .with_args(["build"]);
        let mut vars = EnvVars::new();
        vars.push("version", "abcd");
        let mut step = Step::new(spec, vars);
        step.duration = Some("12ms".to_string());

        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["command"], "go");
        assert_eq!(json["args"][0], "build");
        assert_eq!(json["name"], "build");
        assert_eq!(json["duration"], "12ms");
        assert_eq!(json["flow.envs"][0]["name"], "version");
        assert!(json.get("envs").is_none());
        assert!(json.get("output").is_none());
        assert!(json.get("start_time").is_some());
    }

    #[test]
    fn test_status_serialization() {
        let runner = Runner::new(RunnerName::Deploy);
        let json = serde_json::to_value(&runner).unwrap();
        assert_eq!(json["name"], "deploy");
        assert_eq!(json["status"], "started");
    }
}
