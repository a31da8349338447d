//! Command descriptors

use super::env::EnvVars;
use serde::{Deserialize, Serialize};

/// Declarative description of one pipeline step
///
/// Every field except `name` may contain `${name}` placeholders which are
/// resolved at execution time. When `output` is set, the first line the
/// command prints is bound to a variable of that name for later steps.
///
/// A spec is a template: callers clone it before binding per-run values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecSpec {
    #[serde(skip)]
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub workdir: String,
    #[serde(skip_serializing_if = "EnvVars::is_empty")]
    pub envs: EnvVars,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ExecSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push(name, value);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// A spec without a command is a skipped step
    pub fn is_empty(&self) -> bool {
        self.command.trim().is_empty()
    }

    /// Human readable `command arg1 arg2` form, before substitution
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: ExecSpec = serde_json::from_str(r#"{"command":"go","args":["test"]}"#).unwrap();

        assert_eq!(spec.command, "go");
        assert_eq!(spec.args, vec!["test"]);
        assert!(spec.workdir.is_empty());
        assert!(spec.envs.is_empty());
        assert!(spec.output.is_none());
    }

    #[test]
    fn test_empty_spec() {
        assert!(ExecSpec::default().is_empty());
        assert!(ExecSpec::new("  ").is_empty());
        assert!(!ExecSpec::new("go").is_empty());
    }

    #[test]
    fn test_clone_does_not_share_envs() {
        let template = ExecSpec::new("${artifact}").with_env("PORT", ":${port}");

        let mut first = template.clone();
        first.envs.push("port", "8090");

        assert_eq!(template.envs.len(), 1);
        assert_eq!(first.envs.len(), 2);
    }

    #[test]
    fn test_command_line() {
        let spec = ExecSpec::new("go").with_args(["build", "-o", "${artifact}", "."]);
        assert_eq!(spec.command_line(), "go build -o ${artifact} .");
    }
}
