//! Command executor
//!
//! Turns an [`ExecSpec`] into a running process: placeholders are resolved
//! against the pipeline variables, the working directory is taken relative
//! to a base directory, and the process inherits the orchestrator's
//! environment plus the resolved variables.

use shipyard_core::domain::env::{self, EnvError, EnvVar, EnvVars};
use shipyard_core::domain::exec::ExecSpec;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("cannot start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` failed ({})", exit_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// A command ready to be spawned
pub struct Prepared {
    pub command: Command,
    /// Resolved command line, for logs and error messages
    pub command_line: String,
}

/// Resolves `spec` against `envs` and builds the process
///
/// Step-local variables only fill in names missing from `envs`; their
/// values may reference the pipeline variables.
pub fn prepare(spec: &ExecSpec, workspace: &Path, envs: &EnvVars) -> Result<Prepared, ExecError> {
    let mut vars: HashMap<String, String> = envs.to_map()?;

    let program = env::substitute(&spec.command, &vars)?;
    let args = spec
        .args
        .iter()
        .map(|arg| env::substitute(arg, &vars))
        .collect::<Result<Vec<_>, _>>()?;
    let workdir = workspace.join(env::substitute(&spec.workdir, &vars)?);

    for local in spec.envs.iter() {
        if !vars.contains_key(&local.name) {
            let value = env::substitute(&local.value, &vars)?;
            vars.insert(local.name.clone(), value);
        }
    }

    let command_line = std::iter::once(program.as_str())
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    info!(step = %spec.name, "{}", command_line);

    let mut command = Command::new(&program);
    command
        .args(&args)
        .current_dir(workdir)
        .envs(&vars)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    Ok(Prepared { command, command_line })
}

/// Runs `spec` to completion
///
/// Stdout and stderr are merged in arrival order and every line is logged.
/// When the spec names an `output`, the first line is returned bound to it.
pub async fn run(
    spec: &ExecSpec,
    workspace: &Path,
    envs: &EnvVars,
) -> Result<Option<EnvVar>, ExecError> {
    let Prepared {
        mut command,
        command_line,
    } = prepare(spec, workspace, envs)?;

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        info!(step = %spec.name, "{}", line);
        lines.push(line);
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(ExecError::Failed {
            command: command_line,
            code: status.code(),
            output: lines.join("\n"),
        });
    }

    Ok(spec.output.as_ref().map(|name| EnvVar {
        name: name.clone(),
        value: lines.first().cloned().unwrap_or_default(),
    }))
}

/// Starts `spec` without waiting for it
///
/// Output goes to the given files. The returned handle is killed when
/// dropped.
pub fn run_background(
    spec: &ExecSpec,
    workspace: &Path,
    envs: &EnvVars,
    stdout: File,
    stderr: File,
) -> Result<Child, ExecError> {
    let Prepared {
        mut command,
        command_line,
    } = prepare(spec, workspace, envs)?;

    let child = command
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    debug!(step = %spec.name, pid = ?child.id(), "started {}", command_line);
    Ok(child)
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> EnvVars {
        pairs.iter().map(|(n, v)| EnvVar::new(*n, *v)).collect()
    }

    #[tokio::test]
    async fn test_run_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("echo")
            .with_name("version")
            .with_args(["${version}"])
            .with_output("captured");

        let result = run(&spec, dir.path(), &vars(&[("version", "abc123")]))
            .await
            .unwrap();

        assert_eq!(result, Some(EnvVar::new("captured", "abc123")));
    }

    #[tokio::test]
    async fn test_run_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("true");

        let result = run(&spec, dir.path(), &EnvVars::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_run_failure() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("sh").with_args(["-c", "echo broken >&2; exit 3"]);

        let err = run(&spec, dir.path(), &EnvVars::new()).await.unwrap_err();

        match err {
            ExecError::Failed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("shipyard-command-that-does-not-exist");

        let err = run(&spec, dir.path(), &EnvVars::new()).await.unwrap_err();

        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_prepare_resolves_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("./app-${version}").with_args(["--port", "${port}"]);

        let prepared = prepare(&spec, dir.path(), &vars(&[("version", "abcd"), ("port", "8090")])).unwrap();

        assert_eq!(prepared.command_line, "./app-abcd --port 8090");
    }

    #[tokio::test]
    async fn test_spawn_error_names_resolved_command() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("shipyard-missing-${version}").with_args(["x"]);

        let err = run(&spec, dir.path(), &vars(&[("version", "abcd")])).await.unwrap_err();

        assert!(matches!(err, ExecError::Spawn { ref command, .. } if command == "shipyard-missing-abcd x"));
    }

    #[tokio::test]
    async fn test_missing_env_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let spec = ExecSpec::new("touch").with_args([
            marker.to_string_lossy().to_string(),
            "${version}".to_string(),
        ]);

        let err = run(&spec, dir.path(), &EnvVars::new()).await.unwrap_err();

        assert!(matches!(err, ExecError::Env(EnvError::MissingEnv(ref k)) if k == "version"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_local_envs_do_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("sh")
            .with_args(["-c", "echo $ADDR $port"])
            .with_env("ADDR", "localhost:${port}")
            .with_env("port", "1")
            .with_output("out");

        let result = run(&spec, dir.path(), &vars(&[("port", "8090")]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.value, "localhost:8090 8090");
    }

    #[tokio::test]
    async fn test_workdir_is_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let spec = ExecSpec {
            command: "pwd".to_string(),
            workdir: "sub".to_string(),
            output: Some("cwd".to_string()),
            ..Default::default()
        };

        let result = run(&spec, dir.path(), &EnvVars::new())
            .await
            .unwrap()
            .unwrap();

        assert!(result.value.ends_with("/sub"));
    }

    #[tokio::test]
    async fn test_run_background_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.out");
        let err = dir.path().join("err.out");
        let spec = ExecSpec::new("sh").with_args(["-c", "echo out; echo err >&2"]);

        let mut child = run_background(
            &spec,
            dir.path(),
            &EnvVars::new(),
            File::create(&log).unwrap(),
            File::create(&err).unwrap(),
        )
        .unwrap();
        let status = child.wait().await.unwrap();

        assert!(status.success());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "out\n");
        assert_eq!(std::fs::read_to_string(&err).unwrap(), "err\n");
    }

    #[tokio::test]
    async fn test_run_background_can_be_killed() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec::new("sleep").with_args(["30"]);

        let mut child = run_background(
            &spec,
            dir.path(),
            &EnvVars::new(),
            File::create(dir.path().join("log")).unwrap(),
            File::create(dir.path().join("err")).unwrap(),
        )
        .unwrap();

        assert!(child.try_wait().unwrap().is_none());
        child.kill().await.unwrap();
        assert!(child.try_wait().unwrap().is_some());
    }
}
