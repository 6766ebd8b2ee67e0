//! Structured external command execution.
//!
//! Every external program the pipeline touches (git, the downstream build
//! scripts, `dotnet --info`, `uname`, `tasklist`) is described by a
//! [`CommandSpec`] and executed through a [`ProcessRunner`]. Nothing is
//! assembled into a shell string, and tests can swap in a fake runner and
//! assert on the argument vectors.

use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// A program invocation: executable, arguments, working directory and
/// environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments, passed through verbatim.
    pub args: Vec<String>,

    /// Working directory (inherits the caller's when `None`).
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the child only.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Captured result of a command run with piped output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes [`CommandSpec`]s.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run with inherited stdio and wait for the exit code.
    async fn status(&self, cmd: &CommandSpec) -> Result<i32>;

    /// Run with stdout/stderr captured.
    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput>;
}

/// Run a command that must exit zero; anything else becomes
/// [`HarnessError::CommandFailed`] tagged with `stage`.
pub async fn run_stage(
    runner: &dyn ProcessRunner,
    stage: &str,
    cmd: &CommandSpec,
) -> Result<()> {
    let code = runner.status(cmd).await?;
    if code != 0 {
        return Err(HarnessError::CommandFailed {
            stage: stage.to_string(),
            code,
        });
    }
    Ok(())
}

/// Runs commands on the host via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn status(&self, cmd: &CommandSpec) -> Result<i32> {
        info!(command = %cmd, cwd = ?cmd.cwd, "Running");

        let status = cmd
            .to_command()
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| HarnessError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %cmd, "Capturing output");

        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| HarnessError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Logs side-effecting commands instead of running them.
///
/// Read-only queries issued through [`ProcessRunner::output`] (host name,
/// `dotnet --info`, the process list) still go to the wrapped runner so the
/// printed plan carries the real RID.
#[derive(Debug, Default, Clone)]
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: ProcessRunner> ProcessRunner for DryRunRunner<R> {
    async fn status(&self, cmd: &CommandSpec) -> Result<i32> {
        info!(command = %cmd, cwd = ?cmd.cwd, "[dry-run] would run");
        Ok(0)
    }

    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        self.inner.output(cmd).await
    }
}
