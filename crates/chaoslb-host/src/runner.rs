//! Command execution.
//!
//! Every external call is a blocking wait on a child process with no
//! timeout. A hung tool stalls the caller; nothing here retries.

use std::fmt;
use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// A program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `program` followed by `args` starts with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        let Some((program, rest)) = prefix.split_first() else {
            return true;
        };
        *program == self.program
            && rest.len() <= self.args.len()
            && rest.iter().zip(&self.args).all(|(want, have)| *want == have.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Why an external call did not succeed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

/// Executes host commands.
///
/// Implementations must be shareable across the reconciler, the monitor
/// task and the teardown task.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn run(&self, cmd: &Invocation) -> io::Result<CommandOutput>;

    /// Run a command and treat a non-zero exit as an error.
    ///
    /// Returns stdout on success.
    async fn run_checked(&self, cmd: &Invocation) -> Result<String, CommandError> {
        let output = self.run(cmd).await.map_err(|source| CommandError::Spawn {
            command: cmd.to_string(),
            source,
        })?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(CommandError::Failed {
                command: cmd.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run a query whose exit status is the answer: exists or not.
    ///
    /// A spawn failure counts as "no".
    async fn probe(&self, cmd: &Invocation) -> bool {
        match self.run(cmd).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!(command = %cmd, error = %e, "probe command could not run");
                false
            }
        }
    }
}

/// Runs commands on the real host via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &Invocation) -> io::Result<CommandOutput> {
        debug!(command = %cmd, "running");
        let output = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
