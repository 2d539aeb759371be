//! Command execution against the host that runs the device containers
//!
//! Everything netlab does on the host goes through [`CommandExecutor::run`]:
//! one shell command in, its combined output (or a failure) out. The
//! transports here are the system `ssh` client ([`SshExecutor`]) and a local
//! `sh -c` ([`LocalExecutor`]). [`Journal`] wraps either one to keep a trail of
//! what succeeded.

mod journal;
mod local;
mod ssh;

pub use journal::{CompletedCommand, Journal};
pub use local::LocalExecutor;
pub use ssh::{SshConfig, SshExecutor};

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tracing::debug;

/// Why a command did not succeed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit status {0}")]
    Exit(i32),

    #[error("terminated by signal")]
    Signaled,

    #[error("{0}")]
    Other(String),
}

/// A failed command together with whatever it printed before failing.
#[derive(Debug)]
pub struct ExecFailure {
    pub output: String,
    pub error: TransportError,
}

impl ExecFailure {
    pub fn new(output: impl Into<String>, error: TransportError) -> Self {
        Self {
            output: output.into(),
            error,
        }
    }
}

/// A failed command with the context needed to report it: the command text,
/// its trimmed output and the transport error.
#[derive(Error, Debug)]
#[error("failed to run '{command}', output: '{output}'")]
pub struct CommandError {
    pub command: String,
    pub output: String,
    #[source]
    pub source: TransportError,
}

/// Blocking request/response channel to the host.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one shell command and return its combined stdout/stderr.
    async fn run(&self, command: &str) -> Result<String, ExecFailure>;
}

#[async_trait]
impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        (**self).run(command).await
    }
}

#[async_trait]
impl<E: CommandExecutor + ?Sized> CommandExecutor for Box<E> {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        (**self).run(command).await
    }
}

/// Run `command` and turn a failure into a [`CommandError`].
pub async fn run_checked<E>(executor: &E, command: &str) -> Result<String, CommandError>
where
    E: CommandExecutor + ?Sized,
{
    debug!(command, "running command");
    executor
        .run(command)
        .await
        .map_err(|failure| CommandError {
            command: command.to_string(),
            output: failure.output.trim_end().to_string(),
            source: failure.error,
        })
}

/// Spawn `cmd`, wait for it, and fold stdout and stderr into one string.
///
/// Dropping the returned future kills the child.
pub(crate) async fn capture(
    mut cmd: tokio::process::Command,
    program: &str,
) -> Result<String, ExecFailure> {
    let output = cmd
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| {
            ExecFailure::new(
                "",
                TransportError::Spawn {
                    program: program.to_string(),
                    source,
                },
            )
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(ExecFailure::new(combined, status_error(output.status)))
    }
}

fn status_error(status: ExitStatus) -> TransportError {
    match status.code() {
        Some(code) => TransportError::Exit(code),
        None => TransportError::Signaled,
    }
}
