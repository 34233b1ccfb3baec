//! Sub-shell execution.
//!
//! Commands run through a POSIX shell (`sh -c`) with the environment
//! overrides materialised by the variable store layered over the inherited
//! process environment. Two modes exist: captured output for `$(shell …)`
//! expansion, and streamed output for recipe commands, whose stdout and
//! stderr pass straight through to the user.

use std::io;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::vars::VarStore;

/// Shell binary used for every sub-process.
pub const SHELL_PROGRAM: &str = "sh";

/// Errors raised when launching or waiting on a sub-shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The shell process could not be started at all.
    #[error("could not launch '{SHELL_PROGRAM} -c': {source}")]
    Spawn {
        /// Underlying launch failure.
        #[source]
        source: io::Error,
    },
    /// A captured command exited non-zero; its stderr is preserved.
    #[error("shell command '{command}' failed: {status}\nstderr: {stderr}")]
    Failed {
        /// The command handed to `sh -c`.
        command: String,
        /// Exit status reported by the shell.
        status: ExitStatus,
        /// Captured standard error text.
        stderr: String,
    },
    /// A streamed command exited non-zero; its output already reached the
    /// user's terminal.
    #[error("command exited with {status}")]
    Status {
        /// Exit status reported by the shell.
        status: ExitStatus,
    },
}

fn shell_command(vars: &VarStore, command: &str) -> Command {
    let mut cmd = Command::new(SHELL_PROGRAM);
    cmd.arg("-c").arg(command);
    let env = vars.environment();
    cmd.envs(env.iter().map(|(name, value)| (name.clone(), value.clone())));
    cmd
}

/// Run `command` and capture its standard output.
///
/// Trailing carriage returns and newlines are stripped from the capture.
/// While the variable store is materialising its environment, no process
/// is launched and the result is empty; this breaks the recursion that
/// would otherwise occur if materialisation ever re-entered expansion.
///
/// # Errors
///
/// Returns [`ShellError::Failed`] when the command exits non-zero, with
/// the captured stderr attached.
pub fn capture(vars: &VarStore, command: &str) -> Result<String, ShellError> {
    if vars.materialising() {
        return Ok(String::new());
    }

    debug!("executing shell command: [{command}]");
    let output = shell_command(vars, command)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ShellError::Spawn { source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.is_empty() {
        debug!("shell stdout: [{}]", stdout.trim_end_matches(['\n', '\r']));
    }
    if !stderr.is_empty() {
        debug!("shell stderr: [{}]", stderr.trim_end_matches(['\n', '\r']));
    }

    if !output.status.success() {
        return Err(ShellError::Failed {
            command: command.to_owned(),
            status: output.status,
            stderr: stderr.into_owned(),
        });
    }

    Ok(stdout.trim_end_matches(['\n', '\r']).to_owned())
}

/// Run `command` with stdout and stderr connected to the caller's streams.
///
/// # Errors
///
/// Returns [`ShellError::Status`] when the command exits non-zero.
pub fn run_streamed(vars: &VarStore, command: &str) -> Result<(), ShellError> {
    debug!("executing recipe command: [{command}]");
    let status = shell_command(vars, command)
        .status()
        .map_err(|source| ShellError::Spawn { source })?;

    if status.success() {
        Ok(())
    } else {
        Err(ShellError::Status { status })
    }
}
