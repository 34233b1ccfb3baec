//! CLI execution and dispatch.
//!
//! Keeps `main` minimal: seed the variable store from the process
//! environment, parse the makefile, choose the target, and hand over to
//! the engine. Errors carry the exit code the command-line contract
//! promises: 2 for parse failures and empty makefiles, 1 for anything
//! that goes wrong while building.

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::cli::Cli;
use crate::engine::{BuildError, Engine};
use crate::parser::{self, ParseError};
use crate::vars::VarStore;

/// Errors surfaced to the user by [`run`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The makefile could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The makefile parsed but declares no rules.
    #[error("no rules found in {path}")]
    NoRules {
        /// Path of the empty makefile.
        path: Utf8PathBuf,
    },
    /// The build itself failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl RunnerError {
    /// Process exit code for this error: parse problems and empty
    /// makefiles exit 2, build failures exit 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Parse(_) | Self::NoRules { .. } => 2,
            Self::Build(_) => 1,
        }
    }
}

/// Execute the parsed [`Cli`]: parse the makefile, pick a target, build.
///
/// # Errors
///
/// Returns a [`RunnerError`] carrying the exit code mandated for its
/// category.
pub fn run(cli: &Cli) -> Result<(), RunnerError> {
    let mut vars = VarStore::from_process_env();
    let makefile = parser::parse_file(&mut vars, &cli.file)?;
    if makefile.is_empty() {
        return Err(RunnerError::NoRules {
            path: cli.file.clone(),
        });
    }

    let target = match &cli.target {
        Some(target) => target.clone(),
        None => {
            // A non-empty makefile always has a first target.
            let default = makefile.default_target().unwrap_or_default().to_owned();
            debug!("no target specified, using default target '{default}'");
            default
        }
    };

    Engine::new(&makefile, &vars).build(&target)?;
    debug!("build finished successfully");
    Ok(())
}
