//! Application entry point.
//!
//! Parses command-line arguments, wires the diagnostic stream up to
//! `MAKE_LITE_LOG_LEVEL`, and delegates execution to [`runner::run`].

use std::process::ExitCode;

use clap::Parser;
use mk_lite::{cli::Cli, runner};

/// Environment variable that raises the diagnostic level to DEBUG.
const LOG_LEVEL_ENV: &str = "MAKE_LITE_LOG_LEVEL";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if std::env::var(LOG_LEVEL_ENV).is_ok_and(|value| value.eq_ignore_ascii_case("debug"))
    {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match runner::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mk-lite: *** {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
