//! Command line interface definition using clap.
//!
//! This module is also included by the build script to generate the
//! manual page, so it must stay self-contained.

use camino::Utf8PathBuf;
use clap::Parser;

/// Root file read when `--file` is not given.
pub const DEFAULT_MAKEFILE: &str = "Makefile.mk-lite";

/// A simple, predictable build tool inspired by Make.
#[derive(Debug, Parser)]
#[command(name = "mk-lite", version, about, disable_version_flag = true)]
pub struct Cli {
    /// Path to the makefile to read.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MAKEFILE)]
    pub file: Utf8PathBuf,

    /// Target to build; defaults to the first rule's first target.
    pub target: Option<String>,

    /// Print version information.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}
