//! Source locations for diagnostics.
//!
//! Every variable assignment and rule remembers where it came from so
//! errors and warnings can point at a `file:line` pair. Values that do not
//! originate from a file (the process environment) use a descriptive label
//! with line zero.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;

/// Origin of a parsed line, assignment, or rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// File the item was read from. Shared because a single file
    /// contributes many locations.
    pub file: Arc<Utf8PathBuf>,
    /// One-based line number; zero for non-file origins.
    pub line: usize,
}

impl Location {
    /// Location of a line within a file.
    #[must_use]
    pub fn new(file: Arc<Utf8PathBuf>, line: usize) -> Self {
        Self { file, line }
    }

    /// Origin label for variables inherited from the process environment.
    #[must_use]
    pub fn shell_environment() -> Self {
        Self {
            file: Arc::new(Utf8PathBuf::from("shell environment")),
            line: 0,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}
