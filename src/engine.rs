//! Dependency resolution and recipe execution.
//!
//! The engine walks the dependency graph depth-first from a chosen root
//! target, building sources before their dependents in declared order. A
//! visiting set catches cycles, a built set makes repeat visits
//! idempotent, and multi-target rules run as a single unit: one execution
//! marks every declared target built.
//!
//! A target with no rule must exist as a regular file; a target whose
//! file is missing or is a directory is symbolic (phony) and its recipe
//! runs on every invocation that reaches it.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::ast::{Makefile, Rule};
use crate::expand::{self, ExpandError};
use crate::shell::{self, ShellError};
use crate::vars::VarStore;

/// Errors raised while resolving or building targets.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The dependency walk re-entered a target already on the stack.
    #[error("circular dependency detected: target '{target}' is a dependency of itself")]
    CircularDependency {
        /// The re-entered target name.
        target: String,
    },
    /// No rule builds the target and no file of that name exists.
    #[error("don't know how to make target '{target}'")]
    UnknownTarget {
        /// The unresolvable target name.
        target: String,
    },
    /// A source is neither on disk nor the target of any rule.
    #[error("Dependency '{dep_name}' not found for target '{target}', and no rule available to create it.")]
    MissingDependency {
        /// The missing source name.
        dep_name: String,
        /// First target of the rule that needed it.
        target: String,
    },
    /// A stat call failed for a reason other than absence.
    #[error("failed to stat '{path}': {source}")]
    Stat {
        /// The path being inspected.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// A target's parent directory could not be created.
    #[error("failed to create directory {dir}: {source}")]
    CreateDir {
        /// The directory being created.
        dir: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Expansion of a target name or recipe command failed.
    #[error("error expanding {what} '{text}': {source}")]
    Expand {
        /// What was being expanded.
        what: &'static str,
        /// The text being expanded.
        text: String,
        /// The underlying expansion failure.
        #[source]
        source: ExpandError,
    },
    /// A recipe command exited non-zero.
    #[error("recipe for target '{target}' failed: {source}")]
    RecipeFailed {
        /// First target of the failing rule.
        target: String,
        /// The shell failure.
        #[source]
        source: ShellError,
    },
}

/// Why a rule is considered stale, if it is.
enum Freshness {
    Stale(Option<String>),
    Fresh,
}

/// Single-use build driver over a parsed makefile.
pub struct Engine<'a> {
    makefile: &'a Makefile,
    vars: &'a VarStore,
    built: HashSet<String>,
    visiting: HashSet<String>,
}

impl<'a> Engine<'a> {
    /// Create an engine over `makefile` with the finished variable store.
    #[must_use]
    pub fn new(makefile: &'a Makefile, vars: &'a VarStore) -> Self {
        Self {
            makefile,
            vars,
            built: HashSet::new(),
            visiting: HashSet::new(),
        }
    }

    /// Build `target`, expanding its name first so command-line arguments
    /// may reference variables.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for cycles, unknown targets, missing
    /// dependencies, expansion failures, or failing recipes.
    pub fn build(&mut self, target: &str) -> Result<(), BuildError> {
        let expanded = expand::expand(self.vars, target).map_err(|source| BuildError::Expand {
            what: "target name",
            text: target.to_owned(),
            source,
        })?;
        self.resolve(&expanded)
    }

    fn resolve(&mut self, target: &str) -> Result<(), BuildError> {
        if self.built.contains(target) {
            return Ok(());
        }
        if self.visiting.contains(target) {
            return Err(BuildError::CircularDependency {
                target: target.to_owned(),
            });
        }

        let makefile = self.makefile;
        let Some(rule) = makefile.rule_for(target) else {
            return match stat(target)? {
                Some(meta) if meta.is_file() => {
                    // A rule-less file is a leaf input; nothing to do.
                    self.built.insert(target.to_owned());
                    Ok(())
                }
                _ => Err(BuildError::UnknownTarget {
                    target: target.to_owned(),
                }),
            };
        };

        self.visiting.insert(target.to_owned());
        for source in &rule.sources {
            self.resolve(source)?;
        }

        match self.check_freshness(rule)? {
            Freshness::Stale(reason) => {
                match &reason {
                    Some(reason) => debug!("building target '{target}' because {reason}"),
                    None => debug!("building target '{target}'"),
                }
                self.run_recipe(rule)?;
            }
            Freshness::Fresh => {
                debug!("targets '{}' are up to date", rule.targets.join("', '"));
            }
        }

        for built in &rule.targets {
            self.built.insert(built.clone());
        }
        self.visiting.remove(target);
        Ok(())
    }

    /// Decide whether a rule's recipe must run.
    ///
    /// Missing or directory targets make the rule stale (the latter marks
    /// it symbolic); a rule with no sources whose targets all exist as
    /// files is fresh; otherwise any source newer than the oldest target
    /// makes it stale. A missing source is tolerated only when some rule
    /// declares it as a target, in which case it was already resolved as
    /// phony and carries no timestamp.
    fn check_freshness(&self, rule: &Rule) -> Result<Freshness, BuildError> {
        if rule.targets.is_empty() {
            return Ok(Freshness::Stale(Some("it has no targets".to_owned())));
        }

        let mut oldest: Option<SystemTime> = None;
        for target in &rule.targets {
            let Some(meta) = stat(target)? else {
                return Ok(Freshness::Stale(None));
            };
            if meta.is_dir() {
                return Ok(Freshness::Stale(Some("it is a symbolic target".to_owned())));
            }
            let modified = modified_time(target, &meta)?;
            oldest = Some(oldest.map_or(modified, |current| current.min(modified)));
        }

        if rule.sources.is_empty() {
            return Ok(Freshness::Fresh);
        }
        let Some(oldest) = oldest else {
            return Ok(Freshness::Stale(None));
        };

        for source in &rule.sources {
            let Some(meta) = stat(source)? else {
                if self.makefile.rule_for(source).is_some() {
                    continue;
                }
                return Err(BuildError::MissingDependency {
                    dep_name: source.clone(),
                    target: rule.targets[0].clone(),
                });
            };
            if modified_time(source, &meta)? > oldest {
                return Ok(Freshness::Stale(Some(format!("source '{source}' is newer"))));
            }
        }

        Ok(Freshness::Fresh)
    }

    /// Run every command of `rule`, creating target parent directories
    /// first.
    fn run_recipe(&self, rule: &Rule) -> Result<(), BuildError> {
        for target in &rule.targets {
            if let Some(parent) = Utf8Path::new(target).parent() {
                let dir = parent.as_str();
                if !dir.is_empty() && dir != "." && dir != "/" {
                    fs::create_dir_all(parent).map_err(|source| BuildError::CreateDir {
                        dir: parent.to_owned(),
                        source,
                    })?;
                }
            }
        }

        for line in &rule.recipe {
            if line.trim().is_empty() {
                continue;
            }

            let (command, suppress_echo) = match strip_echo_suppressor(line) {
                Some(stripped) => (stripped, true),
                None => (line.clone(), false),
            };

            let expanded =
                expand::expand(self.vars, &command).map_err(|source| BuildError::Expand {
                    what: "command",
                    text: line.trim().to_owned(),
                    source,
                })?;

            if !suppress_echo {
                println!("{expanded}");
            }

            shell::run_streamed(self.vars, &expanded).map_err(|source| {
                BuildError::RecipeFailed {
                    target: rule.targets[0].clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

/// Remove a leading `@` (after optional whitespace), keeping the
/// indentation; `None` when the line is not suppressed.
fn strip_echo_suppressor(line: &str) -> Option<String> {
    if !line.trim_start().starts_with('@') {
        return None;
    }
    line.find('@')
        .map(|at| format!("{}{}", &line[..at], &line[at + 1..]))
}

/// Stat that treats absence as `None` and any other failure as an error.
fn stat(path: &str) -> Result<Option<fs::Metadata>, BuildError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(BuildError::Stat {
            path: path.to_owned(),
            source,
        }),
    }
}

fn modified_time(path: &str, meta: &fs::Metadata) -> Result<SystemTime, BuildError> {
    meta.modified().map_err(|source| BuildError::Stat {
        path: path.to_owned(),
        source,
    })
}
