//! Two-pass makefile parser.
//!
//! Pass 1 reads files line by line: comments are stripped with escape
//! awareness, `include` directives splice other files in (with cycle
//! detection over an include stack), continuation backslashes join
//! physical lines, variable assignments are eagerly expanded and written
//! to the store, and rule headers are collected raw together with their
//! indented recipe blocks. Pass 2 expands each collected header and splits
//! it into targets and sources.
//!
//! Splitting headers only after expansion is why expansion runs in
//! preserving mode there: an escaped `\:` must still read as escaped when
//! the structural split happens.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::ast::{Makefile, Rule};
use crate::expand::{self, ExpandError};
use crate::location::Location;
use crate::scan;
use crate::vars::{Tier, VarStore};

/// Errors raised while turning files into a [`Makefile`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The root or an included makefile could not be opened or read.
    #[error("could not open makefile {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// A file included itself, directly or through other includes.
    #[error("circular include detected: {path}")]
    CircularInclude {
        /// The path whose inclusion would recurse.
        path: Utf8PathBuf,
    },
    /// Context wrapper for errors inside an included file.
    #[error("error in included file {path} (from {at}): {source}")]
    Include {
        /// The include path as written.
        path: String,
        /// Location of the `include` directive.
        at: Location,
        /// The error raised inside the included file.
        #[source]
        source: Box<ParseError>,
    },
    /// An `include` directive with nothing after it.
    #[error("empty include path at {at}")]
    EmptyIncludePath {
        /// Location of the directive.
        at: Location,
    },
    /// A comment's own text ended in a backslash.
    #[error("ambiguous line continuation in comment at {at}")]
    AmbiguousCommentContinuation {
        /// Location of the comment.
        at: Location,
    },
    /// An indented line with no rule header above it.
    #[error("{at}: unexpected indented line, must follow a rule definition: \"{line}\"")]
    UnexpectedIndent {
        /// Location of the line.
        at: Location,
        /// The offending line, trimmed.
        line: String,
    },
    /// A rule header with a second unescaped colon.
    #[error("{at}: invalid rule with multiple colons: \"{line}\"")]
    MultipleColons {
        /// Location of the header.
        at: Location,
        /// The offending header.
        line: String,
    },
    /// A rule header whose left side expanded to nothing.
    #[error("{at}: rule with no target: \"{line}\"")]
    NoTarget {
        /// Location of the header.
        at: Location,
        /// The offending header.
        line: String,
    },
    /// An assignment with no variable name left of the `=`.
    #[error("{at}: invalid assignment with no variable name: \"{line}\"")]
    NoVariableName {
        /// Location of the assignment.
        at: Location,
        /// The offending line.
        line: String,
    },
    /// A line that is neither rule, assignment, nor directive.
    #[error("{at}: not a rule, assignment, or directive: \"{line}\"")]
    InvalidLine {
        /// Location of the line.
        at: Location,
        /// The offending line, trimmed.
        line: String,
    },
    /// Expansion failed while parsing.
    #[error("{at}: error expanding {what}: {source}")]
    Expand {
        /// Location of the text being expanded.
        at: Location,
        /// What was being expanded (variable value, rule header, …).
        what: &'static str,
        /// The underlying expansion failure.
        #[source]
        source: ExpandError,
    },
    /// A `load_env` file existed but could not be read.
    #[error("could not load env file {path}: {source}")]
    EnvFile {
        /// Path of the unreadable env file.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}

/// One physical-or-joined line with its origin.
#[derive(Debug)]
struct SourceLine {
    text: String,
    at: Location,
}

/// A rule collected in pass 1: header still unexpanded, recipe raw.
#[derive(Debug)]
struct RawRule {
    header: String,
    recipe: Vec<String>,
    at: Location,
}

/// Parse the makefile at `path`, writing variables through `vars`.
///
/// # Errors
///
/// Returns a [`ParseError`] for unreadable files, malformed lines,
/// circular includes, or expansion failures during parsing.
pub fn parse_file(vars: &mut VarStore, path: &Utf8Path) -> Result<Makefile, ParseError> {
    let abs = resolve_absolute(path).map_err(|source| ParseError::Io {
        path: path.to_owned(),
        source,
    })?;
    let mut parser = Parser {
        vars,
        include_stack: Vec::new(),
    };
    let lines = parser.read_lines(&abs)?;
    parser.parse_lines(join_continuations(lines))
}

/// Parse makefile text directly, without touching the filesystem for the
/// root document. `include` and `load_env` paths resolve relative to the
/// current directory.
///
/// # Errors
///
/// Same failure modes as [`parse_file`].
pub fn parse_str(vars: &mut VarStore, content: &str) -> Result<Makefile, ParseError> {
    let mut parser = Parser {
        vars,
        include_stack: Vec::new(),
    };
    let file = Arc::new(Utf8PathBuf::from("<string>"));
    let lines = parser.read_content(&file, content)?;
    parser.parse_lines(join_continuations(lines))
}

struct Parser<'a> {
    vars: &'a mut VarStore,
    include_stack: Vec<Utf8PathBuf>,
}

impl Parser<'_> {
    /// Pass 1 file reader: comment stripping and include splicing.
    fn read_lines(&mut self, abs: &Utf8Path) -> Result<Vec<SourceLine>, ParseError> {
        if self.include_stack.iter().any(|entry| entry == abs) {
            return Err(ParseError::CircularInclude {
                path: abs.to_owned(),
            });
        }

        let content = match fs::read_to_string(abs) {
            Ok(content) => content,
            Err(source) if source.kind() == io::ErrorKind::NotFound
                && abs.as_str().ends_with(".env") =>
            {
                // Missing .env includes are tolerated so a makefile can
                // reference optional local overrides.
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ParseError::Io {
                    path: abs.to_owned(),
                    source,
                });
            }
        };

        self.include_stack.push(abs.to_owned());
        let result = self.read_content(&Arc::new(abs.to_owned()), &content);
        self.include_stack.pop();
        result
    }

    fn read_content(
        &mut self,
        file: &Arc<Utf8PathBuf>,
        content: &str,
    ) -> Result<Vec<SourceLine>, ParseError> {
        let mut out = Vec::new();
        for (index, raw) in content.lines().enumerate() {
            let at = Location::new(Arc::clone(file), index + 1);
            let (line, dangling_comment) = scan::strip_comment(raw);
            if dangling_comment {
                return Err(ParseError::AmbiguousCommentContinuation { at });
            }

            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("include ") {
                let include = scan::trim_matched_quotes(rest.trim());
                if include.is_empty() {
                    return Err(ParseError::EmptyIncludePath { at });
                }
                let resolved = match file.parent() {
                    Some(dir) if !dir.as_str().is_empty() => dir.join(include),
                    _ => Utf8PathBuf::from(include),
                };
                let included =
                    self.read_lines(&resolved)
                        .map_err(|source| ParseError::Include {
                            path: include.to_owned(),
                            at: at.clone(),
                            source: Box::new(source),
                        })?;
                out.extend(included);
            } else {
                out.push(SourceLine {
                    text: line.to_owned(),
                    at,
                });
            }
        }
        Ok(out)
    }

    /// Scan the joined line list: assignments and directives take effect
    /// immediately, rule headers are collected raw, then pass 2 expands
    /// them into the final [`Makefile`].
    fn parse_lines(&mut self, lines: Vec<SourceLine>) -> Result<Makefile, ParseError> {
        let mut raw_rules = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            let trimmed = line.text.trim();
            if trimmed.is_empty() {
                i += 1;
                continue;
            }
            if line.text.starts_with([' ', '\t']) {
                return Err(ParseError::UnexpectedIndent {
                    at: line.at.clone(),
                    line: trimmed.to_owned(),
                });
            }

            let colon = scan::find_unescaped(trimmed, ':');
            let equals = scan::find_unescaped(trimmed, '=');
            match (colon, equals) {
                (Some(c), e) if e.map_or(true, |e| c < e) => {
                    if scan::find_unescaped(&trimmed[c + 1..], ':').is_some() {
                        return Err(ParseError::MultipleColons {
                            at: line.at.clone(),
                            line: trimmed.to_owned(),
                        });
                    }
                    // A recipe is the run of indented lines under the
                    // header. Whitespace-only lines count as indented and
                    // are skipped at execution time; an empty or
                    // non-indented line ends the block.
                    let mut recipe = Vec::new();
                    let mut j = i + 1;
                    while j < lines.len() {
                        let candidate = &lines[j];
                        if candidate.text.is_empty()
                            || !candidate.text.starts_with([' ', '\t'])
                        {
                            break;
                        }
                        recipe.push(candidate.text.clone());
                        j += 1;
                    }
                    raw_rules.push(RawRule {
                        header: trimmed.to_owned(),
                        recipe,
                        at: line.at.clone(),
                    });
                    i = j;
                }
                (_, Some(_)) => {
                    self.assignment(trimmed, &line.at)?;
                    i += 1;
                }
                _ => {
                    if let Some(rest) = trimmed.strip_prefix("load_env ") {
                        let path = scan::trim_matched_quotes(rest.trim());
                        self.load_env_file(Utf8Path::new(path))?;
                    } else {
                        return Err(ParseError::InvalidLine {
                            at: line.at.clone(),
                            line: trimmed.to_owned(),
                        });
                    }
                    i += 1;
                }
            }
        }

        self.expand_headers(raw_rules)
    }

    fn assignment(&mut self, line: &str, at: &Location) -> Result<(), ParseError> {
        let (left, right) = scan::split_unescaped(line, '=')
            .unwrap_or((line, ""));
        let left = left.trim_end();
        let (name_part, tier) = match left.strip_suffix('?') {
            Some(stripped) => (stripped, Tier::MakefileConditional),
            None => (left, Tier::MakefileUnconditional),
        };
        let Some(name) = name_part.split_whitespace().last() else {
            return Err(ParseError::NoVariableName {
                at: at.clone(),
                line: line.to_owned(),
            });
        };

        let value =
            expand::expand(self.vars, right.trim()).map_err(|source| ParseError::Expand {
                at: at.clone(),
                what: "variable value",
                source,
            })?;
        self.vars.set(name, value, tier, at.clone());
        Ok(())
    }

    /// Load `KEY=value` pairs from an env file at tier [`Tier::EnvFile`].
    ///
    /// Missing files are silently ignored; malformed lines are skipped the
    /// way dotenv loaders skip them.
    fn load_env_file(&mut self, path: &Utf8Path) -> Result<(), ParseError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ParseError::EnvFile {
                    path: path.to_owned(),
                    source,
                });
            }
        };

        let file = Arc::new(path.to_owned());
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((left, right)) = line.split_once('=') else {
                continue;
            };
            let Some(key) = left.trim().split_whitespace().last() else {
                continue;
            };
            let value = scan::trim_matched_quotes(right.trim());
            self.vars.set(
                key,
                value.to_owned(),
                Tier::EnvFile,
                Location::new(Arc::clone(&file), index + 1),
            );
        }
        Ok(())
    }

    /// Pass 2: expand rule headers and split them into targets and
    /// sources.
    fn expand_headers(&self, raw_rules: Vec<RawRule>) -> Result<Makefile, ParseError> {
        let mut makefile = Makefile::default();
        for raw in raw_rules {
            let header = expand::expand_preserving(self.vars, &raw.header).map_err(|source| {
                ParseError::Expand {
                    at: raw.at.clone(),
                    what: "rule header",
                    source,
                }
            })?;
            let (left, right) = scan::split_unescaped(&header, ':').unwrap_or((header.as_str(), ""));
            let targets: Vec<String> = left.split_whitespace().map(scan::strip_escapes).collect();
            let sources: Vec<String> = right.split_whitespace().map(scan::strip_escapes).collect();
            if targets.is_empty() {
                return Err(ParseError::NoTarget {
                    at: raw.at,
                    line: raw.header,
                });
            }
            makefile.add_rule(Rule {
                targets,
                sources,
                recipe: raw.recipe,
                origin: raw.at,
            });
        }
        Ok(makefile)
    }
}

/// Resolve a potentially relative makefile path against the working
/// directory, keeping it UTF-8.
fn resolve_absolute(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let base = std::env::current_dir()?;
    Utf8PathBuf::from_path_buf(base.join(path.as_std_path())).map_err(|invalid| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("non-UTF-8 working directory path: {}", invalid.display()),
        )
    })
}

/// Join lines ending in an unescaped backslash with their successors.
///
/// The joined line keeps the origin of its first physical line.
fn join_continuations(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut joined = Vec::new();
    let mut iter = lines.into_iter();
    while let Some(line) = iter.next() {
        let mut text = line.text;
        loop {
            let trimmed = text.trim_end();
            if trimmed.is_empty() || !scan::ends_with_unescaped_backslash(trimmed) {
                break;
            }
            let kept = trimmed.len() - 1;
            text.truncate(kept);
            match iter.next() {
                Some(next) => text.push_str(&next.text),
                None => break,
            }
        }
        joined.push(SourceLine { text, at: line.at });
    }
    joined
}
