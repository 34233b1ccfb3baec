//! Recursive macro expansion.
//!
//! Expansion turns a raw string into its fully materialised form in a
//! single left-to-right scan: `$$` becomes a literal dollar, `$(BODY)` is
//! recursively expanded and then dispatched (shell command, variable
//! lookup, or implicit shell command), and `$NAME` substitutes the stored
//! value of the longest alphanumeric run. Everything else passes through.
//!
//! Because assignment is eager, stored values never contain macro syntax
//! and substitution never re-expands a value. The circular-reference
//! guard exists to uphold that invariant defensively; the recursion
//! bound is what actually stops pathological `$(…)` nesting.

use std::collections::HashSet;

use thiserror::Error;

use crate::shell::{self, ShellError};
use crate::vars::VarStore;

/// Upper bound on `$(…)` nesting before expansion gives up.
pub const MAX_DEPTH: usize = 1024;

/// GNU Make functions the dialect deliberately rejects.
const UNSUPPORTED_FUNCTIONS: [&str; 29] = [
    "subst",
    "patsubst",
    "strip",
    "findstring",
    "filter",
    "filter-out",
    "sort",
    "word",
    "words",
    "wordlist",
    "firstword",
    "lastword",
    "dir",
    "notdir",
    "suffix",
    "basename",
    "addsuffix",
    "addprefix",
    "join",
    "foreach",
    "if",
    "or",
    "and",
    "call",
    "origin",
    "value",
    "info",
    "warning",
    "error",
];

/// How a consumed escape sequence appears in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    /// Drop the backslash, emitting the escaped character literally.
    Strip,
    /// Keep the backslash so a later structural scan can still tell
    /// escaped from unescaped characters.
    Preserve,
}

/// Errors raised during expansion.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// A `$(` without a balanced closing parenthesis.
    #[error("unmatched parenthesis in variable expression: {text}")]
    UnmatchedParenthesis {
        /// The offending tail of the input, starting at the `$`.
        text: String,
    },
    /// A variable reference re-entered a name already being expanded.
    #[error("circular variable reference detected for '{name}'")]
    CircularReference {
        /// The re-entered variable name.
        name: String,
    },
    /// A `$(…)` body invoked a GNU Make function the dialect rejects.
    #[error("GNU Make function '$({name} ...)' is not supported.")]
    UnsupportedFunction {
        /// The recognised function name.
        name: String,
    },
    /// `$(…)` nesting exceeded [`MAX_DEPTH`] levels.
    #[error("variable expansion nested more than {MAX_DEPTH} levels deep")]
    TooDeep,
    /// A sub-shell invoked during expansion failed.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Expand `input`, resolving escapes to their literal characters.
///
/// This is the mode for final values: assignment right-hand sides, recipe
/// command lines, and target names from the command line.
///
/// # Errors
///
/// Returns an [`ExpandError`] for unmatched parentheses, unsupported
/// functions, circular references, excessive nesting, or a failing
/// sub-shell.
pub fn expand(vars: &VarStore, input: &str) -> Result<String, ExpandError> {
    let mut visiting = HashSet::new();
    expand_inner(vars, input, EscapeMode::Strip, &mut visiting, 0)
}

/// Expand `input`, keeping backslashes in place.
///
/// Rule headers are expanded this way so an escaped `\:` survives to the
/// structural split; the parser strips escapes from the individual names
/// afterwards.
///
/// # Errors
///
/// Same failure modes as [`expand`].
pub fn expand_preserving(vars: &VarStore, input: &str) -> Result<String, ExpandError> {
    let mut visiting = HashSet::new();
    expand_inner(vars, input, EscapeMode::Preserve, &mut visiting, 0)
}

fn expand_inner(
    vars: &VarStore,
    input: &str,
    mode: EscapeMode,
    visiting: &mut HashSet<String>,
    depth: usize,
) -> Result<String, ExpandError> {
    if depth > MAX_DEPTH {
        return Err(ExpandError::TooDeep);
    }

    let mut out = String::with_capacity(input.len());
    let mut iter = input.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        match c {
            '\\' => match iter.next() {
                Some((_, next)) => {
                    if mode == EscapeMode::Preserve {
                        out.push('\\');
                    }
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '$' => match iter.peek().copied() {
                None => out.push('$'),
                Some((_, '$')) => {
                    iter.next();
                    out.push('$');
                }
                Some((open, '(')) => {
                    iter.next();
                    let mut balance = 1u32;
                    let mut body_end = None;
                    for (j, cj) in iter.by_ref() {
                        match cj {
                            '(' => balance += 1,
                            ')' => {
                                balance -= 1;
                                if balance == 0 {
                                    body_end = Some(j);
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    let Some(end) = body_end else {
                        return Err(ExpandError::UnmatchedParenthesis {
                            text: input[i..].to_owned(),
                        });
                    };
                    let body = &input[open + 1..end];
                    let body = expand_inner(vars, body, EscapeMode::Strip, visiting, depth + 1)?;
                    out.push_str(&resolve_call(vars, &body, visiting)?);
                }
                Some(_) => {
                    let rest = &input[i + 1..];
                    let name_len = rest
                        .bytes()
                        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                        .count();
                    if name_len == 0 {
                        out.push('$');
                        continue;
                    }
                    let name = &rest[..name_len];
                    if visiting.contains(name) {
                        return Err(ExpandError::CircularReference {
                            name: name.to_owned(),
                        });
                    }
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                    }
                    while iter.peek().is_some_and(|(j, _)| *j <= i + name_len) {
                        iter.next();
                    }
                }
            },
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Dispatch a fully expanded `$(…)` body.
fn resolve_call(
    vars: &VarStore,
    body: &str,
    visiting: &mut HashSet<String>,
) -> Result<String, ExpandError> {
    if let Some(function) = body.split_whitespace().next() {
        if UNSUPPORTED_FUNCTIONS.contains(&function) {
            return Err(ExpandError::UnsupportedFunction {
                name: function.to_owned(),
            });
        }
    }

    if let Some(command) = body.strip_prefix("shell ") {
        return Ok(shell::capture(vars, command.trim())?);
    }

    if visiting.contains(body) {
        return Err(ExpandError::CircularReference {
            name: body.to_owned(),
        });
    }
    if let Some(value) = vars.get(body) {
        return Ok(value.to_owned());
    }

    Ok(shell::capture(vars, body)?)
}
