//! Escape-aware string primitives.
//!
//! The whole dialect shares one escaping rule: a backslash strips the
//! following character of any special meaning, and `\\` yields a literal
//! backslash. This module implements that rule once as a set of small
//! scans over the escape state; the parser, expander, and engine all build
//! on these instead of re-implementing the walk.
//!
//! Callers choose between two treatments of a consumed escape: structural
//! scans keep the backslash in place so later passes can still distinguish
//! escaped from unescaped characters, while [`strip_escapes`] drops it when
//! producing a final literal value.

/// Find the byte index of the first unescaped occurrence of `sep`.
#[must_use]
pub fn find_unescaped(s: &str, sep: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == sep {
            return Some(i);
        }
    }
    None
}

/// Split `s` at the first unescaped occurrence of `sep`.
///
/// The separator itself is dropped. Returns `None` when `sep` never occurs
/// unescaped, leaving the caller with the whole string.
///
/// ```
/// use mk_lite::scan::split_unescaped;
///
/// assert_eq!(split_unescaped("a:b:c", ':'), Some(("a", "b:c")));
/// assert_eq!(split_unescaped(r"a\:b", ':'), None);
/// ```
#[must_use]
pub fn split_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    find_unescaped(s, sep).map(|i| (&s[..i], &s[i + sep.len_utf8()..]))
}

/// Remove a trailing comment from `line`.
///
/// Everything from the first unescaped `#` to the end of the line is
/// dropped. The second element reports whether the removed comment text
/// itself ended in a backslash, which the parser rejects as an ambiguous
/// line continuation.
#[must_use]
pub fn strip_comment(line: &str) -> (&str, bool) {
    match find_unescaped(line, '#') {
        Some(i) => {
            let comment = &line[i..];
            (&line[..i], comment.trim_end().ends_with('\\'))
        }
        None => (line, false),
    }
}

/// Strip exactly one surrounding pair of matching `'…'` or `"…"` quotes.
#[must_use]
pub fn trim_matched_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Resolve escapes into their literal characters (stripping mode).
///
/// `\X` becomes `X` for any `X`; a lone trailing backslash is kept as-is.
#[must_use]
pub fn strip_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether `s` ends with an unescaped backslash (a line continuation).
#[must_use]
pub fn ends_with_unescaped_backslash(s: &str) -> bool {
    let mut escaped = false;
    let mut trailing = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            trailing = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            trailing = true;
        } else {
            trailing = false;
        }
    }
    trailing
}
