//! Substitution engine - literal or regex replace-all over a single string.
//!
//! The adapters never call the regex crate directly. A [`Matcher`] is built once per
//! run from the user's find/replace inputs and applied to every text unit, so an
//! invalid pattern is rejected before any file is opened.

use regex::Regex;
use std::borrow::Cow;
use thiserror::Error;

/// Errors produced while preparing a substitution
#[derive(Error, Debug)]
pub enum SubstituteError {
    #[error("Invalid regular expression: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Outcome of applying a [`Matcher`] to one text unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub text: String,
    pub changed: bool,
}

#[derive(Debug, Clone)]
enum Mode {
    Literal(String),
    Regex(Regex),
}

/// Compiled find/replace pair.
///
/// Literal mode performs greedy, non-overlapping, left-to-right substring
/// replacement; an empty pattern matches nowhere. Regex mode replaces every
/// match and expands `$1` / `${name}` references in the replacement.
#[derive(Debug, Clone)]
pub struct Matcher {
    mode: Mode,
    replacement: String,
}

impl Matcher {
    pub fn new(pattern: &str, replacement: &str, use_regex: bool) -> Result<Self, SubstituteError> {
        let mode = if use_regex {
            Mode::Regex(Regex::new(pattern)?)
        } else {
            Mode::Literal(pattern.to_string())
        };

        Ok(Self {
            mode,
            replacement: replacement.to_string(),
        })
    }

    pub fn is_regex(&self) -> bool {
        matches!(self.mode, Mode::Regex(_))
    }

    /// Apply the substitution to `text`.
    pub fn apply(&self, text: &str) -> Substitution {
        let replaced: Cow<'_, str> = match &self.mode {
            Mode::Literal(pattern) if pattern.is_empty() => Cow::Borrowed(text),
            Mode::Literal(pattern) => {
                if text.contains(pattern.as_str()) {
                    Cow::Owned(text.replace(pattern.as_str(), &self.replacement))
                } else {
                    Cow::Borrowed(text)
                }
            }
            Mode::Regex(re) => re.replace_all(text, self.replacement.as_str()),
        };

        let changed = replaced != text;
        Substitution {
            text: replaced.into_owned(),
            changed,
        }
    }
}

/// One-shot form of [`Matcher::apply`].
///
/// Returns the new text and whether it differs from the input.
pub fn substitute(
    text: &str,
    pattern: &str,
    replacement: &str,
    use_regex: bool,
) -> Result<(String, bool), SubstituteError> {
    let result = Matcher::new(pattern, replacement, use_regex)?.apply(text);
    Ok((result.text, result.changed))
}
