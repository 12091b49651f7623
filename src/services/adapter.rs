//! Format adapter contract shared by the spreadsheet and document adapters.

use crate::services::package::PackageError;
use crate::services::substitute::Matcher;
use crate::services::xml::XmlError;
use camino::Utf8Path;
use std::fmt;
use thiserror::Error;

/// Where a changed text unit lives inside its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A worksheet cell, e.g. `Sheet1!A1`.
    Cell { sheet: String, cell: String },
    /// A document paragraph, numbered from 1 in reading order.
    Paragraph(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell { sheet, cell } => {
                if sheet_name_needs_quotes(sheet) {
                    write!(f, "'{}'!{}", sheet.replace('\'', "''"), cell)
                } else {
                    write!(f, "{}!{}", sheet, cell)
                }
            }
            Self::Paragraph(index) => write!(f, "Paragraph {}", index),
        }
    }
}

fn sheet_name_needs_quotes(name: &str) -> bool {
    name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// One text unit whose value differs after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub location: Location,
    pub before: String,
    pub after: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.location, self.before, self.after)
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub changes: Vec<Change>,
    /// True when the file was rewritten on disk.
    pub saved: bool,
}

impl FileReport {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("Malformed {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("Malformed {part}: {reason}")]
    Malformed { part: String, reason: String },
}

impl AdapterError {
    pub fn malformed(part: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            part: part.to_string(),
            reason: reason.into(),
        }
    }

    pub fn xml(part: &str) -> impl Fn(XmlError) -> Self + '_ {
        move |source| Self::Xml {
            part: part.to_string(),
            source,
        }
    }
}

/// Opens one file format, applies a [`Matcher`] to every text unit and
/// optionally writes the result back in place.
///
/// Implementations must not touch the file when `commit` is false.
#[cfg_attr(test, mockall::automock)]
pub trait FormatAdapter: Send + Sync {
    fn process(
        &self,
        path: &Utf8Path,
        matcher: &crate::services::substitute::Matcher,
        commit: bool,
    ) -> Result<FileReport, AdapterError>;
}
