use crate::services::adapter::{Change, Location};
use std::fmt;

/// One line of the run log shown in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// `## path` - a file with at least one change follows.
    FileHeader { path: String },
    /// A changed text unit.
    Change {
        location: Location,
        before: String,
        after: String,
    },
    /// A file that could not be processed.
    FileFailed { path: String, error: String },
    /// Informational line, e.g. a cancelled run.
    Notice(String),
}

impl LogLine {
    pub fn header(path: impl Into<String>) -> Self {
        Self::FileHeader { path: path.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice(text.into())
    }
}

impl From<Change> for LogLine {
    fn from(change: Change) -> Self {
        Self::Change {
            location: change.location,
            before: change.before,
            after: change.after,
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileHeader { path } => write!(f, "## {}", path),
            Self::Change {
                location,
                before,
                after,
            } => write!(f, "  {}: {} -> {}", location, before, after),
            Self::FileFailed { path, error } => write!(f, "!! {}: {}", path, error),
            Self::Notice(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_display() {
        assert_eq!(LogLine::header("sub/a.xlsx").to_string(), "## sub/a.xlsx");

        let line = LogLine::from(Change {
            location: Location::Cell {
                sheet: "Sheet1".to_string(),
                cell: "A1".to_string(),
            },
            before: "Hello World".to_string(),
            after: "Hello Earth".to_string(),
        });
        assert_eq!(line.to_string(), "  Sheet1!A1: Hello World -> Hello Earth");

        let line = LogLine::FileFailed {
            path: "b.docx".to_string(),
            error: "Not a valid Office package".to_string(),
        };
        assert_eq!(line.to_string(), "!! b.docx: Not a valid Office package");
    }
}
