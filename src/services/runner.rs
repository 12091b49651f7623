//! Run orchestration shared by Preview and Replace.
//!
//! [`prepare`] validates a [`ReplaceRequest`] and resolves its files before
//! anything is opened. [`Runner::run`] then processes the files one at a time,
//! in resolver order, reporting each outcome through a callback. A failing file
//! is reported and skipped; it never aborts the rest of the run.

use crate::models::{LogLine, ReplaceRequest, RunMode};
use crate::services::adapter::{FileReport, FormatAdapter};
use crate::services::docx::DocumentAdapter;
use crate::services::substitute::{Matcher, SubstituteError};
use crate::services::targets::{FileKind, TargetError, TargetSet, resolve_targets};
use crate::services::xlsx::SpreadsheetAdapter;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reasons a run cannot start. No file has been opened when one of these is returned.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("Nothing to find - enter the text to search for")]
    EmptyPattern,

    #[error(transparent)]
    Pattern(#[from] SubstituteError),
}

/// How the UI should present a [`RunError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl RunError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Target(TargetError::NoMatchingFiles) => Severity::Info,
            Self::Target(TargetError::NoTarget) | Self::EmptyPattern => Severity::Warning,
            Self::Target(_) | Self::Pattern(_) => Severity::Error,
        }
    }
}

/// A validated run: compiled matcher plus the files to visit.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub request: ReplaceRequest,
    pub matcher: Matcher,
    pub targets: TargetSet,
}

/// Validate inputs in the order the user sees problems: target, find text, pattern, files.
pub fn prepare(request: &ReplaceRequest) -> Result<PreparedRun, RunError> {
    if request.target.trim().is_empty() {
        return Err(TargetError::NoTarget.into());
    }
    if request.find.is_empty() {
        return Err(RunError::EmptyPattern);
    }

    let matcher = Matcher::new(&request.find, &request.replace, request.use_regex)?;
    let targets = resolve_targets(&request.target)?;

    Ok(PreparedRun {
        request: request.clone(),
        matcher,
        targets,
    })
}

/// Progress and outcome notifications emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    FileStarted {
        index: usize,
        total: usize,
        path: String,
    },
    FileChanged {
        path: String,
        report: FileReport,
    },
    FileUnchanged {
        path: String,
    },
    FileFailed {
        path: String,
        error: String,
    },
}

impl RunEvent {
    /// Lines this event contributes to the window log.
    pub fn log_lines(&self) -> Vec<LogLine> {
        match self {
            Self::FileChanged { path, report } => {
                let mut lines = Vec::with_capacity(report.changes.len() + 1);
                lines.push(LogLine::header(path.clone()));
                lines.extend(report.changes.iter().cloned().map(LogLine::from));
                lines
            }
            Self::FileFailed { path, error } => vec![LogLine::FileFailed {
                path: path.clone(),
                error: error.clone(),
            }],
            Self::FileStarted { .. } | Self::FileUnchanged { .. } => Vec::new(),
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: RunMode,
    pub files_total: usize,
    pub files_processed: usize,
    pub files_changed: usize,
    pub files_failed: usize,
    pub changes: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(mode: RunMode, files_total: usize) -> Self {
        Self {
            mode,
            files_total,
            files_processed: 0,
            files_changed: 0,
            files_failed: 0,
            changes: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    /// One-line summary for the status bar and completion notice.
    pub fn describe(&self) -> String {
        let verb = match self.mode {
            RunMode::Preview => "would change",
            RunMode::Replace => "changed",
        };
        let mut text = format!(
            "{} of {} file(s) {} ({} text unit(s))",
            self.files_changed, self.files_processed, verb, self.changes
        );
        if self.files_failed > 0 {
            text.push_str(&format!(", {} failed", self.files_failed));
        }
        if self.cancelled {
            text.push_str(&format!(
                ", stopped after {} of {}",
                self.files_processed, self.files_total
            ));
        }
        text
    }
}

/// Sequential per-file driver over the two format adapters.
pub struct Runner {
    spreadsheet: Box<dyn FormatAdapter>,
    document: Box<dyn FormatAdapter>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::with_adapters(Box::new(SpreadsheetAdapter::new()), Box::new(DocumentAdapter::new()))
    }

    pub fn with_adapters(
        spreadsheet: Box<dyn FormatAdapter>,
        document: Box<dyn FormatAdapter>,
    ) -> Self {
        Self {
            spreadsheet,
            document,
        }
    }

    fn adapter_for(&self, kind: FileKind) -> &dyn FormatAdapter {
        match kind {
            FileKind::Spreadsheet => self.spreadsheet.as_ref(),
            FileKind::Document => self.document.as_ref(),
        }
    }

    /// Process every file of a prepared run.
    ///
    /// `should_stop` is polled before each file; once it returns true the run
    /// ends with `cancelled` set and the remaining files untouched.
    pub fn run(
        &self,
        prepared: &PreparedRun,
        on_event: &mut dyn FnMut(RunEvent),
        should_stop: &dyn Fn() -> bool,
    ) -> RunSummary {
        let started = Instant::now();
        let mode = prepared.request.mode;
        let commit = mode.commits();
        let total = prepared.targets.len();
        let mut summary = RunSummary::new(mode, total);

        tracing::info!(
            "Starting {} of {} file(s): find={:?} regex={}",
            mode,
            total,
            prepared.request.find,
            prepared.request.use_regex
        );

        for (index, file) in prepared.targets.files().iter().enumerate() {
            if should_stop() {
                tracing::warn!("Run cancelled before {}", file);
                summary.cancelled = true;
                break;
            }

            let path = prepared.targets.display_path(file);
            on_event(RunEvent::FileStarted {
                index: index + 1,
                total,
                path: path.clone(),
            });

            let Some(kind) = FileKind::from_path(file) else {
                continue;
            };

            let outcome = self
                .adapter_for(kind)
                .process(file, &prepared.matcher, commit);
            summary.files_processed += 1;

            match outcome {
                Ok(report) if report.changed() => {
                    tracing::info!("{}: {} change(s), saved={}", file, report.changes.len(), report.saved);
                    summary.files_changed += 1;
                    summary.changes += report.changes.len();
                    on_event(RunEvent::FileChanged { path, report });
                }
                Ok(_) => {
                    tracing::debug!("{}: no matches", file);
                    on_event(RunEvent::FileUnchanged { path });
                }
                Err(e) => {
                    tracing::error!("Failed to process {} as {}: {}", file, kind, e);
                    summary.files_failed += 1;
                    on_event(RunEvent::FileFailed {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!("Run finished in {:?}: {}", summary.elapsed, summary.describe());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::adapter::{AdapterError, Change, Location, MockFormatAdapter};
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn request(target: &str, find: &str, use_regex: bool, mode: RunMode) -> ReplaceRequest {
        ReplaceRequest {
            target: target.to_string(),
            find: find.to_string(),
            replace: "x".to_string(),
            use_regex,
            mode,
        }
    }

    fn touch_files(dir: &TempDir, names: &[&str]) -> Utf8PathBuf {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for name in names {
            fs::write(root.join(name), b"placeholder").unwrap();
        }
        root
    }

    fn change(n: usize) -> Change {
        Change {
            location: Location::Paragraph(n),
            before: "a".to_string(),
            after: "x".to_string(),
        }
    }

    #[test]
    fn test_prepare_rejects_missing_target() {
        let err = prepare(&request("  ", "a", false, RunMode::Preview)).unwrap_err();
        assert!(matches!(err, RunError::Target(TargetError::NoTarget)));
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn test_prepare_rejects_empty_find() {
        let err = prepare(&request("/tmp", "", false, RunMode::Preview)).unwrap_err();
        assert!(matches!(err, RunError::EmptyPattern));
    }

    #[test]
    fn test_prepare_rejects_invalid_regex_before_resolving() {
        let err = prepare(&request("/definitely/not/here.xlsx", "([", true, RunMode::Replace))
            .unwrap_err();
        assert!(matches!(err, RunError::Pattern(_)));
        assert_eq!(err.severity(), Severity::Error);
    }

    #[test]
    fn test_prepare_reports_no_matching_files() {
        let dir = TempDir::new().unwrap();
        let root = touch_files(&dir, &["notes.txt"]);

        let err = prepare(&request(root.as_str(), "a", false, RunMode::Preview)).unwrap_err();
        assert!(matches!(err, RunError::Target(TargetError::NoMatchingFiles)));
        assert_eq!(err.severity(), Severity::Info);
    }

    #[test]
    fn test_run_dispatches_by_kind_and_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let root = touch_files(&dir, &["a.xlsx", "b.docx", "c.docx"]);
        let prepared = prepare(&request(root.as_str(), "a", false, RunMode::Replace)).unwrap();

        let mut spreadsheet = MockFormatAdapter::new();
        spreadsheet
            .expect_process()
            .withf(|path, _, commit| path.as_str().ends_with("a.xlsx") && *commit)
            .times(1)
            .returning(|_, _, _| Err(AdapterError::malformed("xl/workbook.xml", "broken")));

        let mut document = MockFormatAdapter::new();
        document
            .expect_process()
            .withf(|path, _, _| path.as_str().ends_with("b.docx"))
            .times(1)
            .returning(|_, _, _| {
                Ok(FileReport {
                    changes: vec![change(1), change(2)],
                    saved: true,
                })
            });
        document
            .expect_process()
            .withf(|path, _, _| path.as_str().ends_with("c.docx"))
            .times(1)
            .returning(|_, _, _| Ok(FileReport::default()));

        let runner = Runner::with_adapters(Box::new(spreadsheet), Box::new(document));
        let mut events = Vec::new();
        let summary = runner.run(&prepared, &mut |e: RunEvent| events.push(e), &|| false);

        assert_eq!(summary.files_total, 3);
        assert_eq!(summary.files_processed, 3);
        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.changes, 2);
        assert!(!summary.cancelled);

        let lines: Vec<LogLine> = events.iter().flat_map(RunEvent::log_lines).collect();
        assert_eq!(lines.len(), 4);
        assert!(matches!(&lines[0], LogLine::FileFailed { path, .. } if path == "a.xlsx"));
        assert_eq!(lines[1], LogLine::header("b.docx"));
        assert!(matches!(lines[2], LogLine::Change { .. }));
        assert!(matches!(lines[3], LogLine::Change { .. }));
    }

    #[test]
    fn test_preview_passes_commit_false() {
        let dir = TempDir::new().unwrap();
        let root = touch_files(&dir, &["a.xlsx"]);
        let prepared = prepare(&request(root.as_str(), "a", false, RunMode::Preview)).unwrap();

        let mut spreadsheet = MockFormatAdapter::new();
        spreadsheet
            .expect_process()
            .withf(|_, _, commit| !*commit)
            .times(1)
            .returning(|_, _, _| Ok(FileReport::default()));

        let runner = Runner::with_adapters(Box::new(spreadsheet), Box::new(MockFormatAdapter::new()));
        let summary = runner.run(&prepared, &mut |_: RunEvent| {}, &|| false);
        assert_eq!(summary.mode, RunMode::Preview);
        assert_eq!(summary.files_changed, 0);
    }

    #[test]
    fn test_stop_request_ends_run_between_files() {
        let dir = TempDir::new().unwrap();
        let root = touch_files(&dir, &["a.docx", "b.docx", "c.docx"]);
        let prepared = prepare(&request(root.as_str(), "a", false, RunMode::Preview)).unwrap();

        let mut document = MockFormatAdapter::new();
        document
            .expect_process()
            .times(1)
            .returning(|_, _, _| Ok(FileReport::default()));

        let runner = Runner::with_adapters(Box::new(MockFormatAdapter::new()), Box::new(document));
        let processed = std::cell::Cell::new(0);
        let summary = runner.run(
            &prepared,
            &mut |e: RunEvent| {
                if matches!(e, RunEvent::FileStarted { .. }) {
                    processed.set(processed.get() + 1);
                }
            },
            &|| processed.get() >= 1,
        );

        assert!(summary.cancelled);
        assert_eq!(summary.files_processed, 1);
        assert!(summary.describe().contains("stopped after 1 of 3"));
    }
}
