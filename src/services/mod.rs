//! Services module - find/replace over Office Open XML files.
//!
//! Nothing here depends on the UI layer. The layers, bottom up:
//!
//! - [`xml`]: an owned element tree over quick-xml events that writes back what it read
//! - [`package`]: a zip container of parts with relationship lookup and safe save
//! - [`substitute`]: literal or regex substitution of one text unit ([`Matcher`])
//! - [`targets`]: turns the target field into an ordered list of files ([`resolve_targets`])
//! - [`xlsx`] / [`docx`]: the [`FormatAdapter`] for each supported file kind
//! - [`runner`]: validates a request and drives the adapters file by file ([`Runner`])
//!
//! Every file operation is synchronous. The UI runs them on tokio's blocking pool.

pub mod adapter;
pub mod docx;
pub mod package;
pub mod runner;
pub mod substitute;
pub mod targets;
pub mod xlsx;
pub mod xml;

pub use adapter::{AdapterError, Change, FileReport, FormatAdapter, Location};
pub use docx::DocumentAdapter;
pub use package::{Package, PackageError};
pub use runner::{PreparedRun, RunError, RunEvent, RunSummary, Runner, Severity, prepare};
pub use substitute::{Matcher, SubstituteError, Substitution, substitute};
pub use targets::{FileKind, TargetError, TargetSet, join_file_list, resolve_targets};
pub use xlsx::SpreadsheetAdapter;
