//! Target resolution - expands the user's target string into candidate files.
//!
//! A target is either a directory (walked recursively) or a `;`-separated list of
//! file paths (taken as-is, no recursion). Only `.xlsx` and `.docx` files survive.
//!
//! # Examples
//!
//! ```ignore
//! use batch_replace::services::targets::resolve_targets;
//!
//! let set = resolve_targets("C:/Reports")?;
//! for file in set.files() {
//!     println!("{}", set.display_path(file));
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;
use walkdir::WalkDir;

/// Separator used when several files are chosen at once.
pub const FILE_LIST_SEPARATOR: &str = ";";

/// Supported file formats, keyed by lowercase extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Spreadsheet,
    Document,
}

impl FileKind {
    /// Every extension the resolver accepts, lowercase and without the dot.
    /// Also the file chooser's filter.
    pub const EXTENSIONS: [&'static str; 2] = ["xlsx", "docx"];

    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()?.to_lowercase().as_str() {
            "xlsx" => Some(Self::Spreadsheet),
            "docx" => Some(Self::Document),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spreadsheet => write!(f, "spreadsheet"),
            Self::Document => write!(f, "document"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("No directory or file selected")]
    NoTarget,

    #[error("No .xlsx/.docx files found")]
    NoMatchingFiles,

    #[error("Current directory is unavailable: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

/// Ordered candidate files plus the directory used for display-relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    base: Utf8PathBuf,
    files: Vec<Utf8PathBuf>,
}

impl TargetSet {
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path shown in the log: relative to the base when possible.
    pub fn display_path(&self, file: &Utf8Path) -> String {
        file.strip_prefix(&self.base)
            .map(|rel| rel.to_string())
            .unwrap_or_else(|_| file.to_string())
    }
}

/// Resolve a target string into the list of files to process.
pub fn resolve_targets(target: &str) -> Result<TargetSet, TargetError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(TargetError::NoTarget);
    }

    let target_path = Utf8Path::new(target);
    let set = if target_path.is_dir() {
        TargetSet {
            base: target_path.to_path_buf(),
            files: walk_directory(target_path),
        }
    } else {
        let cwd = std::env::current_dir().map_err(TargetError::CurrentDir)?;
        let base = Utf8PathBuf::try_from(cwd)
            .map_err(|e| TargetError::NonUtf8Path(e.into_path_buf().display().to_string()))?;
        TargetSet {
            base,
            files: split_file_list(target),
        }
    };

    if set.is_empty() {
        tracing::info!("No matching files for target: {}", target);
        return Err(TargetError::NoMatchingFiles);
    }

    tracing::info!("Resolved {} file(s) under {}", set.len(), set.base);
    Ok(set)
}

fn walk_directory(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", dir, e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match Utf8PathBuf::try_from(entry.into_path()) {
            Ok(path) if FileKind::from_path(&path).is_some() => files.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Skipping non UTF-8 path: {}", e.into_path_buf().display());
            }
        }
    }

    files
}

fn split_file_list(list: &str) -> Vec<Utf8PathBuf> {
    list.split(FILE_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(Utf8PathBuf::from)
        .filter(|path| {
            let keep = path.is_file() && FileKind::from_path(path).is_some();
            if !keep {
                tracing::debug!("Ignoring file list entry: {}", path);
            }
            keep
        })
        .collect()
}

/// Join chosen files into the target string stored in the path field.
pub fn join_file_list<I, P>(files: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<Utf8Path>,
{
    files
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(FILE_LIST_SEPARATOR)
}
