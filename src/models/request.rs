use std::fmt;

/// Whether a run only reports changes or also writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Preview,
    Replace,
}

impl RunMode {
    /// True when files are written back.
    pub fn commits(self) -> bool {
        matches!(self, Self::Replace)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => write!(f, "preview"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// Immutable snapshot of the user's inputs, taken when a run starts.
///
/// Nothing a run does reads the live UI fields; edits made while a run is in
/// progress apply to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRequest {
    pub target: String,
    pub find: String,
    pub replace: String,
    pub use_regex: bool,
    pub mode: RunMode,
}

impl ReplaceRequest {
    pub fn commit(&self) -> bool {
        self.mode.commits()
    }
}
