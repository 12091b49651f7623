use crate::models::{LogLine, ReplaceRequest, RunMode};

/// Single source of truth for everything the window shows.
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; go through
/// [`update()`](crate::state::StateManager::update) so subscribers hear about it.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Inputs
    pub target: String,
    pub find_text: String,
    pub replace_text: String,
    pub use_regex: bool,

    // Runtime state
    pub is_running: bool,
    pub run_mode: Option<RunMode>,
    pub current_file: Option<String>,

    // Progress state
    pub progress: usize,
    pub total_files: usize,

    // Results of the current (or last) run
    pub files_changed: usize,
    pub files_failed: usize,
    pub total_changes: usize,
    pub cancelled: bool,
    pub log: Vec<LogLine>,
    pub last_summary: Option<String>,
}

impl AppState {
    /// Snapshot the inputs for a run.
    pub fn request(&self, mode: RunMode) -> ReplaceRequest {
        ReplaceRequest {
            target: self.target.clone(),
            find: self.find_text.clone(),
            replace: self.replace_text.clone(),
            use_regex: self.use_regex,
            mode,
        }
    }

    /// Clear results before a new run. Inputs are left alone.
    pub fn reset_run_state(&mut self) {
        self.is_running = false;
        self.run_mode = None;
        self.current_file = None;
        self.progress = 0;
        self.total_files = 0;
        self.files_changed = 0;
        self.files_failed = 0;
        self.total_changes = 0;
        self.cancelled = false;
        self.log.clear();
        self.last_summary = None;
    }

    /// Fraction of files done, in `0.0..=1.0`.
    pub fn progress_fraction(&self) -> f32 {
        if self.total_files == 0 {
            0.0
        } else {
            self.progress as f32 / self.total_files as f32
        }
    }

    /// Status bar text while a run is active.
    pub fn progress_message(&self) -> String {
        let verb = match self.run_mode {
            Some(RunMode::Replace) => "Replacing",
            _ => "Previewing",
        };
        match &self.current_file {
            Some(file) => format!("{} {}/{}: {}", verb, self.progress, self.total_files, file),
            None => format!("{}...", verb),
        }
    }
}
