// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for GUI updates.

use crate::models::{AppState, LogLine, RunMode, UserConfig};
use crate::services::{RunEvent, RunSummary};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Events buffered per subscriber before it starts lagging.
///
/// A lagging subscriber must resynchronise from [`StateManager::snapshot`].
pub const EVENT_BUFFER: usize = 1024;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the GUI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The target field changed (typed, chosen, or restored from config)
    TargetChanged { target: String },

    /// Find text, replacement text or the regex flag changed
    InputsChanged,

    /// A run has started
    RunStarted { mode: RunMode, total_files: usize },

    /// Progress has been updated during a run
    ProgressUpdated {
        current: usize,
        total: usize,
        current_file: Option<String>,
    },

    /// The log was emptied
    LogCleared,

    /// Lines were added to the end of the log
    LogAppended { lines: Vec<LogLine> },

    /// A run has finished or was stopped
    RunFinished {
        mode: RunMode,
        summary: String,
        cancelled: bool,
    },
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Log lines are delivered to subscribers in the order they were appended.
/// A subscriber that falls more than [`EVENT_BUFFER`] events behind receives
/// `RecvError::Lagged` and should rebuild its view from [`snapshot()`](Self::snapshot).
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// Returns the events that were emitted.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        // The log only ever grows or is cleared, so its length is enough to diff it.
        let log = std::mem::take(&mut state.log);
        let old_state = state.clone();
        let old_log_len = log.len();
        state.log = log;

        update_fn(&mut state);

        let changes = detect_changes(&old_state, old_log_len, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    // Convenience methods for common state updates

    pub fn set_target(&self, target: impl Into<String>) -> Vec<StateChange> {
        let target = target.into();
        self.update(|state| state.target = target)
    }

    pub fn set_inputs(
        &self,
        find_text: impl Into<String>,
        replace_text: impl Into<String>,
        use_regex: bool,
    ) -> Vec<StateChange> {
        let (find_text, replace_text) = (find_text.into(), replace_text.into());
        self.update(|state| {
            state.find_text = find_text;
            state.replace_text = replace_text;
            state.use_regex = use_regex;
        })
    }

    /// Clear the previous results and mark a run as active
    pub fn start_run(&self, mode: RunMode, total_files: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_run_state();
            state.is_running = true;
            state.run_mode = Some(mode);
            state.total_files = total_files;
        })
    }

    /// Fold one runner event into progress, counters and the log
    pub fn record_event(&self, event: &RunEvent) -> Vec<StateChange> {
        self.update(|state| {
            match event {
                RunEvent::FileStarted { index, total, path } => {
                    state.progress = *index;
                    state.total_files = *total;
                    state.current_file = Some(path.clone());
                }
                RunEvent::FileChanged { report, .. } => {
                    state.files_changed += 1;
                    state.total_changes += report.changes.len();
                }
                RunEvent::FileFailed { .. } => state.files_failed += 1,
                RunEvent::FileUnchanged { .. } => {}
            }
            state.log.extend(event.log_lines());
        })
    }

    /// Mark the run as finished and store its summary
    pub fn finish_run(&self, summary: &RunSummary) -> Vec<StateChange> {
        let text = summary.describe();
        self.update(|state| {
            state.is_running = false;
            state.current_file = None;
            state.cancelled = summary.cancelled;
            if summary.cancelled {
                state.log.push(LogLine::notice(format!(
                    "Stopped: {} of {} file(s) were not processed",
                    summary.files_total - summary.files_processed,
                    summary.files_total
                )));
            }
            state.last_summary = Some(text);
        })
    }

    /// Restore persisted settings into the inputs
    pub fn load_from_user_config(&self, user_config: &UserConfig) -> Vec<StateChange> {
        let target = user_config.last_target().to_string();
        tracing::info!("Loaded user config: last_target={:?}", target);
        self.set_target(target)
    }
}

/// Detect what changed between two states and generate events
fn detect_changes(old: &AppState, old_log_len: usize, new: &AppState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.target != new.target {
        changes.push(StateChange::TargetChanged {
            target: new.target.clone(),
        });
    }

    if old.find_text != new.find_text
        || old.replace_text != new.replace_text
        || old.use_regex != new.use_regex
    {
        changes.push(StateChange::InputsChanged);
    }

    if !old.is_running && new.is_running {
        changes.push(StateChange::RunStarted {
            mode: new.run_mode.unwrap_or(RunMode::Preview),
            total_files: new.total_files,
        });
    }

    if old.progress != new.progress
        || old.total_files != new.total_files
        || old.current_file != new.current_file
    {
        changes.push(StateChange::ProgressUpdated {
            current: new.progress,
            total: new.total_files,
            current_file: new.current_file.clone(),
        });
    }

    if new.log.len() < old_log_len {
        changes.push(StateChange::LogCleared);
        if !new.log.is_empty() {
            changes.push(StateChange::LogAppended {
                lines: new.log.clone(),
            });
        }
    } else if new.log.len() > old_log_len {
        changes.push(StateChange::LogAppended {
            lines: new.log[old_log_len..].to_vec(),
        });
    }

    if old.is_running && !new.is_running {
        changes.push(StateChange::RunFinished {
            mode: new.run_mode.unwrap_or(RunMode::Preview),
            summary: new.last_summary.clone().unwrap_or_default(),
            cancelled: new.cancelled,
        });
    }

    changes
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
