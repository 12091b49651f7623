// GUI Controller - Bridges Slint UI with Rust State Management
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (application state)
// - Runner (find/replace over the resolved files)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Setting up UI callbacks → runs on tokio's blocking pool
// - Subscribing to state changes → UI updates
// - Directory and file chooser dialogs
// - Persisting the chosen target

use crate::config::ConfigManager;
use crate::models::{AppState, LogLine, RunMode};
use crate::services::{
    FileKind, RunError, RunEvent, Runner, Severity, TargetError, join_file_list, prepare,
};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use slint::{ComponentHandle, Model, ModelRc, SharedString, VecModel};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

// Include the generated Slint code
slint::include_modules!();

/// Everything a Slint callback needs to start or stop a run.
#[derive(Clone)]
struct Shared {
    bridge: EventLoopBridgeHandle<MainWindow>,
    state: Arc<StateManager>,
    config: Arc<ConfigManager>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

/// GUI Controller that wires up the Slint UI with application state and logic
///
/// # Example
/// ```ignore
/// let state_manager = Arc::new(StateManager::new());
/// let config_manager = Arc::new(ConfigManager::beside_executable()?);
/// let runtime = tokio::runtime::Runtime::new()?;
///
/// let controller = GuiController::new(state_manager, config_manager, runtime.handle().clone())?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,
    _bridge: EventLoopBridge<MainWindow>,
}

impl GuiController {
    pub fn new(
        state_manager: Arc<StateManager>,
        config_manager: Arc<ConfigManager>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;
        let bridge = EventLoopBridge::new(&ui, tokio_handle);
        // `true` stops the active run before its next file
        let (cancel_tx, _) = watch::channel(false);

        Self::sync_ui_with_state(&ui, &state_manager.snapshot());

        let shared = Shared {
            bridge: bridge.clone_handle(),
            state: Arc::clone(&state_manager),
            config: config_manager,
            cancel_tx: Arc::new(cancel_tx),
        };
        Self::setup_callbacks(&ui, shared);
        Self::setup_state_subscription(&bridge, &state_manager);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Push the whole state into the window.
    ///
    /// Used once at startup and again whenever the subscription lagged.
    fn sync_ui_with_state(ui: &MainWindow, state: &AppState) {
        ui.set_target_path(state.target.as_str().into());
        ui.set_find_text(state.find_text.as_str().into());
        ui.set_replace_text(state.replace_text.as_str().into());
        ui.set_use_regex(state.use_regex);
        ui.set_is_running(state.is_running);
        ui.set_progress(state.progress_fraction());

        let status = if state.is_running {
            state.progress_message()
        } else {
            state
                .last_summary
                .clone()
                .unwrap_or_else(|| "Ready".to_string())
        };
        ui.set_status_message(status.into());

        let rows: Vec<LogRow> = state.log.iter().map(log_row).collect();
        ui.set_log_rows(ModelRc::new(VecModel::from(rows)));

        tracing::debug!("UI synchronized with state");
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(ui: &MainWindow, shared: Shared) {
        let ctx = shared.clone();
        ui.on_choose_directory(move || {
            tracing::debug!("Choose directory clicked");
            let start = ctx.state.read(|s| dialog_start_dir(&s.target));

            let mut dialog = rfd::FileDialog::new().set_title("Choose a folder");
            if let Some(dir) = start {
                dialog = dialog.set_directory(dir);
            }

            if let Some(dir) = dialog.pick_folder().and_then(to_utf8) {
                Self::select_target(&ctx, dir.to_string());
            }
        });

        let ctx = shared.clone();
        ui.on_choose_files(move || {
            tracing::debug!("Choose files clicked");
            let start = ctx.state.read(|s| dialog_start_dir(&s.target));

            let mut dialog = rfd::FileDialog::new()
                .set_title("Choose files")
                .add_filter("Excel and Word files", &FileKind::EXTENSIONS);
            if let Some(dir) = start {
                dialog = dialog.set_directory(dir);
            }

            if let Some(files) = dialog.pick_files() {
                let files: Vec<Utf8PathBuf> = files.into_iter().filter_map(to_utf8).collect();
                if !files.is_empty() {
                    Self::select_target(&ctx, join_file_list(&files));
                }
            }
        });

        let state = Arc::clone(&shared.state);
        ui.on_target_edited(move |text| {
            state.set_target(text.as_str());
        });

        let state = Arc::clone(&shared.state);
        let ui_weak = ui.as_weak();
        ui.on_inputs_edited(move || {
            if let Some(ui) = ui_weak.upgrade() {
                state.set_inputs(
                    ui.get_find_text().as_str(),
                    ui.get_replace_text().as_str(),
                    ui.get_use_regex(),
                );
            }
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_preview(move || {
            tracing::info!("Preview clicked");
            Self::start_run(&ctx, &ui_weak, RunMode::Preview);
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_replace(move || {
            tracing::info!("Replace clicked");
            Self::start_run(&ctx, &ui_weak, RunMode::Replace);
        });

        let cancel_tx = Arc::clone(&shared.cancel_tx);
        let ui_weak = ui.as_weak();
        ui.on_stop(move || {
            tracing::info!("Stop clicked - the run ends after the current file");
            cancel_tx.send_replace(true);
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_status_message("Stopping after the current file...".into());
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_message_dialog_dismissed(move || {
            tracing::debug!("Message dialog dismissed");
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_message_dialog(false);
            }
        });

        let state = Arc::clone(&shared.state);
        let cancel_tx = Arc::clone(&shared.cancel_tx);
        ui.window().on_close_requested(move || {
            if state.read(|s| s.is_running) {
                tracing::info!("Close requested during a run - requesting cancellation");
                cancel_tx.send_replace(true);
            } else {
                tracing::info!("Close requested - allowing window to close");
            }
            slint::CloseRequestResponse::HideWindow
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Store a chosen target and persist it right away.
    fn select_target(ctx: &Shared, target: String) {
        tracing::info!("Target selected: {}", target);
        if let Err(e) = ctx.config.save_last_target(&target) {
            tracing::error!("Failed to persist target: {:#}", e);
        }
        ctx.state.set_target(target);
    }

    /// Validate the current inputs and hand the run to a blocking worker.
    ///
    /// Called on the Slint thread. Validation problems are shown as a dialog
    /// and nothing is opened.
    fn start_run(ctx: &Shared, ui_weak: &slint::Weak<MainWindow>, mode: RunMode) {
        if ctx.state.read(|s| s.is_running) {
            tracing::warn!("A run is already active - ignoring {}", mode);
            return;
        }

        // The widgets are authoritative at the moment the button is pressed.
        if let Some(ui) = ui_weak.upgrade() {
            ctx.state.set_target(ui.get_target_path().as_str());
            ctx.state.set_inputs(
                ui.get_find_text().as_str(),
                ui.get_replace_text().as_str(),
                ui.get_use_regex(),
            );
        }

        let request = ctx.state.read(|s| s.request(mode));
        let prepared = match prepare(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!("Run not started: {}", e);
                let (kind, title) = dialog_for(&e);
                if let Some(ui) = ui_weak.upgrade() {
                    Self::show_message_dialog(&ui, kind, title, e.to_string());
                }
                return;
            }
        };

        if let Err(e) = ctx.config.save_last_target(&request.target) {
            tracing::error!("Failed to persist target: {:#}", e);
        }

        ctx.cancel_tx.send_replace(false);
        let cancel_rx = ctx.cancel_tx.subscribe();
        ctx.state.start_run(mode, prepared.targets.len());

        let state = Arc::clone(&ctx.state);
        let bridge = ctx.bridge.clone();
        ctx.bridge.spawn_async(move || async move {
            let worker_state = Arc::clone(&state);
            let outcome = tokio::task::spawn_blocking(move || {
                Runner::new().run(
                    &prepared,
                    &mut |event: RunEvent| {
                        worker_state.record_event(&event);
                    },
                    &|| *cancel_rx.borrow(),
                )
            })
            .await;

            match outcome {
                Ok(summary) => {
                    state.finish_run(&summary);
                    if summary.mode == RunMode::Replace && !summary.cancelled {
                        let text = summary.describe();
                        Self::post_dialog(&bridge, "info", "Replace complete", text);
                    }
                }
                Err(e) => {
                    tracing::error!("Run worker failed: {}", e);
                    state.update(|s| {
                        s.is_running = false;
                        s.current_file = None;
                        s.last_summary = Some(format!("Run aborted: {}", e));
                    });
                    Self::post_dialog(&bridge, "error", "Run aborted", e.to_string());
                }
            }
        });
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// A dedicated thread receives [`StateChange`] events and forwards them to
    /// the Slint loop. Log lines use the blocking queue so none are dropped.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state_manager_clone = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        Self::apply_change(&bridge_handle, &state_manager_clone, change);
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!(
                            "State broadcast channel closed - shutting down subscription thread"
                        );
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "State subscription lagged - {} events skipped, resynchronising",
                            skipped
                        );
                        // Updates broadcast while holding the write lock, so resubscribing
                        // under the read lock neither loses nor repeats an event.
                        let snapshot = state_manager_clone.read(|state| {
                            rx = rx.resubscribe();
                            state.clone()
                        });
                        bridge_handle.update_ui_blocking(move |ui| {
                            Self::sync_ui_with_state(ui, &snapshot);
                        });
                    }
                }
            }

            tracing::debug!("State subscription thread terminated gracefully");
        });
    }

    fn apply_change(
        bridge: &EventLoopBridgeHandle<MainWindow>,
        state: &StateManager,
        change: StateChange,
    ) {
        match change {
            StateChange::TargetChanged { target } => {
                bridge.update_ui_blocking(move |ui| {
                    // Typing in the field also lands here; leave the cursor alone then.
                    if ui.get_target_path() != target.as_str() {
                        ui.set_target_path(target.into());
                    }
                });
            }

            StateChange::InputsChanged => {}

            StateChange::RunStarted { mode, total_files } => {
                tracing::info!("{} started: {} file(s)", mode, total_files);
                bridge.update_ui_blocking(move |ui| {
                    ui.set_is_running(true);
                    ui.set_progress(0.0);
                    ui.set_status_message(format!("Starting {} of {} file(s)...", mode, total_files).into());
                });
            }

            StateChange::ProgressUpdated { current, total, .. } => {
                let message = state.read(|s| s.progress_message());
                let fraction = if total == 0 {
                    0.0
                } else {
                    current as f32 / total as f32
                };
                bridge.update_ui(move |ui| {
                    if ui.get_is_running() {
                        ui.set_progress(fraction);
                        ui.set_status_message(message.into());
                    }
                });
            }

            StateChange::LogCleared => {
                bridge.update_ui_blocking(|ui| {
                    with_log_model(ui, |model| model.set_vec(Vec::new()));
                });
            }

            StateChange::LogAppended { lines } => {
                let rows: Vec<LogRow> = lines.iter().map(log_row).collect();
                bridge.update_ui_blocking(move |ui| {
                    with_log_model(ui, |model| {
                        for row in rows {
                            model.push(row);
                        }
                    });
                });
            }

            StateChange::RunFinished {
                mode,
                summary,
                cancelled,
            } => {
                tracing::info!("{} finished (cancelled={}): {}", mode, cancelled, summary);
                bridge.update_ui_blocking(move |ui| {
                    ui.set_is_running(false);
                    if !cancelled {
                        ui.set_progress(1.0);
                    }
                    ui.set_status_message(summary.into());
                });
            }
        }
    }

    /// Show a dialog from a tokio task without going through the lossy update queue.
    fn post_dialog(
        bridge: &EventLoopBridgeHandle<MainWindow>,
        kind: &'static str,
        title: &'static str,
        message: String,
    ) {
        let result = bridge.ui_weak().upgrade_in_event_loop(move |ui| {
            Self::show_message_dialog(&ui, kind, title, message);
        });
        if let Err(e) = result {
            tracing::warn!("Could not show '{}' dialog: {:?}", title, e);
        }
    }

    /// Show the message dialog
    ///
    /// `kind` is "info", "warning" or "error" and only changes the title colour.
    fn show_message_dialog(
        ui: &MainWindow,
        kind: &str,
        title: impl Into<SharedString>,
        message: impl Into<SharedString>,
    ) {
        ui.set_message_kind(kind.into());
        ui.set_message_title(title.into());
        ui.set_message_text(message.into());
        ui.set_show_message_dialog(true);
    }
}

/// Run `f` on the window's log model, replacing the model first if it is not a `VecModel`.
fn with_log_model(ui: &MainWindow, f: impl FnOnce(&VecModel<LogRow>)) {
    let rows = ui.get_log_rows();
    if let Some(model) = rows.as_any().downcast_ref::<VecModel<LogRow>>() {
        f(model);
        return;
    }

    let model = std::rc::Rc::new(VecModel::<LogRow>::default());
    f(&model);
    ui.set_log_rows(ModelRc::from(model));
}

/// Dialog colour and title for a run that could not start.
fn dialog_for(error: &RunError) -> (&'static str, &'static str) {
    let title = match error {
        RunError::Target(TargetError::NoTarget) => "No target selected",
        RunError::Target(TargetError::NoMatchingFiles) => "No matching files",
        RunError::Target(_) => "Cannot read target",
        RunError::EmptyPattern => "Nothing to find",
        RunError::Pattern(_) => "Invalid regular expression",
    };
    let kind = match error.severity() {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    };
    (kind, title)
}

/// Marker shown in place of a line break, since log rows are one line tall.
const LINE_BREAK_MARKER: &str = " \u{21b5} ";

fn log_row(line: &LogLine) -> LogRow {
    let (kind, text, before, after) = match line {
        LogLine::Change {
            location,
            before,
            after,
        } => (
            "change",
            format!("  {}:", location),
            single_line(before),
            single_line(after),
        ),
        LogLine::FileHeader { .. } => ("header", line.to_string(), String::new(), String::new()),
        LogLine::FileFailed { .. } => ("failed", single_line(&line.to_string()), String::new(), String::new()),
        LogLine::Notice(_) => ("notice", line.to_string(), String::new(), String::new()),
    };
    LogRow {
        kind: kind.into(),
        text: text.into(),
        before: before.into(),
        after: after.into(),
    }
}

fn single_line(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace(['\r', '\n'], LINE_BREAK_MARKER)
}

/// Where a chooser dialog should open for the current target.
fn dialog_start_dir(target: &str) -> Option<Utf8PathBuf> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let path = Utf8Path::new(target);
    if path.is_dir() {
        return Some(path.to_path_buf());
    }

    target
        .split(crate::services::targets::FILE_LIST_SEPARATOR)
        .map(str::trim)
        .filter_map(|item| Utf8Path::new(item).parent())
        .find(|parent| parent.is_dir())
        .map(Utf8Path::to_path_buf)
}

fn to_utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::try_from(path)
        .map_err(|e| {
            tracing::error!("Failed to convert path to UTF-8: {}", e);
            e
        })
        .ok()
}
