//! Batch Replace - find and replace text across `.xlsx` and `.docx` files
//!
//! Main entry point for the GUI application.
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop
//! - **Tokio runtime**: Hosts each run; the per-file work sits on the blocking pool
//! - **State listener**: Background std::thread forwarding state changes to the UI
//!
//! # Execution Flow
//!
//! 1. Initialize logging → `logs/replace_tool.<date>` beside the executable
//! 2. Create tokio runtime
//! 3. Create StateManager and restore the last target from `.replace_tool.yaml`
//! 4. Create GuiController and run the Slint event loop until the window closes
//! 5. Stop any active run and shut the runtime down

use anyhow::Result;
use batch_replace::logging::{LOG_PREFIX, setup_logging_with_console};
use batch_replace::ui::GuiController;
use batch_replace::{APP_NAME, ConfigManager, StateManager, VERSION};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::beside_executable()?);

    // Keep the guard alive until main returns so buffered lines are flushed
    let _log_guard = setup_logging_with_console(
        &config_manager.config_dir().join("logs"),
        LOG_PREFIX,
        false,
        cfg!(debug_assertions),
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("replace-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized");

    let state_manager = Arc::new(StateManager::new());

    let user_config = config_manager.load_user_config()?;
    state_manager.load_from_user_config(&user_config);

    let gui_controller =
        GuiController::new(state_manager.clone(), config_manager, runtime.handle().clone())?;

    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    if state_manager.read(|s| s.is_running) {
        tracing::warn!("Window closed during a run - waiting for the current file to finish");
    }

    // Closing the window cancelled the run; it still finishes the file it is on
    runtime.shutdown_timeout(Duration::from_secs(30));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
