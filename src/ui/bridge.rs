// EventLoopBridge - Coordinates between tokio async runtime and Slint event loop
//
// Two event loops run side by side:
// 1. Slint's single-threaded GUI event loop (main thread)
// 2. Tokio's multi-threaded runtime, where runs and their blocking file work live
//
// Updates are queued on a bounded channel and forwarded by a handler thread to
// the Slint loop with `upgrade_in_event_loop`.

use slint::{ComponentHandle, Weak};
use std::future::Future;
use tokio::sync::mpsc;

/// Pending UI updates before `update_ui` starts dropping them.
pub const UI_UPDATE_BUFFER: usize = 100;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Coordinates between tokio async runtime and Slint event loop
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let ui = MainWindow::new()?;
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone());
/// let handle = bridge.clone_handle();
///
/// handle.spawn_async(move || async move {
///     handle.update_ui(|ui| ui.set_status_message("Done".into()));
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create the bridge and start its handler thread.
    ///
    /// The thread exits once every sender is dropped or the event loop is gone.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle) -> Self {
        let ui_weak = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_BUFFER);

        let ui_weak_clone = ui_weak.clone();
        std::thread::spawn(move || {
            tracing::debug!("EventLoopBridge handler thread started");

            while let Some(update_fn) = ui_update_rx.blocking_recv() {
                let result = ui_weak_clone.upgrade_in_event_loop(move |ui| {
                    update_fn(&ui);
                });

                if let Err(e) = result {
                    tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                    break;
                }
            }

            tracing::debug!("EventLoopBridge handler thread terminated");
        });

        Self {
            handle: EventLoopBridgeHandle {
                ui_weak,
                tokio_handle,
                ui_update_tx,
            },
        }
    }

    /// Lightweight handle that can be cloned into Slint callbacks and tokio tasks.
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Cloneable side of [`EventLoopBridge`]
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from any thread, dropping it if the queue is full.
    ///
    /// Use for updates where only the latest value matters, such as progress.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let update: UiUpdate<T> = Box::new(update);
        try_queue(&self.ui_update_tx, update);
    }

    /// Schedule a UI update, waiting for queue space instead of dropping it.
    ///
    /// Must not be called from inside the tokio runtime or the Slint event loop.
    pub fn update_ui_blocking<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let update: UiUpdate<T> = Box::new(update);
        queue_blocking(&self.ui_update_tx, update);
    }

    /// Spawn an async task on the tokio runtime from a Slint callback
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    /// Weak reference to the UI component
    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }
}

fn try_queue<U>(tx: &mpsc::Sender<U>, update: U) -> bool {
    match tx.try_send(update) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("UI update channel full - skipping update to prevent backpressure");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("Failed to send UI update - handler thread has stopped");
            false
        }
    }
}

fn queue_blocking<U>(tx: &mpsc::Sender<U>, update: U) -> bool {
    if tx.blocking_send(update).is_err() {
        tracing::warn!("Failed to send UI update - handler thread has stopped");
        return false;
    }
    true
}
