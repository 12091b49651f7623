//! Data models for the batch replace tool.
//!
//! - [`AppState`]: inputs, run progress and the log shown in the window
//! - [`UserConfig`]: settings persisted to `.replace_tool.yaml`
//! - [`ReplaceRequest`]: the inputs of one run, captured when it starts
//! - [`LogLine`]: one line of the run log

pub mod app_state;
pub mod config;
pub mod log;
pub mod request;

pub use app_state::AppState;
pub use config::{Settings, UserConfig};
pub use log::LogLine;
pub use request::{ReplaceRequest, RunMode};
