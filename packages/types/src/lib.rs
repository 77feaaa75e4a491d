//! Shared plumbing for the rowforge workspace: error/result re-exports,
//! json helpers and id generation. Downstream crates import everything
//! error-related from here so the workspace stays on one error stack.

pub use anyhow::{Error, Result, anyhow, bail};
pub use async_trait::async_trait;
pub use serde_json::Value;

pub mod json {
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Map, Number, Value, from_slice, from_str, from_value, json, to_string, to_string_pretty, to_value};
}

/// Random id for tasks and log correlation.
pub fn create_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Wall-clock `HH:MM:SS` stamp used to prefix job log lines.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
