//! Server events other than data messages
//!
//! ## Event types
//! - [`ErrorMsg`] - `error_msg`, an error reported by the server
//! - [`InformationMsg`] - `information_msg`, a reply to a server-side action
//! - [`AllDataSnapshot`] - `all_data`, the server's buffered history for a device

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::message::{classify, DataMsg};

/// Error reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMsg {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub err: Value,
    #[serde(default)]
    pub time_stamp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a server-side action such as a device number change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InformationMsg {
    #[serde(default)]
    pub message: String,
    /// The request this answers; its `time_stamp` is the correlation key.
    #[serde(default)]
    pub action: Value,
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default)]
    pub time_stamp: f64,
}

impl InformationMsg {
    pub const SUCCESS: &'static str = "Success";

    pub fn action_time_stamp(&self) -> Option<f64> {
        self.action.get("time_stamp").and_then(Value::as_f64)
    }

    pub fn is_success(&self) -> bool {
        self.message == Self::SUCCESS
    }
}

/// History of one device as buffered by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllDataSnapshot {
    pub device_id: String,
    pub data: HashMap<String, Vec<DataMsg>>,
}

impl AllDataSnapshot {
    /// Parse an `all_data` payload: `{device_id, all_data: {kind: [msg, ..]}}`.
    ///
    /// Entries missing a `device_id` inherit the snapshot's; entries that do
    /// not classify are skipped.
    pub fn parse(raw: &Value) -> Option<Self> {
        let device_id = raw.get("device_id").and_then(Value::as_str)?.to_string();
        let groups = raw.get("all_data").and_then(Value::as_object)?;

        let mut data: HashMap<String, Vec<DataMsg>> = HashMap::new();
        for (kind, entries) in groups {
            let Some(entries) = entries.as_array() else {
                debug!("Skipping non-list all_data entry '{}'", kind);
                continue;
            };
            if entries.is_empty() {
                data.entry(kind.clone()).or_default();
            }
            for entry in entries {
                let mut entry = entry.clone();
                if let Value::Object(map) = &mut entry {
                    map.entry("device_id")
                        .or_insert_with(|| Value::String(device_id.clone()));
                    map.entry("type")
                        .or_insert_with(|| Value::String(kind.clone()));
                }
                if let Some(msg) = classify(&entry) {
                    data.entry(msg.kind().to_string()).or_default().push(msg);
                }
            }
        }

        Some(Self { device_id, data })
    }

    /// Every message in the snapshot, any kind.
    pub fn messages(&self) -> impl Iterator<Item = &DataMsg> {
        self.data.values().flatten()
    }
}
