//! Device records and room membership payloads

use serde::{Deserialize, Serialize};

/// Device number the server assigns when none was chosen.
pub const UNASSIGNED_DEVICE_NR: i64 = -999;

/// A device connected to the server, either a display (client) or a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub is_client: bool,
    #[serde(default = "default_device_nr")]
    pub device_nr: i64,
    #[serde(default)]
    pub socket_id: String,
}

fn default_device_nr() -> i64 {
    UNASSIGNED_DEVICE_NR
}

/// Payload of the `devices` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub time_stamp: f64,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl DeviceList {
    pub fn clients(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_client)
    }

    /// The first display registered under `device_id`.
    pub fn client_for(&self, device_id: &str) -> Option<&Device> {
        self.clients().find(|d| d.device_id == device_id)
    }
}

/// Payload of `room_joined` / `room_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room: String,
    pub device: Device,
    #[serde(default)]
    pub time_stamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_defaults() {
        let device: Device = serde_json::from_value(json!({"device_id": "FooBar"})).unwrap();
        assert!(!device.is_client);
        assert_eq!(device.device_nr, UNASSIGNED_DEVICE_NR);
        assert!(device.socket_id.is_empty());
    }

    #[test]
    fn test_client_for_skips_scripts() {
        let list: DeviceList = serde_json::from_value(json!({
            "time_stamp": 1.0,
            "devices": [
                {"device_id": "FooBar", "is_client": false, "device_nr": 0, "socket_id": "a"},
                {"device_id": "FooBar", "is_client": true, "device_nr": 0, "socket_id": "b"},
            ]
        }))
        .unwrap();
        assert_eq!(list.client_for("FooBar").map(|d| d.socket_id.as_str()), Some("b"));
        assert_eq!(list.clients().count(), 1);
        assert!(list.client_for("Other").is_none());
    }
}
