//! Wire protocol
//!
//! Every frame is a Socket.IO event, the JSON array `[event, payload]`
//! (framing lives in [`crate::transport::socketio`]). This module names
//! the events, stamps outbound payloads, and parses inbound frames into
//! [`InboundEvent`].

use serde_json::{Map, Value};
use tracing::debug;

use phonelink_core::prelude::*;
use phonelink_core::{AllDataSnapshot, DataMsg, Device, DeviceList, ErrorMsg, InformationMsg, RoomEvent};

/// Wire event names.
pub mod events {
    // Outbound
    pub const NEW_DEVICE: &str = "new_device";
    pub const NEW_DATA: &str = "new_data";
    pub const CLEAR_DATA: &str = "clear_data";
    pub const GET_ALL_DATA: &str = "get_all_data";
    pub const GET_DEVICES: &str = "get_devices";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const SET_NEW_DEVICE_NR: &str = "set_new_device_nr";

    // Inbound
    pub const DEVICE: &str = "device";
    pub const DEVICES: &str = "devices";
    pub const ALL_DATA: &str = "all_data";
    pub const ERROR_MSG: &str = "error_msg";
    pub const INFORMATION_MSG: &str = "information_msg";
    pub const ROOM_JOINED: &str = "room_joined";
    pub const ROOM_LEFT: &str = "room_left";
}

/// One event on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    pub event: String,
    pub payload: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Text form: `["event", {...}]`.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&(&self.event, &self.payload))?)
    }

    /// Parse a text frame; `None` for anything not shaped `[string, value]`.
    pub fn decode(text: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Ignoring non-JSON frame: {}", e);
                return None;
            }
        };
        let Value::Array(mut parts) = value else {
            debug!("Ignoring frame that is not an array");
            return None;
        };
        if parts.is_empty() {
            return None;
        }
        let event = parts.remove(0);
        let event = event.as_str()?.to_string();
        let payload = if parts.is_empty() {
            Value::Null
        } else {
            parts.remove(0)
        };
        Some(Self { event, payload })
    }
}

/// Addressing of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Our own room.
    #[default]
    Default,
    /// Every connected device.
    Broadcast,
    /// Only the device with this number.
    Unicast(i64),
    /// A named device id / room instead of our own.
    Target(String),
}

impl Delivery {
    /// Add `time_stamp`, `device_id` and addressing fields to a payload.
    ///
    /// `time_stamp` and `device_id` already present are kept, except that a
    /// [`Delivery::Target`] always overrides `device_id`.
    pub fn stamp(&self, payload: &mut Map<String, Value>, own_device_id: &str, time_stamp: f64) {
        payload
            .entry("time_stamp")
            .or_insert_with(|| Value::from(time_stamp));
        if let Delivery::Target(target) = self {
            payload.insert("device_id".into(), Value::String(target.clone()));
        }
        payload
            .entry("device_id")
            .or_insert_with(|| Value::String(own_device_id.to_string()));

        match self {
            Delivery::Broadcast => {
                payload.insert("broadcast".into(), Value::Bool(true));
            }
            Delivery::Unicast(nr) => {
                payload.remove("broadcast");
                payload.insert("unicast_to".into(), Value::from(*nr));
            }
            Delivery::Default | Delivery::Target(_) => {}
        }
    }
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    NewData(DataMsg),
    AllData(AllDataSnapshot),
    Device(Device),
    Devices(DeviceList),
    Error(ErrorMsg),
    Information(InformationMsg),
    RoomJoined(RoomEvent),
    RoomLeft(RoomEvent),
}

impl InboundEvent {
    /// Parse an inbound frame. Unknown events and malformed payloads are
    /// dropped with a debug log.
    pub fn parse(frame: &WireFrame) -> Option<Self> {
        fn typed<T: serde::de::DeserializeOwned>(frame: &WireFrame) -> Option<T> {
            match serde_json::from_value(frame.payload.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Dropping malformed '{}' payload: {}", frame.event, e);
                    None
                }
            }
        }

        let event = match frame.event.as_str() {
            events::NEW_DATA => InboundEvent::NewData(phonelink_core::classify(&frame.payload)?),
            events::ALL_DATA => InboundEvent::AllData(AllDataSnapshot::parse(&frame.payload)?),
            events::DEVICE => InboundEvent::Device(typed(frame)?),
            events::DEVICES => InboundEvent::Devices(typed(frame)?),
            events::ERROR_MSG => InboundEvent::Error(typed(frame)?),
            events::INFORMATION_MSG => InboundEvent::Information(typed(frame)?),
            events::ROOM_JOINED => InboundEvent::RoomJoined(typed(frame)?),
            events::ROOM_LEFT => InboundEvent::RoomLeft(typed(frame)?),
            other => {
                debug!("Ignoring unknown event '{}'", other);
                return None;
            }
        };
        Some(event)
    }
}
