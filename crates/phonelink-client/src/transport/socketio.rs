//! Socket.IO framing over Engine.IO v4
//!
//! The display server speaks Socket.IO. Each WebSocket text message is one
//! Engine.IO packet: a single type digit followed by its data.
//!
//! | Engine.IO | Meaning |
//! |-----------|---------|
//! | `0{..}`   | open, carries the [`Handshake`] |
//! | `1`       | close |
//! | `2` / `3` | ping / pong (server pings, client answers) |
//! | `4..`     | message, carries a Socket.IO packet |
//!
//! Socket.IO packets inside a message are again a type digit, an optional
//! `/namespace,` and an optional ack id before the JSON data. Only the
//! default namespace is used: `40` connects, `41` disconnects and
//! `42["event", payload]` carries one [`WireFrame`].

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use phonelink_core::prelude::*;

use crate::protocol::WireFrame;

/// Path the server mounts Socket.IO under.
pub const SOCKETIO_PATH: &str = "/socket.io/";

/// Query selecting Engine.IO v4 straight over WebSocket.
pub const ENGINEIO_QUERY: &str = "EIO=4&transport=websocket";

/// WebSocket endpoint for a server address already mapped onto ws/wss.
pub fn endpoint(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_path(SOCKETIO_PATH);
    url.set_query(Some(ENGINEIO_QUERY));
    url
}

// ─────────────────────────────────────────────────────────────────
// Engine.IO
// ─────────────────────────────────────────────────────────────────

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id (not the Socket.IO socket id).
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for our pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

impl Handshake {
    /// How long to wait for any server traffic before calling the
    /// connection dead.
    pub fn liveness(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let kind = chars.next()?;
        let data = chars.as_str();
        let packet = match kind {
            '0' => match serde_json::from_str(data) {
                Ok(handshake) => EnginePacket::Open(handshake),
                Err(e) => {
                    debug!("Malformed Engine.IO open packet: {}", e);
                    return None;
                }
            },
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(data.to_string()),
            '3' => EnginePacket::Pong(data.to_string()),
            '4' => EnginePacket::Message(data.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                debug!("Unknown Engine.IO packet type '{}'", other);
                return None;
            }
        };
        Some(packet)
    }

    /// Text form. The open packet is never sent by a client and encodes
    /// as a bare `0`.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Socket.IO
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client: connect request. Server: acknowledgement carrying `{"sid"}`.
    Connect(Option<Value>),
    Disconnect,
    Event(WireFrame),
    Ack(Value),
    ConnectError(Value),
    /// Binary event or ack; not used by the display server.
    Binary,
}

impl SocketPacket {
    /// Parse the data of an Engine.IO message. Packets for other
    /// namespaces yield `None`.
    pub fn decode(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let kind = chars.next()?;
        let mut rest = chars.as_str();

        if rest.starts_with('/') {
            let (namespace, tail) = rest.split_once(',').unwrap_or((rest, ""));
            if namespace != "/" {
                trace!("Ignoring packet for namespace {}", namespace);
                return None;
            }
            rest = tail;
        }
        let data = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        let json = || -> Option<Value> {
            if data.is_empty() {
                return None;
            }
            serde_json::from_str(data)
                .map_err(|e| debug!("Malformed Socket.IO data: {}", e))
                .ok()
        };

        let packet = match kind {
            '0' => SocketPacket::Connect(json()),
            '1' => SocketPacket::Disconnect,
            '2' => SocketPacket::Event(WireFrame::decode(data)?),
            '3' => SocketPacket::Ack(json().unwrap_or(Value::Null)),
            '4' => SocketPacket::ConnectError(json().unwrap_or(Value::Null)),
            '5' | '6' => SocketPacket::Binary,
            other => {
                debug!("Unknown Socket.IO packet type '{}'", other);
                return None;
            }
        };
        Some(packet)
    }

    /// Text form, ready to wrap in [`EnginePacket::Message`].
    pub fn encode(&self) -> Result<String> {
        let text = match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event(frame) => format!("2{}", frame.encode()?),
            SocketPacket::Ack(data) => format!("3{}", serde_json::to_string(data)?),
            SocketPacket::ConnectError(data) => format!("4{}", serde_json::to_string(data)?),
            SocketPacket::Binary => {
                return Err(Error::protocol("binary packets are not supported"));
            }
        };
        Ok(text)
    }

    /// The socket id of a connect acknowledgement.
    pub fn connected_sid(&self) -> Option<&str> {
        match self {
            SocketPacket::Connect(Some(data)) => data.get("sid").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Engine.IO text for one outbound event.
pub fn encode_event(frame: &WireFrame) -> Result<String> {
    let packet = SocketPacket::Event(frame.clone()).encode()?;
    Ok(EnginePacket::Message(packet).encode())
}
