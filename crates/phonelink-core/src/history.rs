//! Per-device message history
//!
//! Messages are buffered per device and kind. Buffers of streaming sensor
//! kinds hold more entries than the rest; both evict oldest-first unless
//! recording is on. Alongside the buffers the store keeps a current frame
//! per device (latest key, acceleration, gyro and pointers) and the same
//! frame aggregated over all devices.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::message::{kinds, DataMsg, Frame, FrameKind};

/// Wire form of "every device" in data queries.
pub const ALL_DEVICES: &str = "__ALL_DEVICES__";

pub const DEFAULT_STREAM_THRESHOLD: usize = 120;
pub const DEFAULT_THRESHOLD: usize = 5;

/// Which devices a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceScope {
    Device(String),
    All,
}

impl DeviceScope {
    pub fn device(id: impl Into<String>) -> Self {
        DeviceScope::Device(id.into())
    }

    pub fn matches(&self, device_id: &str) -> bool {
        match self {
            DeviceScope::Device(id) => id == device_id,
            DeviceScope::All => true,
        }
    }
}

impl From<&str> for DeviceScope {
    fn from(value: &str) -> Self {
        if value == ALL_DEVICES {
            DeviceScope::All
        } else {
            DeviceScope::Device(value.to_string())
        }
    }
}

impl fmt::Display for DeviceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceScope::Device(id) => write!(f, "{id}"),
            DeviceScope::All => write!(f, "{ALL_DEVICES}"),
        }
    }
}

/// Buffer capacity per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Acceleration and gyro.
    pub stream: usize,
    /// Everything else.
    pub default: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stream: DEFAULT_STREAM_THRESHOLD,
            default: DEFAULT_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn for_kind(&self, kind: &str) -> usize {
        let limit = match kind {
            kinds::ACCELERATION | kinds::GYRO => self.stream,
            _ => self.default,
        };
        limit.max(1)
    }
}

type KindBuffers = HashMap<String, VecDeque<DataMsg>>;

/// Bounded history of inbound data messages.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    buffers: HashMap<String, KindBuffers>,
    frames: HashMap<String, Frame>,
    latest_global: Frame,
    latest_by_kind: HashMap<String, DataMsg>,
    thresholds: Thresholds,
    recording: bool,
}

impl HistoryStore {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Store one message, evicting the oldest entry of its buffer if full.
    pub fn ingest(&mut self, msg: &DataMsg) {
        let device_id = msg.device_id().to_string();
        let kind = msg.kind().to_string();
        let limit = self.thresholds.for_kind(&kind);

        let buffer = self
            .buffers
            .entry(device_id.clone())
            .or_default()
            .entry(kind.clone())
            .or_default();
        buffer.push_back(msg.clone());
        if !self.recording {
            while buffer.len() > limit {
                buffer.pop_front();
            }
        }

        if msg.frame_kind().is_some() {
            self.frames.entry(device_id).or_default().apply(msg);
            self.latest_global.apply(msg);
        }
        self.latest_by_kind.insert(kind, msg.clone());
    }

    /// Make sure `device_id` has a (default) current frame.
    pub fn ensure_device(&mut self, device_id: &str) {
        self.frames.entry(device_id.to_string()).or_default();
    }

    /// Buffered messages in ascending `time_stamp` order.
    ///
    /// `kind` may also be `color_pointer` or `grid_pointer` to select one
    /// pointer context. `None` covers every kind.
    pub fn query(&self, kind: Option<&str>, scope: &DeviceScope) -> Vec<DataMsg> {
        let (buffer_kind, pointer_filter) = match kind.and_then(FrameKind::from_name) {
            Some(fk @ (FrameKind::ColorPointer | FrameKind::GridPointer)) => {
                (Some(kinds::POINTER), Some(fk))
            }
            _ => (kind, None),
        };

        let mut out: Vec<DataMsg> = self
            .buffers
            .iter()
            .filter(|(device_id, _)| scope.matches(device_id))
            .flat_map(|(_, by_kind)| {
                by_kind
                    .iter()
                    .filter(move |(k, _)| buffer_kind.map_or(true, |want| k.as_str() == want))
                    .flat_map(|(_, buffer)| buffer.iter())
            })
            .filter(|msg| pointer_filter.map_or(true, |fk| msg.frame_kind() == Some(fk)))
            .cloned()
            .collect();

        out.sort_by(|a, b| a.time_stamp().total_cmp(&b.time_stamp()));
        out
    }

    /// Most recent message, or the kind's empty default. Never absent.
    pub fn latest(&self, kind: Option<&str>, scope: &DeviceScope) -> DataMsg {
        let Some(kind) = kind else {
            return self
                .query(None, scope)
                .pop()
                .unwrap_or_else(|| DataMsg::default_for(FrameKind::Key));
        };

        let frame = match scope {
            DeviceScope::Device(id) => self.frames.get(id),
            DeviceScope::All => Some(&self.latest_global),
        };

        if let Some(frame_kind) = FrameKind::from_name(kind) {
            return frame.map_or_else(|| DataMsg::default_for(frame_kind), |f| f.get(frame_kind));
        }
        if kind == kinds::POINTER {
            return frame.map_or_else(|| DataMsg::empty(kind), Frame::latest_pointer);
        }

        let found = match scope {
            DeviceScope::All => self.latest_by_kind.get(kind).cloned(),
            DeviceScope::Device(_) => self.query(Some(kind), scope).pop(),
        };
        found.unwrap_or_else(|| DataMsg::empty(kind))
    }

    /// Current frame of one device (defaults if nothing arrived yet).
    pub fn frame(&self, device_id: &str) -> Frame {
        self.frames.get(device_id).cloned().unwrap_or_default()
    }

    /// Current frame aggregated over every device.
    pub fn latest_global(&self) -> &Frame {
        &self.latest_global
    }

    pub fn buffer_len(&self, device_id: &str, kind: &str) -> usize {
        self.buffers
            .get(device_id)
            .and_then(|b| b.get(kind))
            .map_or(0, VecDeque::len)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Replace every buffer of `device_id` with a server snapshot.
    ///
    /// Snapshot buffers are sorted and trimmed like live ones.
    pub fn replace_device(&mut self, device_id: &str, data: HashMap<String, Vec<DataMsg>>) {
        let mut by_kind = KindBuffers::new();
        for (kind, mut msgs) in data {
            msgs.sort_by(|a, b| a.time_stamp().total_cmp(&b.time_stamp()));
            let mut buffer: VecDeque<DataMsg> = msgs.into();
            if !self.recording {
                let limit = self.thresholds.for_kind(&kind);
                while buffer.len() > limit {
                    buffer.pop_front();
                }
            }
            by_kind.insert(kind, buffer);
        }
        self.buffers.insert(device_id.to_string(), by_kind);
    }

    /// Forget all buffered messages and frames.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.frames.clear();
        self.latest_global = Frame::default();
        self.latest_by_kind.clear();
    }

    /// Clear history and stop evicting until [`Self::stop_recording`].
    pub fn start_recording(&mut self) {
        self.clear();
        self.recording = true;
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}
