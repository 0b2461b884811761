//! Data messages exchanged with the display
//!
//! Every `new_data` payload is a JSON object with a `type` discriminant, a
//! header (`time_stamp`, `device_id`, optional `device_nr`, `broadcast`) and
//! kind-specific fields. [`classify`] maps such an object onto [`DataMsg`];
//! [`DataMsg::to_json`] is the inverse used for outbound messages.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::device::UNASSIGNED_DEVICE_NR;
use crate::mirror::{Cell, DisplayConfigUpdate, GridInput, GridTarget, Line, Movement, Sprite};

/// Wire discriminants of the message kinds.
pub mod kinds {
    pub const KEY: &str = "key";
    pub const ACCELERATION: &str = "acceleration";
    pub const GYRO: &str = "gyro";
    pub const POINTER: &str = "pointer";
    pub const INPUT_RESPONSE: &str = "input_response";
    pub const ALERT_CONFIRM: &str = "alert_confirm";
    pub const SPRITE: &str = "sprite";
    pub const SPRITES: &str = "sprites";
    pub const SPRITE_REMOVED: &str = "sprite_removed";
    pub const SPRITE_OUT: &str = "sprite_out";
    pub const SPRITE_COLLISION: &str = "sprite_collision";
    pub const SPRITE_CLICKED: &str = "sprite_clicked";
    pub const BORDER_OVERLAP: &str = "border_overlap";
    pub const PLAYGROUND_CONFIG: &str = "playground_config";
    pub const GRID: &str = "grid";
    pub const GRID_UPDATE: &str = "grid_update";
    pub const COLOR: &str = "color";
    pub const NOTIFICATION: &str = "notification";
    pub const INPUT_PROMPT: &str = "input_prompt";
    pub const LINE: &str = "line";
    pub const LINES: &str = "lines";
    pub const REMOVE_LINE: &str = "remove_line";
    pub const REMOVE_SPRITE: &str = "remove_sprite";
    pub const CLEAR_PLAYGROUND: &str = "clear_playground";
}

/// Header keys stripped before decoding a payload.
const HEADER_KEYS: &[&str] = &[
    "type",
    "time_stamp",
    "device_id",
    "device_nr",
    "broadcast",
    "unicast_to",
];

// ─────────────────────────────────────────────────────────────────
// Header
// ─────────────────────────────────────────────────────────────────

/// Fields every data message carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgHeader {
    #[serde(default)]
    pub time_stamp: f64,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_nr: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub broadcast: bool,
}

impl Default for MsgHeader {
    fn default() -> Self {
        Self {
            time_stamp: 0.0,
            device_id: String::new(),
            device_nr: Some(UNASSIGNED_DEVICE_NR),
            broadcast: false,
        }
    }
}

impl MsgHeader {
    pub fn new(device_id: impl Into<String>, time_stamp: f64) -> Self {
        Self {
            time_stamp,
            device_id: device_id.into(),
            device_nr: None,
            broadcast: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────

/// Function keys that get their own callback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKey {
    F1,
    F2,
    F3,
    F4,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyPress {
    #[serde(default)]
    pub key: String,
}

impl KeyPress {
    pub fn function_key(&self) -> Option<FunctionKey> {
        match self.key.as_str() {
            "F1" => Some(FunctionKey::F1),
            "F2" => Some(FunctionKey::F2),
            "F3" => Some(FunctionKey::F3),
            "F4" => Some(FunctionKey::F4),
            _ => None,
        }
    }
}

/// Default sampling interval of the acceleration sensor, in milliseconds.
pub const DEFAULT_SENSOR_INTERVAL_MS: f64 = 16.0;

fn default_sensor_interval() -> f64 {
    DEFAULT_SENSOR_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_sensor_interval")]
    pub interval: f64,
}

impl Default for Acceleration {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            interval: DEFAULT_SENSOR_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gyro {
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub absolute: bool,
}

fn unset() -> f64 {
    -1.0
}

/// Pointer on the color panel. Width and height are the panel size in
/// pixels at the time of the touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPointer {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "unset")]
    pub width: f64,
    #[serde(default = "unset")]
    pub height: f64,
    #[serde(default)]
    pub displayed_at: f64,
}

impl Default for ColorPointer {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: -1.0,
            height: -1.0,
            displayed_at: 0.0,
        }
    }
}

fn unset_index() -> i64 {
    -1
}

/// Pointer on a grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPointer {
    #[serde(default = "unset_index")]
    pub row: i64,
    #[serde(default = "unset_index")]
    pub column: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Cell>,
    #[serde(default)]
    pub displayed_at: f64,
}

impl Default for GridPointer {
    fn default() -> Self {
        Self {
            row: -1,
            column: -1,
            color: None,
            displayed_at: 0.0,
        }
    }
}

/// Answer to a prompt. `response` is null when the user cancelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputResponse {
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub displayed_at: f64,
}

impl InputResponse {
    /// The answer as text; numbers are formatted, null means cancelled.
    pub fn text(&self) -> Option<String> {
        match &self.response {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertConfirm {
    #[serde(default)]
    pub displayed_at: f64,
}

/// Reference to a sprite by id, enriched with the mirror's record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpriteRef {
    #[serde(alias = "sprite_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<Sprite>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpriteClick {
    #[serde(alias = "sprite_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<Sprite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlap {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteCollision {
    pub sprites: Vec<Sprite>,
    pub overlap: Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Border {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderOverlap {
    #[serde(alias = "sprite_id")]
    pub id: String,
    pub border: Border,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<Sprite>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    #[serde(default)]
    pub config: DisplayConfigUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMsg {
    pub grid: GridInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_color: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumerate: Option<bool>,
}

/// Single cell write, addressed by row/column or by cell number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
    pub color: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_color: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumerate: Option<bool>,
}

impl GridUpdate {
    pub fn at(target: GridTarget, color: Cell) -> Self {
        let (row, column, number) = match target {
            GridTarget::At { row, column } => (Some(row), Some(column), None),
            GridTarget::CellNumber(n) => (None, None, Some(n)),
        };
        Self {
            row,
            column,
            number,
            color,
            base_color: None,
            enumerate: None,
        }
    }

    /// A cell number wins over row/column; `None` when neither is complete.
    pub fn target(&self) -> Option<GridTarget> {
        match (self.number, self.row, self.column) {
            (Some(n), _, _) => Some(GridTarget::CellNumber(n)),
            (None, Some(row), Some(column)) => Some(GridTarget::At { row, column }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorMsg {
    pub color: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default)]
    pub alert: bool,
    /// Display time in milliseconds; negative means until dismissed.
    #[serde(default = "unset")]
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Number,
    #[serde(rename = "datetime-local", alias = "datetime")]
    DateTime,
    Date,
    Time,
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPrompt {
    pub question: String,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveById {
    pub id: String,
}

/// Kind-specific part of a data message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Key(KeyPress),
    Acceleration(Acceleration),
    Gyro(Gyro),
    ColorPointer(ColorPointer),
    GridPointer(GridPointer),
    InputResponse(InputResponse),
    AlertConfirm(AlertConfirm),
    Sprite(Sprite),
    Sprites(Vec<Sprite>),
    SpriteRemoved(SpriteRef),
    SpriteOut(SpriteRef),
    SpriteCollision(SpriteCollision),
    SpriteClicked(SpriteClick),
    BorderOverlap(BorderOverlap),
    PlaygroundConfig(PlaygroundConfig),
    Grid(GridMsg),
    GridUpdate(GridUpdate),
    Color(ColorMsg),
    Notification(Notification),
    InputPrompt(InputPrompt),
    Line(Line),
    Lines(Vec<Line>),
    RemoveLine(RemoveById),
    RemoveSprite(RemoveById),
    ClearPlayground,
    /// Any other kind, payload kept as received.
    Unknown {
        kind: String,
        fields: Map<String, Value>,
    },
}

impl Payload {
    /// Wire discriminant. Both pointer variants report `pointer`.
    pub fn kind(&self) -> &str {
        match self {
            Payload::Key(_) => kinds::KEY,
            Payload::Acceleration(_) => kinds::ACCELERATION,
            Payload::Gyro(_) => kinds::GYRO,
            Payload::ColorPointer(_) | Payload::GridPointer(_) => kinds::POINTER,
            Payload::InputResponse(_) => kinds::INPUT_RESPONSE,
            Payload::AlertConfirm(_) => kinds::ALERT_CONFIRM,
            Payload::Sprite(_) => kinds::SPRITE,
            Payload::Sprites(_) => kinds::SPRITES,
            Payload::SpriteRemoved(_) => kinds::SPRITE_REMOVED,
            Payload::SpriteOut(_) => kinds::SPRITE_OUT,
            Payload::SpriteCollision(_) => kinds::SPRITE_COLLISION,
            Payload::SpriteClicked(_) => kinds::SPRITE_CLICKED,
            Payload::BorderOverlap(_) => kinds::BORDER_OVERLAP,
            Payload::PlaygroundConfig(_) => kinds::PLAYGROUND_CONFIG,
            Payload::Grid(_) => kinds::GRID,
            Payload::GridUpdate(_) => kinds::GRID_UPDATE,
            Payload::Color(_) => kinds::COLOR,
            Payload::Notification(_) => kinds::NOTIFICATION,
            Payload::InputPrompt(_) => kinds::INPUT_PROMPT,
            Payload::Line(_) => kinds::LINE,
            Payload::Lines(_) => kinds::LINES,
            Payload::RemoveLine(_) => kinds::REMOVE_LINE,
            Payload::RemoveSprite(_) => kinds::REMOVE_SPRITE,
            Payload::ClearPlayground => kinds::CLEAR_PLAYGROUND,
            Payload::Unknown { kind, .. } => kind,
        }
    }

    /// Decode the payload of a `kind` message from its (header-free) fields.
    fn decode(kind: &str, fields: Map<String, Value>) -> serde_json::Result<Payload> {
        use serde_json::from_value;

        let context = fields.get("context").and_then(Value::as_str).map(str::to_owned);
        let nested = |key: &str| fields.get(key).cloned();
        let object = Value::Object(fields.clone());

        let payload = match kind {
            kinds::KEY => Payload::Key(from_value(object)?),
            kinds::ACCELERATION => Payload::Acceleration(from_value(object)?),
            kinds::GYRO => Payload::Gyro(from_value(object)?),
            kinds::POINTER => match context.as_deref() {
                Some("grid") => Payload::GridPointer(from_value(object)?),
                _ => Payload::ColorPointer(from_value(object)?),
            },
            kinds::INPUT_RESPONSE => Payload::InputResponse(from_value(object)?),
            kinds::ALERT_CONFIRM => Payload::AlertConfirm(from_value(object)?),
            kinds::SPRITE => {
                // Either nested under `sprite` or flat next to the header.
                Payload::Sprite(from_value(nested("sprite").unwrap_or(object))?)
            }
            kinds::SPRITES => Payload::Sprites(from_value(nested("sprites").unwrap_or_default())?),
            kinds::SPRITE_REMOVED => Payload::SpriteRemoved(from_value(object)?),
            kinds::SPRITE_OUT => Payload::SpriteOut(from_value(object)?),
            kinds::SPRITE_COLLISION => Payload::SpriteCollision(from_value(object)?),
            kinds::SPRITE_CLICKED => Payload::SpriteClicked(from_value(object)?),
            kinds::BORDER_OVERLAP => Payload::BorderOverlap(from_value(object)?),
            kinds::PLAYGROUND_CONFIG => Payload::PlaygroundConfig(from_value(object)?),
            kinds::GRID => Payload::Grid(from_value(object)?),
            kinds::GRID_UPDATE => Payload::GridUpdate(from_value(object)?),
            kinds::COLOR => Payload::Color(from_value(object)?),
            kinds::NOTIFICATION => Payload::Notification(from_value(object)?),
            kinds::INPUT_PROMPT => Payload::InputPrompt(from_value(object)?),
            kinds::LINE => Payload::Line(from_value(nested("line").unwrap_or(object))?),
            kinds::LINES => Payload::Lines(from_value(nested("lines").unwrap_or_default())?),
            kinds::REMOVE_LINE => Payload::RemoveLine(from_value(object)?),
            kinds::REMOVE_SPRITE => Payload::RemoveSprite(from_value(object)?),
            kinds::CLEAR_PLAYGROUND => Payload::ClearPlayground,
            other => Payload::Unknown {
                kind: other.to_string(),
                fields: fields.clone(),
            },
        };
        Ok(payload)
    }

    /// Wire fields of this payload including `type`.
    pub fn to_fields(&self) -> Map<String, Value> {
        fn obj<T: Serialize>(value: &T) -> Value {
            serde_json::to_value(value).unwrap_or_default()
        }
        fn wrap<T: Serialize>(key: &str, value: &T) -> Value {
            let mut map = Map::new();
            map.insert(key.to_string(), obj(value));
            Value::Object(map)
        }

        let value = match self {
            Payload::Key(p) => obj(p),
            Payload::Acceleration(p) => obj(p),
            Payload::Gyro(p) => obj(p),
            Payload::ColorPointer(p) => with_context(obj(p), "color"),
            Payload::GridPointer(p) => with_context(obj(p), "grid"),
            Payload::InputResponse(p) => obj(p),
            Payload::AlertConfirm(p) => obj(p),
            Payload::Sprite(s) => wrap("sprite", s),
            Payload::Sprites(s) => wrap("sprites", s),
            Payload::SpriteRemoved(p) | Payload::SpriteOut(p) => obj(p),
            Payload::SpriteCollision(p) => obj(p),
            Payload::SpriteClicked(p) => obj(p),
            Payload::BorderOverlap(p) => obj(p),
            Payload::PlaygroundConfig(p) => obj(p),
            Payload::Grid(p) => obj(p),
            Payload::GridUpdate(p) => obj(p),
            Payload::Color(p) => obj(p),
            Payload::Notification(p) => obj(p),
            Payload::InputPrompt(p) => obj(p),
            Payload::Line(l) => wrap("line", l),
            Payload::Lines(l) => wrap("lines", l),
            Payload::RemoveLine(p) | Payload::RemoveSprite(p) => obj(p),
            Payload::ClearPlayground => Value::Object(Map::new()),
            Payload::Unknown { fields, .. } => Value::Object(fields.clone()),
        };

        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert("type".to_string(), Value::String(self.kind().to_string()));
        fields
    }
}

fn with_context(mut value: Value, context: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("context".to_string(), Value::String(context.to_string()));
    }
    value
}

// ─────────────────────────────────────────────────────────────────
// DataMsg
// ─────────────────────────────────────────────────────────────────

/// One classified data message.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMsg {
    pub header: MsgHeader,
    pub payload: Payload,
}

impl DataMsg {
    pub fn new(header: MsgHeader, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    pub fn time_stamp(&self) -> f64 {
        self.header.time_stamp
    }

    pub fn device_id(&self) -> &str {
        &self.header.device_id
    }

    pub fn is_broadcast(&self) -> bool {
        self.header.broadcast
    }

    /// Current-frame slot this message fills, if any.
    pub fn frame_kind(&self) -> Option<FrameKind> {
        match self.payload {
            Payload::Key(_) => Some(FrameKind::Key),
            Payload::Acceleration(_) => Some(FrameKind::Acceleration),
            Payload::Gyro(_) => Some(FrameKind::Gyro),
            Payload::ColorPointer(_) => Some(FrameKind::ColorPointer),
            Payload::GridPointer(_) => Some(FrameKind::GridPointer),
            _ => None,
        }
    }

    /// Canonical empty message of a current-frame kind.
    pub fn default_for(kind: FrameKind) -> Self {
        let payload = match kind {
            FrameKind::Key => Payload::Key(KeyPress::default()),
            FrameKind::Acceleration => Payload::Acceleration(Acceleration::default()),
            FrameKind::Gyro => Payload::Gyro(Gyro::default()),
            FrameKind::ColorPointer => Payload::ColorPointer(ColorPointer::default()),
            FrameKind::GridPointer => Payload::GridPointer(GridPointer::default()),
        };
        Self::new(MsgHeader::default(), payload)
    }

    /// Canonical empty message for any kind name.
    ///
    /// `pointer` yields an empty color pointer; kinds without a typed
    /// default yield an empty [`Payload::Unknown`].
    pub fn empty(kind: &str) -> Self {
        match FrameKind::from_name(kind) {
            Some(frame_kind) => Self::default_for(frame_kind),
            None if kind == kinds::POINTER => Self::default_for(FrameKind::ColorPointer),
            None => Self::new(
                MsgHeader::default(),
                Payload::Unknown {
                    kind: kind.to_string(),
                    fields: Map::new(),
                },
            ),
        }
    }

    /// Full wire object: header plus payload fields.
    pub fn to_json(&self) -> Value {
        let mut fields = self.payload.to_fields();
        if let Ok(Value::Object(header)) = serde_json::to_value(&self.header) {
            fields.extend(header);
        }
        Value::Object(fields)
    }

    /// Typed view of a current-frame message.
    pub fn frame_data<T: FrameData>(&self) -> Option<Stamped<T>> {
        T::from_payload(&self.payload).map(|data| Stamped {
            header: self.header.clone(),
            data: data.clone(),
        })
    }
}

impl Serialize for DataMsg {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Classify one raw `new_data` object.
///
/// Returns `None` (and logs at debug level) for anything that is not an
/// object, lacks `type` or `device_id`, or has malformed fields for a known
/// kind. Unrecognized kinds classify as [`Payload::Unknown`].
pub fn classify(raw: &Value) -> Option<DataMsg> {
    let Some(obj) = raw.as_object() else {
        debug!("Dropping non-object data message");
        return None;
    };
    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        debug!("Dropping data message without type");
        return None;
    };
    let Some(device_id) = obj.get("device_id").and_then(Value::as_str) else {
        debug!("Dropping '{}' message without device_id", kind);
        return None;
    };

    let header = MsgHeader {
        time_stamp: obj.get("time_stamp").and_then(Value::as_f64).unwrap_or(0.0),
        device_id: device_id.to_string(),
        device_nr: obj.get("device_nr").and_then(Value::as_i64),
        broadcast: obj
            .get("broadcast")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    let mut fields = obj.clone();
    for key in HEADER_KEYS {
        fields.remove(*key);
    }

    match Payload::decode(kind, fields) {
        Ok(payload) => Some(DataMsg { header, payload }),
        Err(e) => {
            debug!("Dropping malformed '{}' message: {}", kind, e);
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Current frame
// ─────────────────────────────────────────────────────────────────

/// The five slots of a current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Key,
    Acceleration,
    Gyro,
    ColorPointer,
    GridPointer,
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::Key,
        FrameKind::Acceleration,
        FrameKind::Gyro,
        FrameKind::ColorPointer,
        FrameKind::GridPointer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Key => "key",
            FrameKind::Acceleration => "acceleration",
            FrameKind::Gyro => "gyro",
            FrameKind::ColorPointer => "color_pointer",
            FrameKind::GridPointer => "grid_pointer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// Payload types that occupy a current-frame slot.
pub trait FrameData: Clone + Default {
    const KIND: FrameKind;

    fn from_payload(payload: &Payload) -> Option<&Self>;

    fn into_payload(self) -> Payload;
}

macro_rules! frame_data {
    ($ty:ident, $kind:ident) => {
        impl FrameData for $ty {
            const KIND: FrameKind = FrameKind::$kind;

            fn from_payload(payload: &Payload) -> Option<&Self> {
                match payload {
                    Payload::$kind(p) => Some(p),
                    _ => None,
                }
            }

            fn into_payload(self) -> Payload {
                Payload::$kind(self)
            }
        }
    };
}

frame_data!(KeyPress, Key);
frame_data!(Acceleration, Acceleration);
frame_data!(Gyro, Gyro);
frame_data!(ColorPointer, ColorPointer);
frame_data!(GridPointer, GridPointer);

/// A payload together with the header it arrived with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamped<T> {
    #[serde(flatten)]
    pub header: MsgHeader,
    #[serde(flatten)]
    pub data: T,
}

impl<T: FrameData> Default for Stamped<T> {
    fn default() -> Self {
        Self {
            header: MsgHeader::default(),
            data: T::default(),
        }
    }
}

impl<T: FrameData> Stamped<T> {
    pub fn to_msg(&self) -> DataMsg {
        DataMsg::new(self.header.clone(), self.data.clone().into_payload())
    }
}

pub type KeyMsg = Stamped<KeyPress>;
pub type AccelerationMsg = Stamped<Acceleration>;
pub type GyroMsg = Stamped<Gyro>;
pub type ColorPointerMsg = Stamped<ColorPointer>;
pub type GridPointerMsg = Stamped<GridPointer>;

/// Latest message of each streaming kind. Never has an empty slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub key: KeyMsg,
    pub acceleration: AccelerationMsg,
    pub gyro: GyroMsg,
    pub color_pointer: ColorPointerMsg,
    pub grid_pointer: GridPointerMsg,
}

impl Frame {
    /// Store `msg` in its slot; `false` for kinds without one.
    pub fn apply(&mut self, msg: &DataMsg) -> bool {
        fn set<T: FrameData>(slot: &mut Stamped<T>, msg: &DataMsg) -> bool {
            match msg.frame_data::<T>() {
                Some(stamped) => {
                    *slot = stamped;
                    true
                }
                None => false,
            }
        }

        match msg.frame_kind() {
            Some(FrameKind::Key) => set(&mut self.key, msg),
            Some(FrameKind::Acceleration) => set(&mut self.acceleration, msg),
            Some(FrameKind::Gyro) => set(&mut self.gyro, msg),
            Some(FrameKind::ColorPointer) => set(&mut self.color_pointer, msg),
            Some(FrameKind::GridPointer) => set(&mut self.grid_pointer, msg),
            None => false,
        }
    }

    pub fn get(&self, kind: FrameKind) -> DataMsg {
        match kind {
            FrameKind::Key => self.key.to_msg(),
            FrameKind::Acceleration => self.acceleration.to_msg(),
            FrameKind::Gyro => self.gyro.to_msg(),
            FrameKind::ColorPointer => self.color_pointer.to_msg(),
            FrameKind::GridPointer => self.grid_pointer.to_msg(),
        }
    }

    /// The newer of the two pointer slots (color wins a tie).
    pub fn latest_pointer(&self) -> DataMsg {
        if self.grid_pointer.header.time_stamp > self.color_pointer.header.time_stamp {
            self.grid_pointer.to_msg()
        } else {
            self.color_pointer.to_msg()
        }
    }

    /// The newest slot overall (earlier slots win a tie).
    pub fn latest(&self) -> DataMsg {
        let mut best = self.get(FrameKind::Key);
        for kind in &FrameKind::ALL[1..] {
            let candidate = self.get(*kind);
            if candidate.time_stamp() > best.time_stamp() {
                best = candidate;
            }
        }
        best
    }
}
