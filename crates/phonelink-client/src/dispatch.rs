//! Callback dispatch engine
//!
//! Inbound traffic is turned into an [`Event`], mapped onto one or more
//! [`CanonicalEvent`]s and fanned out to callbacks. Each canonical event has
//! one assignable slot plus any number of subscribers added through
//! [`CallbackRegistry::register`]. Callbacks come in three shapes
//! ([`Handler`]), chosen when they are registered.
//!
//! A panicking callback is logged and skipped; dispatch always continues
//! with the next callback.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use phonelink_core::prelude::*;
use phonelink_core::{
    AllDataSnapshot, DataMsg, Device, ErrorMsg, LocalMirror, Overlap, Payload, Sprite,
};

use crate::connector::Connector;

// ─────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────

/// A caller callback taking `T`.
///
/// The variant fixes which arguments the callback receives.
pub enum Handler<T> {
    /// Called with no arguments.
    NoArgs(Arc<dyn Fn() + Send + Sync>),
    /// Called with the event payload.
    Payload(Arc<dyn Fn(&T) + Send + Sync>),
    /// Called with the event payload and the runtime, so it can issue
    /// further commands.
    WithConnector(Arc<dyn Fn(&T, &Connector) + Send + Sync>),
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::NoArgs(f) => Handler::NoArgs(Arc::clone(f)),
            Handler::Payload(f) => Handler::Payload(Arc::clone(f)),
            Handler::WithConnector(f) => Handler::WithConnector(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = match self {
            Handler::NoArgs(_) => "NoArgs",
            Handler::Payload(_) => "Payload",
            Handler::WithConnector(_) => "WithConnector",
        };
        write!(f, "Handler::{arity}")
    }
}

impl<T> Handler<T> {
    pub fn no_args(f: impl Fn() + Send + Sync + 'static) -> Self {
        Handler::NoArgs(Arc::new(f))
    }

    pub fn payload(f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Handler::Payload(Arc::new(f))
    }

    pub fn with_connector(f: impl Fn(&T, &Connector) + Send + Sync + 'static) -> Self {
        Handler::WithConnector(Arc::new(f))
    }

    pub fn call(&self, arg: &T, connector: &Connector) {
        match self {
            Handler::NoArgs(f) => f(),
            Handler::Payload(f) => f(arg),
            Handler::WithConnector(f) => f(arg, connector),
        }
    }
}

/// Run a callback, logging instead of propagating a panic.
///
/// Returns `false` when the callback panicked.
pub fn invoke_contained<T>(handler: &Handler<T>, name: &str, arg: &T, connector: &Connector) -> bool {
    match catch_unwind(AssertUnwindSafe(|| handler.call(arg, connector))) {
        Ok(()) => true,
        Err(panic) => {
            error!("Callback for '{}' panicked: {}", name, panic_message(&*panic));
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────
// Canonical events
// ─────────────────────────────────────────────────────────────────

/// Normalized event names used as dispatch keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalEvent {
    Key,
    F1,
    F2,
    F3,
    F4,
    Acceleration,
    Gyro,
    Sensor,
    Pointer,
    Data,
    BroadcastData,
    AllData,
    Device,
    ClientDevice,
    Devices,
    Error,
    RoomJoined,
    RoomLeft,
    SpriteOut,
    SpriteRemoved,
    SpriteCollision,
    OverlapIn,
    OverlapOut,
    BorderOverlap,
    SpriteClicked,
}

impl CanonicalEvent {
    pub const ALL: [CanonicalEvent; 25] = [
        CanonicalEvent::Key,
        CanonicalEvent::F1,
        CanonicalEvent::F2,
        CanonicalEvent::F3,
        CanonicalEvent::F4,
        CanonicalEvent::Acceleration,
        CanonicalEvent::Gyro,
        CanonicalEvent::Sensor,
        CanonicalEvent::Pointer,
        CanonicalEvent::Data,
        CanonicalEvent::BroadcastData,
        CanonicalEvent::AllData,
        CanonicalEvent::Device,
        CanonicalEvent::ClientDevice,
        CanonicalEvent::Devices,
        CanonicalEvent::Error,
        CanonicalEvent::RoomJoined,
        CanonicalEvent::RoomLeft,
        CanonicalEvent::SpriteOut,
        CanonicalEvent::SpriteRemoved,
        CanonicalEvent::SpriteCollision,
        CanonicalEvent::OverlapIn,
        CanonicalEvent::OverlapOut,
        CanonicalEvent::BorderOverlap,
        CanonicalEvent::SpriteClicked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEvent::Key => "key",
            CanonicalEvent::F1 => "f1",
            CanonicalEvent::F2 => "f2",
            CanonicalEvent::F3 => "f3",
            CanonicalEvent::F4 => "f4",
            CanonicalEvent::Acceleration => "acceleration",
            CanonicalEvent::Gyro => "gyro",
            CanonicalEvent::Sensor => "sensor",
            CanonicalEvent::Pointer => "pointer",
            CanonicalEvent::Data => "data",
            CanonicalEvent::BroadcastData => "broadcast_data",
            CanonicalEvent::AllData => "all_data",
            CanonicalEvent::Device => "device",
            CanonicalEvent::ClientDevice => "client_device",
            CanonicalEvent::Devices => "devices",
            CanonicalEvent::Error => "error",
            CanonicalEvent::RoomJoined => "room_joined",
            CanonicalEvent::RoomLeft => "room_left",
            CanonicalEvent::SpriteOut => "sprite_out",
            CanonicalEvent::SpriteRemoved => "sprite_removed",
            CanonicalEvent::SpriteCollision => "sprite_collision",
            CanonicalEvent::OverlapIn => "overlap_in",
            CanonicalEvent::OverlapOut => "overlap_out",
            CanonicalEvent::BorderOverlap => "border_overlap",
            CanonicalEvent::SpriteClicked => "sprite_clicked",
        }
    }

    fn from_alias(name: &str) -> Option<Self> {
        let event = match name {
            "keys" => CanonicalEvent::Key,
            "acc" => CanonicalEvent::Acceleration,
            "new_data" => CanonicalEvent::Data,
            "error_msg" => CanonicalEvent::Error,
            "object_out" => CanonicalEvent::SpriteOut,
            "object_removed" => CanonicalEvent::SpriteRemoved,
            "collision" | "object_collision" => CanonicalEvent::SpriteCollision,
            "object_clicked" | "clicked" => CanonicalEvent::SpriteClicked,
            _ => return None,
        };
        Some(event)
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalEvent {
    type Err = Error;

    /// Accepts canonical names and their aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == name)
            .or_else(|| Self::from_alias(&name))
            .ok_or_else(|| Error::protocol(format!("unknown event '{s}'")))
    }
}

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Something callbacks can be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Data(DataMsg),
    AllData(AllDataSnapshot),
    Device(Device),
    /// The display registered under our device id, or `None` once it left.
    ClientDevice(Option<Device>),
    Devices(Vec<Device>),
    Error(ErrorMsg),
    RoomJoined(Device),
    RoomLeft(Device),
}

impl Event {
    /// Timestamp carried by the event, when it has one.
    pub fn time_stamp(&self) -> Option<f64> {
        match self {
            Event::Data(msg) => Some(msg.time_stamp()),
            Event::Error(err) => Some(err.time_stamp),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataMsg> {
        match self {
            Event::Data(msg) => Some(msg),
            _ => None,
        }
    }

    /// JSON form, as printed by the monitor command.
    pub fn to_json(&self) -> Value {
        match self {
            Event::Data(msg) => msg.to_json(),
            Event::AllData(snapshot) => {
                let data: Map<String, Value> = snapshot
                    .data
                    .iter()
                    .map(|(kind, msgs)| {
                        let list = msgs.iter().map(DataMsg::to_json).collect();
                        (kind.clone(), Value::Array(list))
                    })
                    .collect();
                json!({"device_id": snapshot.device_id, "all_data": data})
            }
            Event::Device(d) | Event::RoomJoined(d) | Event::RoomLeft(d) => {
                serde_json::to_value(d).unwrap_or_default()
            }
            Event::ClientDevice(d) => serde_json::to_value(d).unwrap_or_default(),
            Event::Devices(list) => serde_json::to_value(list).unwrap_or_default(),
            Event::Error(err) => serde_json::to_value(err).unwrap_or_default(),
        }
    }
}

/// Canonical events an event dispatches to, in dispatch order.
///
/// Data messages go to their primary event first, then any derived event
/// (`f1`..`f4`, `overlap_in`/`overlap_out`), then `broadcast_data` when
/// flagged, and always `data` last. Sensor readings are the exception:
/// `sensor` fires before `acceleration`/`gyro`.
pub fn canonical_events(event: &Event) -> Vec<CanonicalEvent> {
    let msg = match event {
        Event::Data(msg) => msg,
        Event::AllData(_) => return vec![CanonicalEvent::AllData],
        Event::Device(_) => return vec![CanonicalEvent::Device],
        Event::ClientDevice(_) => return vec![CanonicalEvent::ClientDevice],
        Event::Devices(_) => return vec![CanonicalEvent::Devices],
        Event::Error(_) => return vec![CanonicalEvent::Error],
        Event::RoomJoined(_) => return vec![CanonicalEvent::RoomJoined],
        Event::RoomLeft(_) => return vec![CanonicalEvent::RoomLeft],
    };

    let mut out = Vec::with_capacity(4);
    match &msg.payload {
        Payload::Key(key) => {
            out.push(CanonicalEvent::Key);
            if let Some(fk) = key.function_key() {
                out.push(match fk {
                    phonelink_core::FunctionKey::F1 => CanonicalEvent::F1,
                    phonelink_core::FunctionKey::F2 => CanonicalEvent::F2,
                    phonelink_core::FunctionKey::F3 => CanonicalEvent::F3,
                    phonelink_core::FunctionKey::F4 => CanonicalEvent::F4,
                });
            }
        }
        Payload::Acceleration(_) => {
            out.push(CanonicalEvent::Sensor);
            out.push(CanonicalEvent::Acceleration);
        }
        Payload::Gyro(_) => {
            out.push(CanonicalEvent::Sensor);
            out.push(CanonicalEvent::Gyro);
        }
        Payload::ColorPointer(_) | Payload::GridPointer(_) => out.push(CanonicalEvent::Pointer),
        Payload::SpriteOut(_) => out.push(CanonicalEvent::SpriteOut),
        Payload::SpriteRemoved(_) => out.push(CanonicalEvent::SpriteRemoved),
        Payload::SpriteClicked(_) => out.push(CanonicalEvent::SpriteClicked),
        Payload::BorderOverlap(_) => out.push(CanonicalEvent::BorderOverlap),
        Payload::SpriteCollision(collision) => {
            out.push(CanonicalEvent::SpriteCollision);
            out.push(match collision.overlap {
                Overlap::In => CanonicalEvent::OverlapIn,
                Overlap::Out => CanonicalEvent::OverlapOut,
            });
        }
        _ => {}
    }
    if msg.is_broadcast() {
        out.push(CanonicalEvent::BroadcastData);
    }
    out.push(CanonicalEvent::Data);
    out
}

// ─────────────────────────────────────────────────────────────────
// Enrichment
// ─────────────────────────────────────────────────────────────────

/// Attach the mirror's records to a message before the mirror changes.
///
/// Sprite references get a copy of the referenced sprite. Collision
/// participants are replaced by the mirror's records, keeping the wire
/// position, and a sprite with collision detection is listed first when
/// only one of the two has it.
pub fn enrich(msg: &mut DataMsg, mirror: &LocalMirror) {
    let snapshot = |id: &str| mirror.sprite(id).cloned();

    match &mut msg.payload {
        Payload::SpriteOut(r) | Payload::SpriteRemoved(r) => {
            if let Some(sprite) = snapshot(&r.id) {
                r.sprite = Some(sprite);
            }
        }
        Payload::SpriteClicked(click) => {
            if let Some(sprite) = snapshot(&click.id) {
                click.sprite = Some(sprite);
            }
        }
        Payload::BorderOverlap(overlap) => {
            if let Some(sprite) = snapshot(&overlap.id) {
                overlap.sprite = Some(sprite);
            }
        }
        Payload::SpriteCollision(collision) => {
            for participant in collision.sprites.iter_mut() {
                if let Some(known) = snapshot(&participant.id) {
                    *participant = with_wire_position(known, participant);
                }
            }
            if let [first, second] = collision.sprites.as_mut_slice() {
                if !first.detects_collisions() && second.detects_collisions() {
                    std::mem::swap(first, second);
                }
            }
        }
        _ => {}
    }
}

fn with_wire_position(mut known: Sprite, wire: &Sprite) -> Sprite {
    if wire.pos_x.is_some() {
        known.pos_x = wire.pos_x;
    }
    if wire.pos_y.is_some() {
        known.pos_y = wire.pos_y;
    }
    known
}

// ─────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────

/// Identifies one subscriber added with [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Slot and subscriber callbacks per canonical event.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    slots: HashMap<CanonicalEvent, Handler<Event>>,
    subscribers: HashMap<CanonicalEvent, Vec<(SubscriptionId, Handler<Event>)>>,
    next_id: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the single slot callback of `event`, replacing the previous one.
    pub fn set_slot(&mut self, event: CanonicalEvent, handler: Handler<Event>) {
        self.slots.insert(event, handler);
    }

    pub fn clear_slot(&mut self, event: CanonicalEvent) {
        self.slots.remove(&event);
    }

    /// Add a subscriber; with `replace`, existing subscribers of `event`
    /// are dropped first.
    pub fn register(
        &mut self,
        event: CanonicalEvent,
        handler: Handler<Event>,
        replace: bool,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let subscribers = self.subscribers.entry(event).or_default();
        if replace {
            subscribers.clear();
        }
        subscribers.push((id, handler));
        id
    }

    /// Remove one subscriber, or every subscriber of `event` when `id` is
    /// `None`. Returns how many were removed.
    pub fn unregister(&mut self, event: CanonicalEvent, id: Option<SubscriptionId>) -> usize {
        let Some(subscribers) = self.subscribers.get_mut(&event) else {
            return 0;
        };
        let before = subscribers.len();
        match id {
            Some(id) => subscribers.retain(|(sid, _)| *sid != id),
            None => subscribers.clear(),
        }
        before - subscribers.len()
    }

    /// Slot first, then subscribers in registration order.
    pub fn handlers_for(&self, event: CanonicalEvent) -> Vec<Handler<Event>> {
        let mut out: Vec<Handler<Event>> = self.slots.get(&event).cloned().into_iter().collect();
        if let Some(subscribers) = self.subscribers.get(&event) {
            out.extend(subscribers.iter().map(|(_, h)| h.clone()));
        }
        out
    }

    pub fn has_handlers(&self, event: CanonicalEvent) -> bool {
        self.slots.contains_key(&event)
            || self.subscribers.get(&event).is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phonelink_core::{classify, MsgHeader};

    fn data(raw: Value) -> Event {
        Event::Data(classify(&raw).unwrap())
    }

    #[test]
    fn test_event_names_and_aliases() {
        for event in CanonicalEvent::ALL {
            assert_eq!(event.as_str().parse::<CanonicalEvent>().unwrap(), event);
        }
        assert_eq!("collision".parse::<CanonicalEvent>().unwrap(), CanonicalEvent::SpriteCollision);
        assert_eq!(
            "object_collision".parse::<CanonicalEvent>().unwrap(),
            CanonicalEvent::SpriteCollision
        );
        assert_eq!("Clicked".parse::<CanonicalEvent>().unwrap(), CanonicalEvent::SpriteClicked);
        assert_eq!("acc".parse::<CanonicalEvent>().unwrap(), CanonicalEvent::Acceleration);
        assert_eq!("error_msg".parse::<CanonicalEvent>().unwrap(), CanonicalEvent::Error);
        assert!("nonsense".parse::<CanonicalEvent>().is_err());
    }

    #[test]
    fn test_key_dispatches_function_key() {
        let event = data(json!({"type": "key", "key": "F3", "device_id": "FooBar"}));
        assert_eq!(
            canonical_events(&event),
            vec![CanonicalEvent::Key, CanonicalEvent::F3, CanonicalEvent::Data]
        );

        let event = data(json!({"type": "key", "key": "a", "device_id": "FooBar"}));
        assert_eq!(canonical_events(&event), vec![CanonicalEvent::Key, CanonicalEvent::Data]);
    }

    #[test]
    fn test_sensor_and_broadcast() {
        let event = data(json!({
            "type": "gyro", "alpha": 1.0, "device_id": "FooBar", "broadcast": true
        }));
        assert_eq!(
            canonical_events(&event),
            vec![
                CanonicalEvent::Sensor,
                CanonicalEvent::Gyro,
                CanonicalEvent::BroadcastData,
                CanonicalEvent::Data
            ]
        );
    }

    #[test]
    fn test_sensor_fires_before_acceleration() {
        let event = data(json!({"type": "acceleration", "x": 1.0, "device_id": "FooBar"}));
        assert_eq!(
            canonical_events(&event),
            vec![
                CanonicalEvent::Sensor,
                CanonicalEvent::Acceleration,
                CanonicalEvent::Data
            ]
        );
    }

    #[test]
    fn test_collision_overlap_events() {
        let event = data(json!({
            "type": "sprite_collision", "device_id": "FooBar", "overlap": "out",
            "sprites": [{"id": "a"}, {"id": "b"}]
        }));
        assert_eq!(
            canonical_events(&event),
            vec![
                CanonicalEvent::SpriteCollision,
                CanonicalEvent::OverlapOut,
                CanonicalEvent::Data
            ]
        );
    }

    #[test]
    fn test_non_data_events() {
        assert_eq!(
            canonical_events(&Event::ClientDevice(None)),
            vec![CanonicalEvent::ClientDevice]
        );
        assert_eq!(
            canonical_events(&Event::Error(ErrorMsg::default())),
            vec![CanonicalEvent::Error]
        );
    }

    #[test]
    fn test_enrich_removed_sprite() {
        let mut mirror = LocalMirror::new();
        mirror.upsert_sprite(&Sprite::new("s1").colored("red"));

        let mut msg = classify(&json!({
            "type": "sprite_removed", "device_id": "FooBar", "sprite_id": "s1"
        }))
        .unwrap();
        enrich(&mut msg, &mirror);
        match msg.payload {
            Payload::SpriteRemoved(r) => {
                assert_eq!(r.sprite.unwrap().color.as_deref(), Some("red"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_enrich_collision_keeps_wire_position_and_orders() {
        let mut mirror = LocalMirror::new();
        let mut player = Sprite::new("player").colored("blue").at(1.0, 1.0);
        player.collision_detection = Some(true);
        mirror.upsert_sprite(&player);
        mirror.upsert_sprite(&Sprite::new("wall").colored("gray").at(50.0, 0.0));

        let mut msg = DataMsg::new(
            MsgHeader::new("FooBar", 1.0),
            Payload::SpriteCollision(phonelink_core::SpriteCollision {
                sprites: vec![Sprite::new("wall").at(50.0, 0.0), Sprite::new("player").at(45.0, 2.0)],
                overlap: Overlap::In,
            }),
        );
        enrich(&mut msg, &mirror);

        let Payload::SpriteCollision(c) = msg.payload else {
            panic!("collision expected");
        };
        assert_eq!(c.sprites[0].id, "player");
        assert_eq!(c.sprites[0].color.as_deref(), Some("blue"));
        assert_eq!(c.sprites[0].pos_x, Some(45.0));
        assert_eq!(c.sprites[1].id, "wall");
        assert_eq!(c.sprites[1].color.as_deref(), Some("gray"));
    }

    #[test]
    fn test_enrich_collision_keeps_wire_order_when_tied() {
        let mirror = LocalMirror::new();
        let mut msg = DataMsg::new(
            MsgHeader::new("FooBar", 1.0),
            Payload::SpriteCollision(phonelink_core::SpriteCollision {
                sprites: vec![Sprite::new("a"), Sprite::new("b")],
                overlap: Overlap::In,
            }),
        );
        enrich(&mut msg, &mirror);
        let Payload::SpriteCollision(c) = msg.payload else {
            panic!("collision expected");
        };
        assert_eq!(c.sprites[0].id, "a");
    }

    #[test]
    fn test_registry_order_replace_and_unregister() {
        let mut registry = CallbackRegistry::new();
        assert!(!registry.has_handlers(CanonicalEvent::Key));

        registry.set_slot(CanonicalEvent::Key, Handler::no_args(|| {}));
        let first = registry.register(CanonicalEvent::Key, Handler::payload(|_| {}), false);
        let _second = registry.register(CanonicalEvent::Key, Handler::payload(|_| {}), false);
        let handlers = registry.handlers_for(CanonicalEvent::Key);
        assert_eq!(handlers.len(), 3);
        assert!(matches!(handlers[0], Handler::NoArgs(_)));

        assert_eq!(registry.unregister(CanonicalEvent::Key, Some(first)), 1);
        assert_eq!(registry.handlers_for(CanonicalEvent::Key).len(), 2);

        registry.register(CanonicalEvent::Key, Handler::payload(|_| {}), true);
        assert_eq!(registry.handlers_for(CanonicalEvent::Key).len(), 2);

        assert_eq!(registry.unregister(CanonicalEvent::Key, None), 1);
        registry.clear_slot(CanonicalEvent::Key);
        assert!(!registry.has_handlers(CanonicalEvent::Key));
    }

    #[test]
    fn test_event_json() {
        let event = data(json!({"type": "key", "key": "up", "device_id": "FooBar", "time_stamp": 2.0}));
        let value = event.to_json();
        assert_eq!(value["type"], json!("key"));
        assert_eq!(value["key"], json!("up"));
        assert_eq!(event.time_stamp(), Some(2.0));
        assert_eq!(Event::Devices(vec![]).to_json(), json!([]));
    }
}
