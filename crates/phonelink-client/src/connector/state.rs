//! Runtime state and the inbound state transition
//!
//! [`RuntimeState::apply`] is the single place inbound traffic mutates
//! history, the local mirror and presence. It does not dispatch anything:
//! it returns the events to dispatch, the replies for the correlation inbox
//! and any frames to send back, and the caller acts on them after the lock
//! is released.

use serde_json::json;

use phonelink_core::prelude::*;
use phonelink_core::{
    kinds, now_s, AllDataSnapshot, DataMsg, Device, DeviceList, HistoryStore, LocalMirror,
    Payload, RoomEvent, Sprite, Thresholds,
};

use crate::dispatch::{enrich, Event};
use crate::inbox::{InboxChannel, InboxEntry};
use crate::protocol::{events, InboundEvent, WireFrame};
use crate::scheduler::JobId;

/// Who "we" are when interpreting inbound traffic.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub device_id: String,
    pub socket_id: Option<String>,
}

impl Identity {
    /// Whether `device` is this connection.
    ///
    /// Matched by socket id when the transport knows it, otherwise any
    /// non-display device registered under our device id.
    pub fn is_self(&self, device: &Device) -> bool {
        match &self.socket_id {
            Some(socket_id) => &device.socket_id == socket_id,
            None => device.device_id == self.device_id && !device.is_client,
        }
    }
}

/// What an inbound frame produced besides state changes.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub events: Vec<Event>,
    pub replies: Vec<(InboxChannel, f64, InboxEntry)>,
    pub outbound: Vec<WireFrame>,
}

/// Everything the runtime knows, behind one lock.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub history: HistoryStore,
    pub mirror: LocalMirror,
    pub devices: DeviceList,
    pub device: Option<Device>,
    pub room_members: Vec<Device>,
    pub joined_rooms: Vec<String>,
    /// The blocking job currently draining dispatch, if any.
    pub blocking: Option<JobId>,
    deferred: Vec<(f64, Event)>,
    /// Stamp of the newest data message seen; orders undated deferred events.
    last_data_stamp: f64,
    snapshot_received: bool,
    client_present: bool,
}

impl RuntimeState {
    pub fn new(thresholds: Thresholds, record: bool) -> Self {
        let mut history = HistoryStore::new(thresholds);
        if record {
            history.start_recording();
        }
        Self {
            history,
            mirror: LocalMirror::new(),
            devices: DeviceList::default(),
            device: None,
            room_members: Vec::new(),
            joined_rooms: Vec::new(),
            blocking: None,
            deferred: Vec::new(),
            last_data_stamp: 0.0,
            snapshot_received: false,
            client_present: false,
        }
    }

    pub fn apply(&mut self, inbound: InboundEvent, me: &Identity) -> Applied {
        let mut out = Applied::default();
        match inbound {
            InboundEvent::NewData(msg) => self.apply_data(msg, me, &mut out),
            InboundEvent::AllData(snapshot) => self.apply_snapshot(snapshot, me, &mut out),
            InboundEvent::Device(device) => self.apply_device(device, me, &mut out),
            InboundEvent::Devices(list) => self.apply_devices(list, me, &mut out),
            InboundEvent::Error(err) => {
                warn!("Server reported an error: {}", err.msg);
                out.events.push(Event::Error(err));
            }
            InboundEvent::Information(info) => match info.action_time_stamp() {
                Some(stamp) => out.replies.push((
                    InboxChannel::Information,
                    stamp,
                    InboxEntry::Information(info),
                )),
                None => debug!("Ignoring information without action stamp: {}", info.message),
            },
            InboundEvent::RoomJoined(ev) => self.apply_room_joined(ev, me, &mut out),
            InboundEvent::RoomLeft(ev) => self.apply_room_left(ev, me, &mut out),
        }
        out
    }

    fn apply_data(&mut self, mut msg: DataMsg, me: &Identity, out: &mut Applied) {
        enrich(&mut msg, &self.mirror);
        self.history.ingest(&msg);
        self.last_data_stamp = self.last_data_stamp.max(msg.time_stamp());

        if msg.device_id() == me.device_id {
            self.apply_to_mirror(&msg.payload);
        }
        if let Some(channel) = InboxChannel::for_kind(msg.kind()) {
            out.replies
                .push((channel, msg.time_stamp(), InboxEntry::Data(msg.clone())));
        }
        out.events.push(Event::Data(msg));
    }

    /// Mirror side effects of a payload about our own surface, inbound or
    /// sent by us.
    pub fn apply_to_mirror(&mut self, payload: &Payload) {
        let mirror = &mut self.mirror;
        match payload {
            Payload::Sprite(sprite) => mirror.upsert_sprite(sprite),
            Payload::Sprites(sprites) => sprites.iter().for_each(|s| mirror.upsert_sprite(s)),
            Payload::SpriteRemoved(r) => {
                mirror.remove_sprite(&r.id);
            }
            Payload::RemoveSprite(r) => {
                mirror.remove_sprite(&r.id);
            }
            Payload::Line(line) => mirror.upsert_line(line),
            Payload::Lines(lines) => lines.iter().for_each(|l| mirror.upsert_line(l)),
            Payload::RemoveLine(r) => {
                mirror.remove_line(&r.id);
            }
            Payload::Grid(grid) => mirror.set_grid(&grid.grid),
            Payload::GridUpdate(update) => {
                if let Some(target) = update.target() {
                    if let Err(e) = mirror.apply_grid_write(target, update.color.clone()) {
                        debug!("Ignoring grid update: {}", e);
                    }
                }
            }
            Payload::PlaygroundConfig(config) => mirror.configure_display(&config.config),
            Payload::ClearPlayground => mirror.clear_display(),
            _ => {}
        }
    }

    fn apply_snapshot(&mut self, snapshot: AllDataSnapshot, me: &Identity, out: &mut Applied) {
        self.history
            .replace_device(&snapshot.device_id, snapshot.data.clone());

        let own_sprites = (snapshot.device_id == me.device_id)
            .then(|| snapshot.data.get(kinds::SPRITE))
            .flatten();
        if let Some(msgs) = own_sprites {
            let sprites: Vec<Sprite> = msgs
                .iter()
                .filter_map(|msg| match &msg.payload {
                    Payload::Sprite(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();

            if self.snapshot_received {
                self.mirror.sprites.replace_all(sprites);
            } else {
                for sprite in sprites.iter().filter(|s| !s.id.is_empty()) {
                    if !self.mirror.sprites.contains(&sprite.id) {
                        self.mirror.upsert_sprite(sprite);
                    }
                }
            }
        }

        self.snapshot_received = true;
        out.events.push(Event::AllData(snapshot));
    }

    fn apply_device(&mut self, device: Device, me: &Identity, out: &mut Applied) {
        if !me.is_self(&device) {
            debug!("Ignoring device record of {}", device.socket_id);
            return;
        }
        info!(
            "Registered as '{}' (device nr {})",
            device.device_id, device.device_nr
        );
        self.device = Some(device.clone());
        self.history.ensure_device(&device.device_id);
        self.room_members
            .retain(|member| member.socket_id != device.socket_id);
        self.room_members.push(device.clone());

        out.outbound.push(WireFrame::new(
            events::GET_ALL_DATA,
            json!({"device_id": me.device_id, "time_stamp": now_s()}),
        ));
        out.events.push(Event::Device(device));
    }

    fn apply_devices(&mut self, list: DeviceList, me: &Identity, out: &mut Applied) {
        let client = list.client_for(&me.device_id).cloned();
        let devices = list.devices.clone();
        self.devices = list;

        if client.is_some() != self.client_present {
            self.client_present = client.is_some();
            out.events.push(Event::ClientDevice(client));
        }
        out.events.push(Event::Devices(devices));
    }

    fn apply_room_joined(&mut self, ev: RoomEvent, me: &Identity, out: &mut Applied) {
        if ev.room == me.device_id {
            if !self.room_members.contains(&ev.device) {
                self.room_members.push(ev.device.clone());
                out.events.push(Event::RoomJoined(ev.device));
            }
        } else if ev.device.device_id == me.device_id && !self.joined_rooms.contains(&ev.room) {
            self.joined_rooms.push(ev.room);
        }
    }

    fn apply_room_left(&mut self, ev: RoomEvent, me: &Identity, out: &mut Applied) {
        if ev.room == me.device_id {
            if let Some(pos) = self.room_members.iter().position(|m| *m == ev.device) {
                self.room_members.remove(pos);
                out.events.push(Event::RoomLeft(ev.device));
            }
        } else if ev.device.device_id == me.device_id {
            self.joined_rooms.retain(|room| *room != ev.room);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Deferred dispatch
    // ─────────────────────────────────────────────────────────────

    /// Queue `events` while a blocking job owns dispatch; otherwise hand
    /// them back for immediate dispatch.
    pub fn defer_or_release(&mut self, events: Vec<Event>) -> Vec<Event> {
        if self.blocking.is_none() {
            return events;
        }
        for event in events {
            let key = event.time_stamp().unwrap_or(self.last_data_stamp);
            self.deferred.push((key, event));
        }
        Vec::new()
    }

    /// Take every deferred event, oldest timestamp first. Events with equal
    /// stamps keep their arrival order; events without a stamp sort right
    /// after the newest data message that preceded them.
    pub fn take_deferred(&mut self) -> Vec<Event> {
        let mut deferred = std::mem::take(&mut self.deferred);
        deferred.sort_by(|a, b| a.0.total_cmp(&b.0));
        deferred.into_iter().map(|(_, event)| event).collect()
    }

    #[cfg(test)]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}
