//! Connector - the phonelink runtime
//!
//! A [`Connector`] owns one connection to the display server. It ingests
//! inbound frames on a background task, keeps history and the local mirror
//! current, dispatches events to callbacks, and exposes the command,
//! query, interaction and scheduling APIs (split over the submodules).
//!
//! ```text
//!  transport ──frames──▶ ingest task ──▶ RuntimeState::apply
//!                                             │
//!                       ┌─────────────────────┼──────────────────┐
//!                       ▼                     ▼                  ▼
//!              CorrelationInbox      dispatch / defer      reply frames
//! ```
//!
//! `Connector` is a cheap handle; clones share the same runtime.

mod batch;
mod commands;
mod interactions;
mod queries;
pub(crate) mod state;
mod subscriptions;

pub use batch::{LineBatch, SpriteBatch};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use phonelink_core::prelude::*;
use phonelink_core::{CorrelationClock, Payload};

use crate::config::Settings;
use crate::dispatch::{canonical_events, invoke_contained, CallbackRegistry, Event};
use crate::inbox::CorrelationInbox;
use crate::protocol::{events, Delivery, InboundEvent, WireFrame};
use crate::scheduler::JobRegistry;
use crate::transport::{Transport, WsTransport};
use state::{Identity, RuntimeState};

/// Pause before closing the transport so queued frames go out.
const DISCONNECT_GRACE: Duration = Duration::from_millis(200);

pub(crate) struct Inner {
    settings: Settings,
    identity: Identity,
    transport: Box<dyn Transport>,
    clock: CorrelationClock,
    state: Mutex<RuntimeState>,
    callbacks: Mutex<CallbackRegistry>,
    inbox: Mutex<CorrelationInbox>,
    jobs: JobRegistry,
    closed: watch::Sender<bool>,
    ended: watch::Sender<bool>,
}

/// Handle to a running phonelink runtime.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
    delivery: Delivery,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("device_id", &self.inner.identity.device_id)
            .field("delivery", &self.delivery)
            .field("connected", &self.inner.transport.is_connected())
            .finish()
    }
}

impl Connector {
    /// Connect to `settings.connection.server_url` over WebSocket.
    pub async fn connect(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let url = settings.connection.websocket_url()?;
        let (transport, inbound) = WsTransport::connect(&url).await?;
        Self::with_transport(settings, transport, inbound)
    }

    /// Start the runtime over any transport.
    ///
    /// Registers the device and spawns the ingestion task, so it must be
    /// called within a tokio runtime.
    pub fn with_transport(
        settings: Settings,
        transport: impl Transport,
        inbound: mpsc::Receiver<WireFrame>,
    ) -> Result<Self> {
        settings.validate()?;

        let identity = Identity {
            device_id: settings.connection.device_id.clone(),
            socket_id: transport.socket_id(),
        };
        let state = RuntimeState::new(
            settings.history.thresholds(),
            settings.history.record_on_start,
        );
        let inbox = CorrelationInbox::new(settings.correlation.max_queued_per_channel);
        let (closed, _) = watch::channel(false);
        let (ended, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            settings,
            identity,
            transport: Box::new(transport),
            clock: CorrelationClock::new(),
            state: Mutex::new(state),
            callbacks: Mutex::new(CallbackRegistry::new()),
            inbox: Mutex::new(inbox),
            jobs: JobRegistry::new(),
            closed,
            ended,
        });
        let connector = Self {
            inner,
            delivery: Delivery::Default,
        };

        connector.emit(events::NEW_DEVICE, Map::new(), &Delivery::Default)?;
        tokio::spawn(run_ingest(
            Arc::downgrade(&connector.inner),
            inbound,
            connector.inner.closed.subscribe(),
        ));

        info!("Connector started for '{}'", connector.device_id());
        Ok(connector)
    }

    /// A handle whose commands go out with `delivery` instead of to our
    /// own room.
    pub fn addressed(&self, delivery: Delivery) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            delivery,
        }
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn device_id(&self) -> &str {
        &self.inner.identity.device_id
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    // ─────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────

    /// Send one wire event.
    ///
    /// `time_stamp` and `device_id` are filled in when absent; the returned
    /// value is the `time_stamp` the frame carries.
    pub fn emit(
        &self,
        event: &str,
        mut payload: Map<String, Value>,
        delivery: &Delivery,
    ) -> Result<f64> {
        let time_stamp = match payload.get("time_stamp").and_then(Value::as_f64) {
            Some(ts) => ts,
            None => self.inner.clock.next(),
        };
        delivery.stamp(&mut payload, self.device_id(), time_stamp);

        trace!("-> {} {:?}", event, payload.get("type"));
        self.inner
            .transport
            .send(WireFrame::new(event, Value::Object(payload)))?;
        Ok(time_stamp)
    }

    /// Send a data message with this handle's delivery.
    pub fn send(&self, payload: Payload) -> Result<f64> {
        self.send_stamped(payload, None)
    }

    /// Send to every connected device.
    pub fn broadcast(&self, payload: Payload) -> Result<f64> {
        self.addressed(Delivery::Broadcast).send(payload)
    }

    /// Send only to the device with number `device_nr`.
    pub fn unicast_to(&self, payload: Payload, device_nr: i64) -> Result<f64> {
        self.addressed(Delivery::Unicast(device_nr)).send(payload)
    }

    /// Send a data message carrying a fixed correlation stamp.
    pub(crate) fn send_stamped(&self, payload: Payload, time_stamp: Option<f64>) -> Result<f64> {
        let mut fields = payload.to_fields();
        if let Some(ts) = time_stamp {
            fields.insert("time_stamp".into(), Value::from(ts));
        }
        self.emit(events::NEW_DATA, fields, &self.delivery)
    }

    /// Next correlation stamp.
    pub(crate) fn next_stamp(&self) -> f64 {
        self.inner.clock.next()
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    /// Run every callback registered for `event`, in order.
    pub fn dispatch(&self, event: &Event) {
        for canonical in canonical_events(event) {
            let handlers = self.callbacks().handlers_for(canonical);
            for handler in &handlers {
                invoke_contained(handler, canonical.as_str(), event, self);
            }
        }
    }

    fn ingest_frame(&self, frame: WireFrame) {
        let Some(inbound) = InboundEvent::parse(&frame) else {
            return;
        };

        let applied = self.state().apply(inbound, &self.inner.identity);

        for reply in applied.outbound {
            if let Err(e) = self.inner.transport.send(reply) {
                warn!("Failed to send reply frame: {}", e);
            }
        }
        if !applied.replies.is_empty() {
            let mut inbox = self.inbox();
            for (channel, stamp, entry) in applied.replies {
                inbox.deliver(channel, stamp, entry);
            }
        }

        let ready = self.state().defer_or_release(applied.events);
        for event in &ready {
            self.dispatch(event);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Cancel all jobs, let queued frames drain, then close the connection.
    pub async fn disconnect(&self) {
        let cancelled = self.inner.jobs.cancel_all();
        if cancelled > 0 {
            debug!("Cancelled {} job(s) on disconnect", cancelled);
        }
        if self.inner.transport.is_connected() {
            tokio::time::sleep(DISCONNECT_GRACE).await;
            self.inner.transport.close();
        }
        self.inner.closed.send_replace(true);
        info!("Disconnected '{}'", self.device_id());
    }

    /// Resolves once inbound traffic has ended.
    pub async fn wait(&self) {
        let mut ended = self.inner.ended.subscribe();
        let _ = ended.wait_for(|ended| *ended).await;
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn callbacks(&self) -> MutexGuard<'_, CallbackRegistry> {
        self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn inbox(&self) -> MutexGuard<'_, CorrelationInbox> {
        self.inner.inbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn jobs(&self) -> &JobRegistry {
        &self.inner.jobs
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            delivery: Delivery::Default,
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(Self::from_inner)
    }
}

async fn run_ingest(
    weak: Weak<Inner>,
    mut inbound: mpsc::Receiver<WireFrame>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
                continue;
            }
        };
        let Some(connector) = Connector::upgrade(&weak) else {
            break;
        };
        connector.ingest_frame(frame);
    }

    debug!("Inbound stream ended");
    if let Some(inner) = weak.upgrade() {
        inner.ended.send_replace(true);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::start;
    use super::*;
    use crate::transport::ChannelTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_registers_on_start() {
        let (connector, mut server) = start();
        let frame = server.next_sent().await.unwrap();
        assert_eq!(frame.event, events::NEW_DEVICE);
        assert_eq!(frame.payload["device_id"], json!("FooBar"));
        assert!(frame.payload["time_stamp"].is_f64());
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn test_emit_stamps_are_unique() {
        let (connector, _server) = start();
        let a = connector.emit(events::GET_DEVICES, Map::new(), &Delivery::Default).unwrap();
        let b = connector.emit(events::GET_DEVICES, Map::new(), &Delivery::Default).unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_addressed_handle_changes_delivery() {
        let (connector, mut server) = start();
        server.next_event(events::NEW_DEVICE).await.unwrap();

        connector
            .addressed(Delivery::Unicast(3))
            .send(Payload::ClearPlayground)
            .unwrap();
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["unicast_to"], json!(3));
        assert_eq!(frame.payload["type"], json!("clear_playground"));

        connector.broadcast(Payload::ClearPlayground).unwrap();
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["broadcast"], json!(true));
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (transport, inbound, _server) = ChannelTransport::pair(None);
        let settings = Settings::for_device("http://localhost:5000", "  ");
        assert!(matches!(
            Connector::with_transport(settings, transport, inbound),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_hang_up() {
        let (connector, mut server) = start();
        server.hang_up();
        tokio::time::timeout(Duration::from_secs(1), connector.wait())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_transport() {
        let (connector, server) = start();
        connector.disconnect().await;
        assert!(!server.is_open());
        assert!(!connector.is_connected());
        connector.wait().await;
        assert!(matches!(
            connector.send(Payload::ClearPlayground),
            Err(Error::NotConnected)
        ));
    }
}
