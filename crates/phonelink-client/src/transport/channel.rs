//! In-memory transport for tests
//!
//! [`ChannelTransport::pair`] returns the transport, the inbound receiver to
//! hand to the runtime, and a [`ServerEnd`] the test drives as the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use phonelink_core::prelude::*;

use super::{Transport, INBOUND_CAPACITY};
use crate::protocol::{events, WireFrame};

#[derive(Debug)]
pub struct ChannelTransport {
    sent_tx: mpsc::UnboundedSender<WireFrame>,
    connected: Arc<AtomicBool>,
    socket_id: Option<String>,
}

impl ChannelTransport {
    pub fn pair(socket_id: Option<String>) -> (Self, mpsc::Receiver<WireFrame>, ServerEnd) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let transport = Self {
            sent_tx,
            connected: Arc::clone(&connected),
            socket_id,
        };
        let server = ServerEnd {
            inbound_tx: Some(inbound_tx),
            sent_rx,
            connected,
        };
        (transport, inbound_rx, server)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: WireFrame) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.sent_tx.send(frame).map_err(|_| Error::ChannelClosed)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn socket_id(&self) -> Option<String> {
        self.socket_id.clone()
    }
}

/// The "server" side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ServerEnd {
    inbound_tx: Option<mpsc::Sender<WireFrame>>,
    sent_rx: mpsc::UnboundedReceiver<WireFrame>,
    connected: Arc<AtomicBool>,
}

impl ServerEnd {
    /// Deliver one frame to the runtime.
    pub async fn push(&self, event: &str, payload: Value) {
        if let Some(tx) = &self.inbound_tx {
            let _ = tx.send(WireFrame::new(event, payload)).await;
        }
    }

    /// Deliver a `new_data` frame.
    pub async fn push_data(&self, payload: Value) {
        self.push(events::NEW_DATA, payload).await;
    }

    /// Next frame the runtime sent, waiting for it.
    pub async fn next_sent(&mut self) -> Option<WireFrame> {
        self.sent_rx.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<WireFrame> {
        self.sent_rx.try_recv().ok()
    }

    /// Skip sent frames until one with `event` arrives.
    pub async fn next_event(&mut self, event: &str) -> Option<WireFrame> {
        while let Some(frame) = self.sent_rx.recv().await {
            if frame.event == event {
                return Some(frame);
            }
        }
        None
    }

    /// Everything sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<WireFrame> {
        std::iter::from_fn(|| self.try_next_sent()).collect()
    }

    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// End the inbound stream, as if the server went away.
    pub fn hang_up(&mut self) {
        self.inbound_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut inbound, mut server) = ChannelTransport::pair(Some("sock-1".into()));
        assert_eq!(transport.socket_id().as_deref(), Some("sock-1"));

        transport
            .send(WireFrame::new(events::GET_DEVICES, Value::Null))
            .unwrap();
        assert_eq!(server.next_sent().await.unwrap().event, events::GET_DEVICES);

        server.push_data(json!({"type": "key"})).await;
        assert_eq!(inbound.recv().await.unwrap().event, events::NEW_DATA);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_sends() {
        let (transport, _inbound, server) = ChannelTransport::pair(None);
        transport.close();
        assert!(!server.is_open());
        assert!(matches!(
            transport.send(WireFrame::new(events::GET_DEVICES, Value::Null)),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_hang_up_ends_inbound() {
        let (_transport, mut inbound, mut server) = ChannelTransport::pair(None);
        server.hang_up();
        assert!(inbound.recv().await.is_none());
    }
}
