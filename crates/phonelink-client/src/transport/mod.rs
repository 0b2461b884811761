//! Transport boundary
//!
//! A transport moves [`WireFrame`]s between the runtime and the display
//! server. Outbound sends never block: implementations queue the frame and
//! deliver it from their own task. Inbound frames are handed over on an
//! `mpsc` receiver returned alongside the transport.

pub mod socketio;
pub mod ws;

#[cfg(any(test, feature = "test-helpers"))]
pub mod channel;

use phonelink_core::prelude::*;

use crate::protocol::WireFrame;

pub use ws::{ConnectionState, WsTransport};

#[cfg(any(test, feature = "test-helpers"))]
pub use channel::{ChannelTransport, ServerEnd};

/// Capacity of the inbound frame channel.
pub const INBOUND_CAPACITY: usize = 256;

/// Sending side of a connection to the display server.
pub trait Transport: Send + Sync + 'static {
    /// Queue one frame for sending.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] once the connection is gone.
    fn send(&self, frame: WireFrame) -> Result<()>;

    /// Close the connection. The inbound receiver ends afterwards.
    fn close(&self);

    fn is_connected(&self) -> bool;

    /// Server-assigned session id, when the transport knows it.
    fn socket_id(&self) -> Option<String> {
        None
    }
}
