//! # phonelink-client - Connection Runtime
//!
//! Talks to the display server and turns its traffic into history, mirror
//! updates and callbacks. Depends on `phonelink-core` for the domain types.
//!
//! ## Public API
//!
//! ### Runtime (`connector`)
//! - [`Connector`] - One connection: commands, queries, prompts, scheduling
//! - [`SpriteBatch`], [`LineBatch`] - Stage several records, send once
//!
//! ### Dispatch (`dispatch`)
//! - [`Handler`] - Callback with a fixed argument shape
//! - [`CanonicalEvent`] - Dispatch keys and their aliases
//! - [`Event`] - What a callback receives
//!
//! ### Scheduling (`scheduler`)
//! - [`JobHandle`] - Running subscription: `elapsed()`, `stop()`
//! - [`DataFrame`] - Snapshot handed to periodic callbacks
//!
//! ### Wire and transport (`protocol`, `transport`)
//! - [`WireFrame`], [`Delivery`] - Frames and their addressing
//! - [`Transport`], [`WsTransport`] - Connection boundary
//!
//! ### Configuration (`config`)
//! - [`Settings`], [`load_settings()`], [`save_settings()`]
//!
//! ## Testing
//!
//! The `test-helpers` feature adds `ChannelTransport`, an in-memory
//! transport whose far end a test drives as the server.

pub mod config;
pub mod connector;
pub mod dispatch;
pub mod inbox;
pub mod protocol;
pub mod scheduler;
pub mod transport;

pub use config::{init_config_dir, load_settings, save_settings, Settings};
pub use connector::{Connector, LineBatch, SpriteBatch};
pub use dispatch::{CanonicalEvent, Event, Handler, SubscriptionId};
pub use inbox::{InboxChannel, InboxEntry};
pub use protocol::{Delivery, WireFrame};
pub use scheduler::{DataFrame, JobHandle, JobId, JobMode, JobState};
pub use transport::{Transport, WsTransport};

#[cfg(any(test, feature = "test-helpers"))]
pub use transport::{ChannelTransport, ServerEnd};
