//! # phonelink-core - Core Domain Types
//!
//! Foundation crate for phonelink. Provides the message model, history
//! store, local mirror of display entities, error handling and logging.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Messages (`message`, `events`, `device`)
//! - [`DataMsg`] - A classified data message (header + [`Payload`])
//! - [`classify()`] - Map a raw `new_data` object onto a [`DataMsg`]
//! - [`Frame`] - Latest key/acceleration/gyro/pointer messages of a device
//! - [`Device`], [`DeviceList`], [`RoomEvent`] - Presence records
//! - [`ErrorMsg`], [`InformationMsg`], [`AllDataSnapshot`] - Other server events
//!
//! ### History (`history`)
//! - [`HistoryStore`] - Bounded per-device, per-kind buffers plus current frames
//! - [`DeviceScope`] - One device or all of them
//!
//! ### Local Mirror (`mirror`)
//! - [`LocalMirror`] - Sprites, lines, grid and display configuration
//! - [`Sprite`], [`Line`] - Records merged field-by-field by id
//! - [`Grid`], [`GridInput`], [`Cell`] - Grid normalization and cell writes
//!
//! ### Correlation clock (`clock`)
//! - [`CorrelationClock`] - Strictly increasing outbound timestamps
//!
//! ### Error Handling (`error`)
//! - [`Error`], [`Result`], [`ResultExt`]
//!
//! ## Prelude
//!
//! ```rust
//! use phonelink_core::prelude::*;
//! ```

pub mod clock;
pub mod device;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod message;
pub mod mirror;

/// Prelude for common imports used throughout all phonelink crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use clock::{now_s, same_stamp, CorrelationClock};
pub use device::{Device, DeviceList, RoomEvent, UNASSIGNED_DEVICE_NR};
pub use error::{Error, Result, ResultExt};
pub use events::{AllDataSnapshot, ErrorMsg, InformationMsg};
pub use history::{DeviceScope, HistoryStore, Thresholds, ALL_DEVICES};
pub use message::{
    classify, kinds, Acceleration, AccelerationMsg, AlertConfirm, Border, BorderOverlap,
    ColorMsg, ColorPointer, ColorPointerMsg, DataMsg, Frame, FrameData, FrameKind, FunctionKey,
    GridMsg, GridPointer, GridPointerMsg, GridUpdate, Gyro, GyroMsg, InputPrompt, InputResponse,
    InputType, KeyMsg, KeyPress, MsgHeader, Notification, Overlap, Payload, PlaygroundConfig,
    RemoveById, SpriteClick, SpriteCollision, SpriteRef, Stamped,
};
pub use mirror::{
    Cell, DisplayConfig, DisplayConfigUpdate, Entity, Grid, GridInput, GridTarget, Line,
    LocalMirror, Movement, Sprite, SpriteForm,
};
