//! phonelink library
//!
//! Client runtime for scripting a remote interactive phone display. This
//! crate only re-exports the workspace crates; see `phonelink-core` for the
//! domain model and `phonelink-client` for the connection runtime.

pub use phonelink_client as client;
pub use phonelink_core as core;

pub use phonelink_client::{
    init_config_dir, load_settings, save_settings, CanonicalEvent, Connector, DataFrame, Delivery,
    Event, Handler, JobHandle, Settings,
};
pub use phonelink_core::{
    Cell, DataMsg, Device, DeviceScope, DisplayConfigUpdate, Error, InputType, Line, Payload,
    Result, Sprite,
};

/// Everything a typical script needs.
pub mod prelude {
    pub use phonelink_client::{
        CanonicalEvent, Connector, DataFrame, Delivery, Event, Handler, JobHandle, Settings,
    };
    pub use phonelink_core::{
        Cell, DataMsg, Device, DeviceScope, DisplayConfigUpdate, InputType, Line, Payload,
        Sprite,
    };
}
