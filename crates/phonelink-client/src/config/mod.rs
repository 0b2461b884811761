//! Configuration loading

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings, save_settings};
pub use types::{
    ConnectionSettings, CorrelationSettings, HistorySettings, SchedulerSettings, Settings,
};
