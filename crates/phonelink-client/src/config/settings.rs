//! Settings parser for .phonelink/config.toml

use std::path::Path;

use phonelink_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const PHONELINK_DIR: &str = ".phonelink";

/// Load settings from `.phonelink/config.toml` under `dir`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(dir: &Path) -> Settings {
    let config_path = dir.join(PHONELINK_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write settings to `.phonelink/config.toml` under `dir`
///
/// The file is written to a temporary path first and renamed into place.
pub fn save_settings(dir: &Path, settings: &Settings) -> Result<()> {
    let phonelink_dir = dir.join(PHONELINK_DIR);
    if !phonelink_dir.exists() {
        std::fs::create_dir_all(&phonelink_dir)
            .map_err(|e| Error::config(format!("Failed to create .phonelink dir: {}", e)))?;
    }

    let config_path = phonelink_dir.join(CONFIG_FILENAME);
    let temp_path = phonelink_dir.join(".config.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", CONFIG_HEADER, content);

    std::fs::write(&temp_path, &full_content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, &config_path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    debug!("Saved settings to {:?}", config_path);
    Ok(())
}

/// Create `.phonelink/config.toml` with defaults unless it already exists
///
/// Returns `true` when a file was written.
pub fn init_config_dir(dir: &Path) -> Result<bool> {
    let config_path = dir.join(PHONELINK_DIR).join(CONFIG_FILENAME);
    if config_path.exists() {
        return Ok(false);
    }
    save_settings(dir, &Settings::default())?;
    info!("Created default config at {:?}", config_path);
    Ok(true)
}

const CONFIG_HEADER: &str = "\
# phonelink configuration
#
# [connection]   server_url, device_id
# [history]      stream_threshold (acceleration/gyro), default_threshold, record_on_start
# [scheduler]    interval_ms, min_interval_ms
# [correlation]  prompt_timeout_ms, alert_timeout_ms, device_nr_timeout_ms,
#                max_queued_per_channel

";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_load_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let phonelink_dir = dir.path().join(PHONELINK_DIR);
        std::fs::create_dir_all(&phonelink_dir).unwrap();
        std::fs::write(phonelink_dir.join(CONFIG_FILENAME), "[connection\nbroken").unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::for_device("https://display.example.org", "Kitchen");
        settings.history.record_on_start = true;
        settings.correlation.alert_timeout_ms = Some(30_000);

        save_settings(dir.path(), &settings).unwrap();
        let loaded = load_settings(dir.path());
        assert_eq!(loaded, settings);

        let raw =
            std::fs::read_to_string(dir.path().join(PHONELINK_DIR).join(CONFIG_FILENAME)).unwrap();
        assert!(raw.starts_with("# phonelink configuration"));
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let dir = tempdir().unwrap();
        assert!(init_config_dir(dir.path()).unwrap());

        let custom = Settings::for_device("http://localhost:5000", "Mine");
        save_settings(dir.path(), &custom).unwrap();
        assert!(!init_config_dir(dir.path()).unwrap());
        assert_eq!(load_settings(dir.path()).connection.device_id, "Mine");
    }
}
