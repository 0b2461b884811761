//! Integration tests for settings files driving the runtime

use std::fs;

use serde_json::json;
use tempfile::TempDir;

use phonelink::client::protocol::events;
use phonelink::client::ChannelTransport;
use phonelink::prelude::*;
use phonelink::{init_config_dir, load_settings};

fn write_config(dir: &TempDir, content: &str) {
    let config_dir = dir.path().join(".phonelink");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), content).unwrap();
}

#[test]
fn test_init_writes_loadable_defaults() {
    let dir = TempDir::new().unwrap();
    assert!(init_config_dir(dir.path()).unwrap());
    assert!(!init_config_dir(dir.path()).unwrap());

    let content = fs::read_to_string(dir.path().join(".phonelink/config.toml")).unwrap();
    assert!(content.starts_with("# phonelink configuration"));
    assert_eq!(load_settings(dir.path()), Settings::default());
}

#[tokio::test]
async fn test_history_threshold_from_file() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[connection]
device_id = "Lab42"

[history]
default_threshold = 2
"#,
    );
    let settings = load_settings(dir.path());
    assert_eq!(settings.connection.device_id, "Lab42");

    let (transport, inbound, mut server) = ChannelTransport::pair(None);
    let connector = Connector::with_transport(settings, transport, inbound).unwrap();
    let registration = server.next_event(events::NEW_DEVICE).await.unwrap();
    assert_eq!(registration.payload["device_id"], json!("Lab42"));

    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        server
            .push_data(json!({"type": "key", "key": key, "time_stamp": i as f64, "device_id": "Lab42"}))
            .await;
    }
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }

    let keys: Vec<_> = connector
        .key_data(&DeviceScope::All)
        .into_iter()
        .map(|k| k.data.key)
        .collect();
    assert_eq!(keys, vec!["b", "c"]);
}

#[tokio::test]
async fn test_invalid_server_url_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[connection]\nserver_url = \"ftp://example.com\"\n");
    let settings = load_settings(dir.path());

    let (transport, inbound, _server) = ChannelTransport::pair(None);
    let err = Connector::with_transport(settings, transport, inbound).unwrap_err();
    assert!(err.to_string().contains("ftp"));
}
