use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use parking_monitor::config::MonitorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PARKING_MONITOR_CONFIG",
        "PARKING_SOURCE_URL",
        "PARKING_DETECTOR",
        "PARKING_IOU_THRESHOLD",
        "PARKING_INTERVAL_SECS",
        "PARKING_SPOTS_PATH",
        "PARKING_NOTIFY_TRANSPORT",
        "PARKING_NOTIFY_RECIPIENT",
        "PARKING_SMTP_HOST",
        "PARKING_SMTP_PASSWORD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://lot");
    assert_eq!(cfg.source.target_fps, 10);
    assert_eq!(cfg.detector.backend, "background");
    assert_eq!(cfg.occupancy.iou_threshold, 0.4);
    assert_eq!(cfg.occupancy.interval, Duration::from_secs(10));
    assert_eq!(cfg.notify.transport, "log");
    assert_eq!(
        cfg.notify.snapshot_path.as_deref(),
        Some(std::path::Path::new("parking_status.jpg"))
    );
    assert!(cfg.load_spots().expect("spots").is_empty());
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": { "url": "/var/lib/lot/frames", "target_fps": 5, "width": 800, "height": 600 },
        "detector": { "cell_size": 8, "min_cells": 2 },
        "occupancy": { "iou_threshold": 0.5, "interval_secs": 30 },
        "spots": { "boxes": [[0, 0, 10, 10], [20, 0, 30, 10]] },
        "notify": {
            "transport": "spool",
            "recipient": "ops@example.com",
            "spool_dir": "/tmp/lot-outbox",
            "mqtt": { "topic_prefix": "lot/north" }
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("PARKING_MONITOR_CONFIG", file.path());
    std::env::set_var("PARKING_INTERVAL_SECS", "15");
    std::env::set_var("PARKING_NOTIFY_RECIPIENT", "night-shift@example.com");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "/var/lib/lot/frames");
    assert_eq!(cfg.source.target_fps, 5);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.detector.cell_size, 8);
    assert_eq!(cfg.detector.min_cells, 2);
    assert_eq!(cfg.detector.diff_threshold, 30.0);
    assert_eq!(cfg.occupancy.iou_threshold, 0.5);
    assert_eq!(cfg.occupancy.interval, Duration::from_secs(15));
    assert_eq!(cfg.notify.transport, "spool");
    assert_eq!(cfg.notify.recipient, "night-shift@example.com");
    assert_eq!(cfg.notify.mqtt.topic_prefix, "lot/north");
    assert_eq!(cfg.notify.mqtt.broker_addr, "127.0.0.1:1883");
    assert_eq!(cfg.load_spots().expect("spots").len(), 2);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[occupancy]
iou_threshold = 0.25

[notify]
transport = "LOG"
subject = "Lot A"
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = MonitorConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.occupancy.iou_threshold, 0.25);
    assert_eq!(cfg.notify.transport, "log");
    assert_eq!(cfg.notify.subject, "Lot A");
}

#[test]
fn spots_file_wins_over_inline_boxes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut spots = NamedTempFile::new().expect("temp spots");
    spots
        .write_all(br#"{"spots": [[5, 5, 50, 50]]}"#)
        .expect("write spots");
    std::env::set_var("PARKING_SPOTS_PATH", spots.path());

    let cfg = MonitorConfig::load().expect("load config");
    let set = cfg.load_spots().expect("spots");
    assert_eq!(set.len(), 1);
    assert_eq!(set.get(0).expect("spot").bbox.x2, 50.0);

    clear_env();
}

#[test]
fn smtp_relay_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[notify]
transport = "smtp"
sender = "lot-camera@example.com"
recipient = "ops@example.com"

[notify.smtp]
port = 2525
security = "NONE"
username = "lot"
timeout_secs = 5
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    assert!(
        MonitorConfig::load_from(Some(file.path())).is_err(),
        "smtp needs a relay host"
    );

    std::env::set_var("PARKING_SMTP_HOST", "mail.example.com");
    std::env::set_var("PARKING_SMTP_PASSWORD", "hunter2");
    let cfg = MonitorConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.notify.transport, "smtp");
    assert_eq!(cfg.notify.smtp.host.as_deref(), Some("mail.example.com"));
    assert_eq!(cfg.notify.smtp.port, Some(2525));
    assert_eq!(cfg.notify.smtp.security, "none");
    assert_eq!(cfg.notify.smtp.username.as_deref(), Some("lot"));
    assert_eq!(cfg.notify.smtp.password.as_deref(), Some("hunter2"));
    assert_eq!(cfg.notify.smtp.timeout, Duration::from_secs(5));

    std::env::remove_var("PARKING_SMTP_PASSWORD");
    assert!(
        MonitorConfig::load_from(Some(file.path())).is_err(),
        "username without password"
    );
    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PARKING_IOU_THRESHOLD", "1.5");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("PARKING_INTERVAL_SECS", "0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("PARKING_NOTIFY_TRANSPORT", "spool");
    assert!(MonitorConfig::load().is_err(), "spool needs a recipient");
    clear_env();

    std::env::set_var("PARKING_DETECTOR", "tract");
    assert!(MonitorConfig::load().is_err(), "tract needs a model path");
    clear_env();

    std::env::set_var("PARKING_NOTIFY_TRANSPORT", "carrier-pigeon");
    assert!(MonitorConfig::load().is_err());
    clear_env();
}
