use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::BoundingBox;
use crate::matcher::DEFAULT_IOU_THRESHOLD;
use crate::scheduler::DEFAULT_INTERVAL_SECS;
use crate::spots::SpotSet;

const DEFAULT_SOURCE_URL: &str = "stub://lot";
const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SEED: u64 = 7;
const DEFAULT_SCENE_PERIOD: u64 = 50;

const DEFAULT_BACKEND: &str = "background";
const DEFAULT_MODEL_INPUT: u32 = 416;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_NMS: f32 = 0.4;
const DEFAULT_CELL_SIZE: u32 = 16;
const DEFAULT_DIFF_THRESHOLD: f32 = 30.0;
const DEFAULT_MIN_CELLS: usize = 4;

const DEFAULT_TRANSPORT: &str = "log";
const DEFAULT_SENDER: &str = "parking-monitor@localhost";
const DEFAULT_SUBJECT: &str = "Parking Spot Occupancy Change Detected";
const DEFAULT_BODY: &str = "The occupancy status of the parking spots has changed.";
const DEFAULT_SNAPSHOT_PATH: &str = "parking_status.jpg";
const DEFAULT_SPOOL_DIR: &str = "outbox";
const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_CLIENT_ID: &str = "parking_monitor";
const DEFAULT_MQTT_PREFIX: &str = "parking";
const DEFAULT_JPEG_QUALITY: u8 = 85;
const DEFAULT_SMTP_SECURITY: &str = "starttls";
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

const BACKENDS: [&str; 2] = ["background", "tract"];
const TRANSPORTS: [&str; 5] = ["log", "spool", "mqtt", "webhook", "smtp"];
const SMTP_SECURITY: [&str; 3] = ["starttls", "tls", "none"];

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    occupancy: Option<OccupancyConfigFile>,
    spots: Option<SpotsConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    seed: Option<u64>,
    scene_period: Option<u64>,
    synthetic_slots: Option<Vec<BoundingBox>>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    classes: Option<Vec<usize>>,
    cell_size: Option<u32>,
    diff_threshold: Option<f32>,
    min_cells: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct OccupancyConfigFile {
    iou_threshold: Option<f32>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SpotsConfigFile {
    path: Option<PathBuf>,
    boxes: Option<Vec<BoundingBox>>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    transport: Option<String>,
    sender: Option<String>,
    recipient: Option<String>,
    subject: Option<String>,
    body_text: Option<String>,
    snapshot_path: Option<String>,
    spool_dir: Option<PathBuf>,
    webhook_url: Option<String>,
    jpeg_quality: Option<u8>,
    mqtt: Option<MqttConfigFile>,
    smtp: Option<SmtpConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SmtpConfigFile {
    host: Option<String>,
    port: Option<u16>,
    security: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub occupancy: OccupancySettings,
    pub spots: SpotsSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub scene_period: u64,
    /// Synthetic scene layout; defaults to four slots along the bottom.
    pub synthetic_slots: Option<Vec<BoundingBox>>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub classes: Option<Vec<usize>>,
    pub cell_size: u32,
    pub diff_threshold: f32,
    pub min_cells: usize,
}

#[derive(Debug, Clone)]
pub struct OccupancySettings {
    pub iou_threshold: f32,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SpotsSettings {
    pub path: Option<PathBuf>,
    pub boxes: Vec<BoundingBox>,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub transport: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body_text: String,
    pub snapshot_path: Option<PathBuf>,
    pub spool_dir: PathBuf,
    pub webhook_url: Option<String>,
    pub jpeg_quality: u8,
    pub mqtt: MqttSettings,
    pub smtp: SmtpSettings,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker_addr: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Mail relay for the `smtp` transport.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: Option<String>,
    /// Defaults to the port implied by `security` (587, 465 or 25).
    pub port: Option<u16>,
    /// `starttls`, `tls` (implicit TLS) or `none`.
    pub security: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            seed: DEFAULT_SEED,
            scene_period: DEFAULT_SCENE_PERIOD,
            synthetic_slots: None,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            confidence_threshold: DEFAULT_CONFIDENCE,
            nms_threshold: DEFAULT_NMS,
            classes: None,
            cell_size: DEFAULT_CELL_SIZE,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            min_cells: DEFAULT_MIN_CELLS,
        }
    }
}

impl Default for OccupancySettings {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            transport: DEFAULT_TRANSPORT.to_string(),
            sender: DEFAULT_SENDER.to_string(),
            recipient: String::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            body_text: DEFAULT_BODY.to_string(),
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            webhook_url: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            mqtt: MqttSettings::default(),
            smtp: SmtpSettings::default(),
        }
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            security: DEFAULT_SMTP_SECURITY.to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(DEFAULT_SMTP_TIMEOUT_SECS),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_MQTT_BROKER.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            topic_prefix: DEFAULT_MQTT_PREFIX.to_string(),
            username: None,
            password: None,
        }
    }
}

impl MonitorConfig {
    /// Load from `PARKING_MONITOR_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARKING_MONITOR_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (JSON, or TOML by extension), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let defaults = SourceSettings::default();
        let source = SourceSettings {
            url: source_file.url.unwrap_or(defaults.url),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            seed: source_file.seed.unwrap_or(defaults.seed),
            scene_period: source_file.scene_period.unwrap_or(defaults.scene_period),
            synthetic_slots: source_file.synthetic_slots,
        };

        let det_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: det_file.backend.unwrap_or(defaults.backend),
            model_path: det_file.model_path,
            input_width: det_file.input_width.unwrap_or(defaults.input_width),
            input_height: det_file.input_height.unwrap_or(defaults.input_height),
            confidence_threshold: det_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            nms_threshold: det_file.nms_threshold.unwrap_or(defaults.nms_threshold),
            classes: det_file.classes,
            cell_size: det_file.cell_size.unwrap_or(defaults.cell_size),
            diff_threshold: det_file.diff_threshold.unwrap_or(defaults.diff_threshold),
            min_cells: det_file.min_cells.unwrap_or(defaults.min_cells),
        };

        let occ_file = file.occupancy.unwrap_or_default();
        let occupancy = OccupancySettings {
            iou_threshold: occ_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            interval: Duration::from_secs(occ_file.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)),
        };

        let spots_file = file.spots.unwrap_or_default();
        let spots = SpotsSettings {
            path: spots_file.path,
            boxes: spots_file.boxes.unwrap_or_default(),
        };

        let notify_file = file.notify.unwrap_or_default();
        let defaults = NotifySettings::default();
        let mqtt_file = notify_file.mqtt.unwrap_or_default();
        let smtp_file = notify_file.smtp.unwrap_or_default();
        let notify = NotifySettings {
            transport: notify_file.transport.unwrap_or(defaults.transport),
            sender: notify_file.sender.unwrap_or(defaults.sender),
            recipient: notify_file.recipient.unwrap_or(defaults.recipient),
            subject: notify_file.subject.unwrap_or(defaults.subject),
            body_text: notify_file.body_text.unwrap_or(defaults.body_text),
            snapshot_path: match notify_file.snapshot_path {
                Some(path) if path.trim().is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => defaults.snapshot_path,
            },
            spool_dir: notify_file.spool_dir.unwrap_or(defaults.spool_dir),
            webhook_url: notify_file.webhook_url,
            jpeg_quality: notify_file.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            mqtt: MqttSettings {
                broker_addr: mqtt_file.broker_addr.unwrap_or(defaults.mqtt.broker_addr),
                client_id: mqtt_file.client_id.unwrap_or(defaults.mqtt.client_id),
                topic_prefix: mqtt_file.topic_prefix.unwrap_or(defaults.mqtt.topic_prefix),
                username: mqtt_file.username,
                password: mqtt_file.password,
            },
            smtp: SmtpSettings {
                host: smtp_file.host,
                port: smtp_file.port,
                security: smtp_file.security.unwrap_or(defaults.smtp.security),
                username: smtp_file.username,
                password: smtp_file.password,
                timeout: smtp_file
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.smtp.timeout),
            },
        };

        Self {
            source,
            detector,
            occupancy,
            spots,
            notify,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PARKING_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("PARKING_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("PARKING_IOU_THRESHOLD") {
            self.occupancy.iou_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("PARKING_IOU_THRESHOLD must be a number"))?;
        }
        if let Ok(interval) = std::env::var("PARKING_INTERVAL_SECS") {
            let seconds: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("PARKING_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.occupancy.interval = Duration::from_secs(seconds);
        }
        if let Ok(path) = std::env::var("PARKING_SPOTS_PATH") {
            if !path.trim().is_empty() {
                self.spots.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(transport) = std::env::var("PARKING_NOTIFY_TRANSPORT") {
            if !transport.trim().is_empty() {
                self.notify.transport = transport.trim().to_string();
            }
        }
        if let Ok(recipient) = std::env::var("PARKING_NOTIFY_RECIPIENT") {
            if !recipient.trim().is_empty() {
                self.notify.recipient = recipient;
            }
        }
        if let Ok(host) = std::env::var("PARKING_SMTP_HOST") {
            if !host.trim().is_empty() {
                self.notify.smtp.host = Some(host.trim().to_string());
            }
        }
        if let Ok(password) = std::env::var("PARKING_SMTP_PASSWORD") {
            if !password.is_empty() {
                self.notify.smtp.password = Some(password);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let threshold = self.occupancy.iou_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "iou_threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if self.occupancy.interval.is_zero() {
            return Err(anyhow!("interval_secs must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if !BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {:?})",
                self.detector.backend,
                BACKENDS
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("tract backend requires detector.model_path"));
        }
        self.notify.transport = self.notify.transport.to_lowercase();
        if !TRANSPORTS.contains(&self.notify.transport.as_str()) {
            return Err(anyhow!(
                "unknown notify transport '{}' (expected one of {:?})",
                self.notify.transport,
                TRANSPORTS
            ));
        }
        if self.notify.transport != "log" && self.notify.recipient.trim().is_empty() {
            return Err(anyhow!(
                "notify.recipient is required for the {} transport",
                self.notify.transport
            ));
        }
        if self.notify.transport == "webhook" && self.notify.webhook_url.is_none() {
            return Err(anyhow!("webhook transport requires notify.webhook_url"));
        }
        self.notify.smtp.security = self.notify.smtp.security.to_lowercase();
        if !SMTP_SECURITY.contains(&self.notify.smtp.security.as_str()) {
            return Err(anyhow!(
                "unknown smtp security '{}' (expected one of {:?})",
                self.notify.smtp.security,
                SMTP_SECURITY
            ));
        }
        if self.notify.transport == "smtp" {
            if self.notify.smtp.host.is_none() {
                return Err(anyhow!("smtp transport requires notify.smtp.host"));
            }
            if self.notify.smtp.username.is_some() != self.notify.smtp.password.is_some() {
                return Err(anyhow!(
                    "notify.smtp.username and notify.smtp.password must be set together"
                ));
            }
        }
        if !(1..=100).contains(&self.notify.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }

    /// Resolve the monitored spots: the spots file wins over inline boxes.
    pub fn load_spots(&self) -> Result<SpotSet> {
        match &self.spots.path {
            Some(path) => SpotSet::load(path),
            None => Ok(SpotSet::from_boxes(self.spots.boxes.clone())),
        }
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
