//! Change-triggered notifications.
//!
//! `NotificationTrigger` turns an `OccupancyChange` into a `Notification`
//! (summary text plus an annotated JPEG snapshot) and hands it to the
//! configured `NotificationTransport`. Delivery problems never escape the
//! trigger: they are logged and reported as `NotificationResult::Failed`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::annotate::{annotate_frame, encode_jpeg};
use crate::config::NotifySettings;
use crate::frame::Frame;
use crate::matcher::OccupancyVector;
use crate::spots::SpotSet;
use crate::tracker::OccupancyChange;

mod log_sink;
mod mqtt;
#[cfg(feature = "notify-smtp")]
mod smtp;
mod spool;
#[cfg(feature = "notify-webhook")]
mod webhook;

pub use log_sink::LogTransport;
pub use mqtt::MqttTransport;
#[cfg(feature = "notify-smtp")]
pub use smtp::{build_message, SmtpTransport};
pub use spool::SpoolTransport;
#[cfg(feature = "notify-webhook")]
pub use webhook::WebhookTransport;

pub const SNAPSHOT_FILENAME: &str = "parking_status.jpg";

/// Snapshot image carried with a notification.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub recipient: String,
    pub occupancy: OccupancyVector,
    pub flipped: Vec<usize>,
    pub layout_changed: bool,
    pub frame_sequence: u64,
    pub attachment: Attachment,
    /// Hex SHA-256 of the attachment bytes.
    pub attachment_sha256: String,
}

/// JSON form shared by the spool, MQTT and webhook transports.
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub sender: &'a str,
    pub recipient: &'a str,
    pub occupancy: &'a OccupancyVector,
    pub occupied: usize,
    pub total: usize,
    pub flipped: &'a [usize],
    pub layout_changed: bool,
    pub frame_sequence: u64,
    pub attachment: &'a str,
    pub attachment_sha256: &'a str,
}

impl Notification {
    pub fn payload(&self) -> NotificationPayload<'_> {
        NotificationPayload {
            subject: &self.subject,
            body: &self.body,
            sender: &self.sender,
            recipient: &self.recipient,
            occupancy: &self.occupancy,
            occupied: self.occupancy.occupied_count(),
            total: self.occupancy.len(),
            flipped: &self.flipped,
            layout_changed: self.layout_changed,
            frame_sequence: self.frame_sequence,
            attachment: &self.attachment.filename,
            attachment_sha256: &self.attachment_sha256,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.payload())?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationResult {
    Delivered { transport: String, receipt: String },
    Failed { transport: String, reason: String },
}

impl NotificationResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotificationResult::Delivered { .. })
    }
}

/// Delivery channel for notifications.
///
/// `deliver` returns a receipt identifier on success. Errors are recoverable:
/// the trigger logs them and moves on.
pub trait NotificationTransport: Send {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, notification: &Notification) -> Result<String>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the configured transport.
pub fn build_transport(settings: &NotifySettings) -> Result<Box<dyn NotificationTransport>> {
    match settings.transport.as_str() {
        "log" => Ok(Box::new(LogTransport::new())),
        "spool" => Ok(Box::new(SpoolTransport::new(&settings.spool_dir)?)),
        "mqtt" => Ok(Box::new(MqttTransport::connect(&settings.mqtt)?)),
        "webhook" => {
            #[cfg(feature = "notify-webhook")]
            {
                let url = settings
                    .webhook_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("webhook transport requires notify.webhook_url"))?;
                Ok(Box::new(WebhookTransport::new(url)?))
            }
            #[cfg(not(feature = "notify-webhook"))]
            {
                Err(anyhow!("webhook transport requires the notify-webhook feature"))
            }
        }
        "smtp" => {
            #[cfg(feature = "notify-smtp")]
            {
                Ok(Box::new(SmtpTransport::new(&settings.smtp)?))
            }
            #[cfg(not(feature = "notify-smtp"))]
            {
                Err(anyhow!("smtp transport requires the notify-smtp feature"))
            }
        }
        other => Err(anyhow!("unknown notify transport '{}'", other)),
    }
}

pub struct NotificationTrigger {
    settings: NotifySettings,
    transport: Box<dyn NotificationTransport>,
    delivered: u64,
    failed: u64,
}

impl NotificationTrigger {
    pub fn new(settings: NotifySettings, transport: Box<dyn NotificationTransport>) -> Self {
        Self {
            settings,
            transport,
            delivered: 0,
            failed: 0,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Package and deliver one change. Never fails; problems come back as `Failed`.
    pub fn on_change(
        &mut self,
        change: &OccupancyChange,
        frame: &Frame,
        spots: &SpotSet,
    ) -> NotificationResult {
        let transport = self.transport.name().to_string();
        let notification = match self.compose(change, frame, spots) {
            Ok(notification) => notification,
            Err(e) => {
                self.failed += 1;
                log::warn!("notification not sent: {:#}", e);
                return NotificationResult::Failed {
                    transport,
                    reason: format!("compose: {:#}", e),
                };
            }
        };

        if let Some(path) = &self.settings.snapshot_path {
            write_snapshot(path, &notification.attachment.bytes);
        }

        match self.transport.deliver(&notification) {
            Ok(receipt) => {
                self.delivered += 1;
                log::info!(
                    "notification delivered via {} (receipt {})",
                    transport,
                    receipt
                );
                NotificationResult::Delivered { transport, receipt }
            }
            Err(e) => {
                self.failed += 1;
                log::warn!("notification delivery via {} failed: {:#}", transport, e);
                NotificationResult::Failed {
                    transport,
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    /// Build the notification for a change without delivering it.
    pub fn compose(
        &self,
        change: &OccupancyChange,
        frame: &Frame,
        spots: &SpotSet,
    ) -> Result<Notification> {
        let image = annotate_frame(frame, spots, &change.current)?;
        let bytes = encode_jpeg(&image, self.settings.jpeg_quality)?;
        let attachment_sha256 = hex::encode(Sha256::digest(&bytes));
        let filename = self
            .settings
            .snapshot_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| SNAPSHOT_FILENAME.to_string());

        let body = format!("{}\n\n{}", self.settings.body_text, summarize(change));
        Ok(Notification {
            subject: self.settings.subject.clone(),
            body,
            sender: self.settings.sender.clone(),
            recipient: self.settings.recipient.clone(),
            occupancy: change.current.clone(),
            flipped: change.flipped(),
            layout_changed: change.layout_changed(),
            frame_sequence: frame.sequence,
            attachment: Attachment {
                filename,
                content_type: "image/jpeg".to_string(),
                bytes,
            },
            attachment_sha256,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

/// Human-readable description of a change, one line per fact.
pub fn summarize(change: &OccupancyChange) -> String {
    let current = &change.current;
    let mut lines = Vec::new();
    if change.layout_changed() {
        lines.push(format!(
            "Spot layout changed: {} -> {} spots.",
            change.previous.len(),
            current.len()
        ));
    }
    for index in change.flipped() {
        let state = |occupied: bool| if occupied { "occupied" } else { "vacant" };
        match change.previous.get(index) {
            Some(before) => lines.push(format!(
                "Spot {}: {} -> {}",
                index,
                state(before),
                state(current.get(index).unwrap_or(false))
            )),
            None => lines.push(format!(
                "Spot {}: new, {}",
                index,
                state(current.get(index).unwrap_or(false))
            )),
        }
    }
    lines.push(format!(
        "Occupied: {} of {}",
        current.occupied_count(),
        current.len()
    ));
    lines.join("\n")
}

fn write_snapshot(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("snapshot dir {} not created: {}", parent.display(), e);
            return;
        }
    }
    match std::fs::write(path, bytes) {
        Ok(()) => log::debug!("snapshot written to {}", path.display()),
        Err(e) => log::warn!("snapshot {} not written: {}", path.display(), e),
    }
}
