#![cfg(feature = "notify-smtp")]

//! Mail transport.
//!
//! Sends each notification as a `multipart/mixed` message: the plain-text
//! body followed by the annotated snapshot as an attachment.

use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport as SmtpRelay, Transport};

use super::{Notification, NotificationTransport};
use crate::config::SmtpSettings;

pub struct SmtpTransport {
    relay: SmtpRelay,
    host: String,
    sent: u64,
}

impl SmtpTransport {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let host = settings
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("smtp transport requires notify.smtp.host"))?;
        let mut builder = match settings.security.as_str() {
            "starttls" => SmtpRelay::starttls_relay(host)
                .with_context(|| format!("smtp relay {}", host))?,
            "tls" => SmtpRelay::relay(host).with_context(|| format!("smtp relay {}", host))?,
            "none" => SmtpRelay::builder_dangerous(host),
            other => return Err(anyhow!("unknown smtp security '{}'", other)),
        };
        if let Some(port) = settings.port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        let relay = builder.timeout(Some(settings.timeout)).build();

        log::info!(
            "smtp transport via {} ({}, auth: {})",
            host,
            settings.security,
            settings.username.is_some()
        );
        Ok(Self {
            relay,
            host: host.to_string(),
            sent: 0,
        })
    }
}

/// Build the mail for one notification.
pub fn build_message(notification: &Notification) -> Result<Message> {
    let from: Mailbox = notification
        .sender
        .parse()
        .with_context(|| format!("invalid sender address '{}'", notification.sender))?;
    let to: Mailbox = notification
        .recipient
        .parse()
        .with_context(|| format!("invalid recipient address '{}'", notification.recipient))?;
    let content_type = ContentType::parse(&notification.attachment.content_type)
        .with_context(|| format!("invalid content type '{}'", notification.attachment.content_type))?;
    let attachment = Attachment::new(notification.attachment.filename.clone())
        .body(notification.attachment.bytes.clone(), content_type);

    Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(notification.body.clone()))
                .singlepart(attachment),
        )
        .context("build mail message")
}

impl NotificationTransport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        let message = build_message(notification)?;
        let response = self
            .relay
            .send(&message)
            .with_context(|| format!("send mail via {}", self.host))?;
        self.sent += 1;
        Ok(format!("{} {} #{}", self.host, response.code(), self.sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::OccupancyVector;
    use crate::notify::Attachment as SnapshotAttachment;

    fn notification() -> Notification {
        Notification {
            subject: "Parking Spot Occupancy Change Detected".to_string(),
            body: "Spot 2: occupied -> vacant\nOccupied: 0 of 3".to_string(),
            sender: "lot-camera@example.com".to_string(),
            recipient: "ops@example.com".to_string(),
            occupancy: OccupancyVector::new(vec![false, false, false]),
            flipped: vec![2],
            layout_changed: false,
            frame_sequence: 42,
            attachment: SnapshotAttachment {
                filename: "parking_status.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            },
            attachment_sha256: "00".to_string(),
        }
    }

    #[test]
    fn message_carries_body_and_snapshot() -> Result<()> {
        let message = build_message(&notification())?;
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("From: lot-camera@example.com"), "{}", raw);
        assert!(raw.contains("To: ops@example.com"), "{}", raw);
        assert!(raw.contains("Subject: Parking Spot Occupancy Change Detected"), "{}", raw);
        assert!(raw.contains("multipart/mixed"), "{}", raw);
        assert!(raw.contains("Spot 2: occupied -> vacant"), "{}", raw);
        assert!(raw.contains("Content-Type: image/jpeg"), "{}", raw);
        assert!(raw.contains("filename=\"parking_status.jpg\""), "{}", raw);
        // 0xFF 0xD8 0xFF 0xD9 in base64
        assert!(raw.contains("/9j/2Q=="), "{}", raw);
        Ok(())
    }

    #[test]
    fn rejects_bad_addresses_and_content_types() {
        let mut bad_sender = notification();
        bad_sender.sender = "not an address".to_string();
        assert!(build_message(&bad_sender).is_err());

        let mut bad_type = notification();
        bad_type.attachment.content_type = "jpeg".to_string();
        assert!(build_message(&bad_type).is_err());
    }

    #[test]
    fn requires_a_relay_host() {
        assert!(SmtpTransport::new(&SmtpSettings::default()).is_err());
        let plain = SmtpSettings {
            host: Some("127.0.0.1".to_string()),
            port: Some(2525),
            security: "none".to_string(),
            ..SmtpSettings::default()
        };
        assert!(SmtpTransport::new(&plain).is_ok());
    }
}
