use anyhow::Result;

use super::{Notification, NotificationTransport};

/// Writes notifications to the log. Always succeeds.
#[derive(Debug, Default)]
pub struct LogTransport {
    sent: u64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        self.sent += 1;
        log::info!(
            "[notify] {} -> {}: {}",
            notification.sender,
            if notification.recipient.is_empty() {
                "(no recipient)"
            } else {
                notification.recipient.as_str()
            },
            notification.subject
        );
        for line in notification.body.lines().filter(|l| !l.is_empty()) {
            log::info!("[notify]   {}", line);
        }
        log::info!(
            "[notify]   attachment {} ({} bytes, sha256 {})",
            notification.attachment.filename,
            notification.attachment.bytes.len(),
            notification.attachment_sha256
        );
        Ok(format!("log-{}", self.sent))
    }
}
