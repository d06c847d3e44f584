#![cfg(feature = "notify-webhook")]

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use super::{Notification, NotificationTransport};

/// POSTs the JSON payload, with the snapshot hex-encoded under `snapshot_jpeg_hex`.
pub struct WebhookTransport {
    url: String,
    agent: ureq::Agent,
}

impl WebhookTransport {
    pub fn new(url: &str) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("webhook url must be http(s): {}", url));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Ok(Self {
            url: url.to_string(),
            agent,
        })
    }
}

impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        let mut body = serde_json::to_value(notification.payload())?;
        body["snapshot_jpeg_hex"] = serde_json::Value::String(hex::encode(&notification.attachment.bytes));
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .with_context(|| format!("POST {}", self.url))?;
        Ok(format!("{} {}", self.url, response.status()))
    }
}
