//! MQTT transport.
//!
//! Publishes the JSON payload to `<prefix>/occupancy` (retained) and the JPEG
//! snapshot to `<prefix>/snapshot`, both at QoS 1. A background thread drives
//! the rumqttc event loop and keeps polling through connection errors, so the
//! client reconnects once the broker is back. `<prefix>/status` carries
//! `online`/`offline` with the latter registered as the last will.
//! `mqtts://` brokers use rustls with the platform's default roots.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::{LastWill, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use rumqttc::{Outgoing, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Notification, NotificationTransport};
use crate::config::MqttSettings;

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const RECONNECT_BACKOFF_MIN: Duration = Duration::from_millis(250);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(10);

struct MqttRuntime {
    client: Client,
    stopping: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttRuntime {
    fn new(client: Client, mut connection: Connection) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stopping);
        let handle = std::thread::spawn(move || {
            let mut backoff = RECONNECT_BACKOFF_MIN;
            // Ends when the client is dropped (requests done) or after disconnect.
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        log::info!("MQTT broker connected");
                        backoff = RECONNECT_BACKOFF_MIN;
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!("MQTT connection error: {} (retrying in {:?})", e, backoff);
                        std::thread::sleep(backoff);
                        backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    }
                }
            }
        });

        Self {
            client,
            stopping,
            connection_handle: Some(handle),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        let sent = self.client.try_disconnect();
        if let Some(handle) = self.connection_handle.take() {
            if sent.is_ok() {
                let _ = handle.join();
            }
        }
        sent?;
        Ok(())
    }
}

impl Drop for MqttRuntime {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
    }
}

pub struct MqttTransport {
    runtime: MqttRuntime,
    topic_prefix: String,
    published: u64,
}

impl MqttTransport {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = parse_broker_addr(&settings.broker_addr)?;
        let topic_prefix = settings.topic_prefix.trim_end_matches('/').to_string();
        let status_topic = format!("{}/status", topic_prefix);

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = &settings.username {
            options.set_credentials(user, settings.password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            status_topic.clone(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, 10);
        let runtime = MqttRuntime::new(client, connection);
        mqtt_publish_qos1(&runtime.client, &status_topic, PAYLOAD_ONLINE.as_bytes(), true)?;
        log::info!(
            "MQTT transport connecting to {}:{} (TLS: {}, auth: {}), prefix {}",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some(),
            topic_prefix
        );
        Ok(Self {
            runtime,
            topic_prefix,
            published: 0,
        })
    }
}

impl NotificationTransport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        let occupancy_topic = format!("{}/occupancy", self.topic_prefix);
        let snapshot_topic = format!("{}/snapshot", self.topic_prefix);
        let payload = serde_json::to_vec(&notification.payload())?;

        mqtt_publish_qos1(&self.runtime.client, &occupancy_topic, &payload, true)
            .with_context(|| format!("publish {}", occupancy_topic))?;
        mqtt_publish_qos1(
            &self.runtime.client,
            &snapshot_topic,
            &notification.attachment.bytes,
            false,
        )
        .with_context(|| format!("publish {}", snapshot_topic))?;

        self.published += 1;
        Ok(format!("{}#{}", occupancy_topic, self.published))
    }

    fn close(&mut self) -> Result<()> {
        let status_topic = format!("{}/status", self.topic_prefix);
        if let Err(e) = mqtt_publish_qos1(
            &self.runtime.client,
            &status_topic,
            PAYLOAD_OFFLINE.as_bytes(),
            true,
        ) {
            log::warn!("MQTT offline status not published: {}", e);
        }
        self.runtime.disconnect()
    }
}

/// Queues without blocking; a full request queue (broker away for a while)
/// fails this delivery instead of stalling the monitor loop.
fn mqtt_publish_qos1(client: &Client, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
    client.try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct BrokerEndpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

/// `host:port` or `[v6]:port`, optionally prefixed with `mqtt://`, `tcp://`,
/// `mqtts://` or `ssl://`.
fn parse_broker_addr(addr: &str) -> Result<BrokerEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();
    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    let (host, port) = split_host_port(remainder, addr)?;
    Ok(BrokerEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(remainder: &str, addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = remainder.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = remainder
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
