use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, Publish, QoS};
use serde::Deserialize;

use crate::repositories::EnergyDataRepository;
use crate::services::device_cache::{DeviceCache, DeviceStatus};

/// 15-second energy report from the controller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnergyReport {
    power_kw: f64,
    energy_kwh: f64,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandResponse {
    relay_state: Option<bool>,
}

/// Splits `prefix/{device_id}/{kind}` into its device id and message
/// kind. Topics with extra segments are ignored.
fn parse_topic<'a>(topic: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let mut parts = topic.split('/');
    if parts.next()? != prefix {
        return None;
    }
    let device_id = parts.next()?;
    let kind = parts.next()?;
    if parts.next().is_some() || device_id.is_empty() {
        return None;
    }
    Some((device_id, kind))
}

/// Inbound telemetry: drives the broker event loop, feeds the device
/// cache and persists energy samples. Runs for the life of the
/// process and reconnects through the client's own backoff.
pub struct TelemetryService {
    client: AsyncClient,
    cache: Arc<DeviceCache>,
    energy_repository: Arc<EnergyDataRepository>,
    topic_prefix: String,
    connected: Arc<AtomicBool>,
}

impl TelemetryService {
    pub fn new(
        client: AsyncClient,
        cache: Arc<DeviceCache>,
        energy_repository: Arc<EnergyDataRepository>,
        topic_prefix: String,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            cache,
            energy_repository,
            topic_prefix,
            connected,
        }
    }

    pub async fn run(self: Arc<Self>, mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::Relaxed);
                    tracing::info!("connected to gateway broker");
                    if let Err(e) = self.subscribe().await {
                        tracing::error!("failed to subscribe to device topics: {}", e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handle_publish(&publish).await;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.connected.store(false, Ordering::Relaxed);
                    tracing::warn!("gateway broker disconnected");
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    tracing::error!("gateway connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        for kind in ["status", "online", "confirmation", "response", "energy"] {
            let filter = format!("{}/+/{}", self.topic_prefix, kind);
            self.client.subscribe(&filter, QoS::AtLeastOnce).await?;
            tracing::info!(topic = %filter, "subscribed");
        }
        Ok(())
    }

    async fn handle_publish(&self, publish: &Publish) {
        let Some((device_id, kind)) = parse_topic(&publish.topic, &self.topic_prefix) else {
            return;
        };

        tracing::debug!(device_id = %device_id, kind = %kind, "device message");

        if let Err(e) = self.route(device_id, kind, &publish.payload).await {
            tracing::error!(device_id = %device_id, kind = %kind, "error processing device message: {}", e);
        }
    }

    async fn route(&self, device_id: &str, kind: &str, payload: &[u8]) -> anyhow::Result<()> {
        match kind {
            "status" => {
                let status: DeviceStatus = serde_json::from_slice(payload)?;

                // A full status carrying both meter fields doubles as
                // an energy sample.
                if let (Some(power), Some(energy)) = (status.power_kw, status.energy_kwh) {
                    self.energy_repository
                        .insert(device_id, power, energy, Utc::now())
                        .await?;
                }

                self.cache.update_status(device_id, status).await;
            }
            "online" => {
                let text = String::from_utf8_lossy(payload);
                let online = text.trim().eq_ignore_ascii_case("true") || text.trim() == "1";
                self.cache.set_online(device_id, online).await;
                tracing::info!(device_id = %device_id, online, "device liveness report");
            }
            "confirmation" => {
                let code = String::from_utf8_lossy(payload);
                self.cache
                    .set_confirmation_code(device_id, code.trim())
                    .await;
                tracing::info!(device_id = %device_id, "received pairing code");
            }
            "response" => {
                if let Ok(response) = serde_json::from_slice::<CommandResponse>(payload) {
                    if let Some(state) = response.relay_state {
                        self.cache.set_relay_state(device_id, state).await;
                    }
                }
                tracing::debug!(device_id = %device_id, "command response");
            }
            "energy" => {
                let report: EnergyReport = serde_json::from_slice(payload)?;
                let timestamp = report.timestamp.unwrap_or_else(Utc::now);

                self.energy_repository
                    .insert(device_id, report.power_kw, report.energy_kwh, timestamp)
                    .await?;
                self.cache
                    .update_energy(device_id, report.power_kw, report.energy_kwh)
                    .await;
            }
            _ => {}
        }

        Ok(())
    }
}
