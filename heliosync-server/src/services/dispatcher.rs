use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde_json::{json, Value};

use crate::configs::settings::Gateway;
use crate::models::{ChangedBy, Mode};

/// Command payloads are a compatibility contract with the controller
/// firmware; field names and values must stay bit-exact.
pub mod commands {
    use super::*;

    pub fn set_energy_mode(
        mode: Mode,
        source: ChangedBy,
        schedule_name: Option<&str>,
        timestamp_ms: i64,
    ) -> Value {
        let mut payload = json!({
            "command": "setEnergyMode",
            "mode": mode.as_str(),
            "timestamp": timestamp_ms,
            "source": source.as_str(),
        });
        if let Some(name) = schedule_name {
            payload["scheduleName"] = json!(name);
        }
        payload
    }

    pub fn device_added(timestamp_ms: i64) -> Value {
        json!({
            "command": "deviceAdded",
            "state": true,
            "timestamp": timestamp_ms,
        })
    }

    pub fn reset_energy(timestamp_ms: i64) -> Value {
        json!({
            "command": "resetEnergy",
            "state": true,
            "timestamp": timestamp_ms,
            "reason": "daily_reset",
        })
    }

    pub fn relay(command: &str, state: Value, timestamp_ms: i64) -> Value {
        json!({
            "command": command,
            "state": state,
            "timestamp": timestamp_ms,
        })
    }
}

/// Outbound command channel. Fire-and-forget with at-least-one-attempt
/// delivery: failures are logged by callers, never retried here and
/// never surfaced into a schedule-commit transaction.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn publish_command(&self, device_id: &str, payload: Value) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool {
        true
    }
}

pub struct MqttDispatcher {
    client: AsyncClient,
    topic_prefix: String,
    connected: Arc<AtomicBool>,
}

impl MqttDispatcher {
    pub fn new(gateway: &Gateway) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&gateway.client_id, &gateway.host, gateway.port);
        options.set_keep_alive(Duration::from_secs(5));

        if let Some(auth) = &gateway.auth {
            options.set_credentials(&auth.username, &auth.password);
        }

        let (client, event_loop) = AsyncClient::new(options, 10);

        (
            Self {
                client,
                topic_prefix: gateway.topic_prefix.clone(),
                connected: Arc::new(AtomicBool::new(false)),
            },
            event_loop,
        )
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }
}

#[async_trait]
impl CommandSink for MqttDispatcher {
    async fn publish_command(&self, device_id: &str, payload: Value) -> anyhow::Result<()> {
        let topic = format!("{}/{}/command", self.topic_prefix, device_id);
        let body = serde_json::to_vec(&payload)?;

        self.client.publish(topic, QoS::AtLeastOnce, false, body).await?;

        tracing::debug!(device_id = %device_id, "command published");

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
