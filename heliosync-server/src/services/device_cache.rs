use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A controller's last reported status. Fields mirror the firmware's
/// status JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceStatus {
    pub online: bool,
    pub relay_state: Option<bool>,
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: Option<i32>,
    pub uptime: Option<i64>,
    pub free_heap: Option<i64>,
    pub power_kw: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub confirmation_code: Option<String>,
    #[serde(skip)]
    pub last_seen: Option<DateTime<Utc>>,
}

const OFFLINE_AFTER: Duration = Duration::from_secs(30);
const CODE_TTL: Duration = Duration::from_secs(600);

/// Liveness and last-seen cache, a bounded-lifetime component outside
/// the schedule/mode engine's consistency domain. Pairing codes live
/// here too; both maps are swept by independent background tasks.
pub struct DeviceCache {
    statuses: RwLock<HashMap<String, DeviceStatus>>,
    codes: RwLock<HashMap<String, String>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            codes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn update_status(&self, device_id: &str, mut status: DeviceStatus) {
        status.online = true;
        status.last_seen = Some(Utc::now());

        if let Some(code) = &status.confirmation_code {
            self.codes
                .write()
                .await
                .insert(device_id.to_string(), code.clone());
        }

        self.statuses
            .write()
            .await
            .insert(device_id.to_string(), status);
    }

    pub async fn set_online(&self, device_id: &str, online: bool) {
        let mut statuses = self.statuses.write().await;
        let entry = statuses.entry(device_id.to_string()).or_default();
        entry.online = online;
        entry.last_seen = Some(Utc::now());
    }

    pub async fn update_energy(&self, device_id: &str, power_kw: f64, energy_kwh: f64) {
        let mut statuses = self.statuses.write().await;
        let entry = statuses.entry(device_id.to_string()).or_default();
        entry.power_kw = Some(power_kw);
        entry.energy_kwh = Some(energy_kwh);
        entry.last_seen = Some(Utc::now());
    }

    pub async fn set_relay_state(&self, device_id: &str, state: bool) {
        let mut statuses = self.statuses.write().await;
        let entry = statuses.entry(device_id.to_string()).or_default();
        entry.relay_state = Some(state);
    }

    pub async fn set_confirmation_code(&self, device_id: &str, code: &str) {
        self.codes
            .write()
            .await
            .insert(device_id.to_string(), code.to_string());
    }

    pub async fn confirmation_code(&self, device_id: &str) -> Option<String> {
        if let Some(code) = self.codes.read().await.get(device_id) {
            return Some(code.clone());
        }

        self.statuses
            .read()
            .await
            .get(device_id)
            .and_then(|s| s.confirmation_code.clone())
    }

    pub async fn status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.statuses.read().await.get(device_id).cloned()
    }

    pub async fn online_devices(&self) -> Vec<String> {
        self.statuses
            .read()
            .await
            .iter()
            .filter(|(_, status)| status.online)
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.statuses.read().await.len()
    }

    /// Spawns the offline sweep (30s) and the stale pairing-code
    /// sweep (10min).
    pub fn start_sweeps(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(OFFLINE_AFTER);
            loop {
                interval.tick().await;
                cache.sweep_offline().await;
            }
        });

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CODE_TTL);
            loop {
                interval.tick().await;
                cache.sweep_stale_codes().await;
            }
        });
    }

    async fn sweep_offline(&self) {
        let now = Utc::now();
        let mut marked = 0;

        let mut statuses = self.statuses.write().await;
        for status in statuses.values_mut() {
            let stale = status
                .last_seen
                .map(|seen| now - seen > chrono::Duration::from_std(OFFLINE_AFTER).unwrap_or_default())
                .unwrap_or(true);

            if stale && status.online {
                status.online = false;
                marked += 1;
            }
        }

        if marked > 0 {
            tracing::info!(count = marked, "marked devices offline (no updates)");
        }
    }

    async fn sweep_stale_codes(&self) {
        let now = Utc::now();
        let statuses = self.statuses.read().await;
        let mut codes = self.codes.write().await;

        let before = codes.len();
        codes.retain(|device_id, _| {
            statuses
                .get(device_id)
                .and_then(|s| s.last_seen)
                .map(|seen| now - seen <= chrono::Duration::from_std(CODE_TTL).unwrap_or_default())
                .unwrap_or(false)
        });

        let cleared = before - codes.len();
        if cleared > 0 {
            tracing::debug!(count = cleared, "cleared stale confirmation codes");
        }
    }
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_update_marks_online_and_stores_code() {
        let cache = DeviceCache::new();
        cache
            .update_status(
                "SOLAR-0001",
                DeviceStatus {
                    confirmation_code: Some("483920".into()),
                    ..Default::default()
                },
            )
            .await;

        let status = cache.status("SOLAR-0001").await.unwrap();
        assert!(status.online);
        assert!(status.last_seen.is_some());
        assert_eq!(
            cache.confirmation_code("SOLAR-0001").await.as_deref(),
            Some("483920")
        );
    }

    #[tokio::test]
    async fn test_offline_sweep_marks_stale_devices() {
        let cache = DeviceCache::new();
        cache.update_status("SOLAR-0001", DeviceStatus::default()).await;

        {
            let mut statuses = cache.statuses.write().await;
            statuses.get_mut("SOLAR-0001").unwrap().last_seen =
                Some(Utc::now() - chrono::Duration::seconds(60));
        }

        cache.sweep_offline().await;

        assert!(!cache.status("SOLAR-0001").await.unwrap().online);
        assert!(cache.online_devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_code_sweep() {
        let cache = DeviceCache::new();
        cache.set_confirmation_code("SOLAR-0001", "111111").await;

        // No status entry at all: the code is unanchored and swept.
        cache.sweep_stale_codes().await;

        assert_eq!(cache.confirmation_code("SOLAR-0001").await, None);
    }
}
