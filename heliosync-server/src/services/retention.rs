use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;

use crate::repositories::EnergyDataRepository;
use crate::services::clock::Clock;
use crate::services::device_cache::DeviceCache;
use crate::services::dispatcher::{commands, CommandSink};

/// Nightly maintenance: at local midnight, drop every energy sample
/// from before the current local day and tell every online controller
/// to reset its daily energy counter.
pub struct RetentionService {
    energy_repository: Arc<EnergyDataRepository>,
    cache: Arc<DeviceCache>,
    dispatcher: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl RetentionService {
    pub fn new(
        energy_repository: Arc<EnergyDataRepository>,
        cache: Arc<DeviceCache>,
        dispatcher: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
        zone: Tz,
    ) -> Self {
        Self {
            energy_repository,
            cache,
            dispatcher,
            clock,
            zone,
        }
    }

    pub async fn run(self: Arc<Self>) {
        tracing::info!(zone = %self.zone, "retention task started");

        loop {
            let wait = self.until_next_midnight();
            tokio::time::sleep(wait).await;

            if let Err(e) = self.sweep().await {
                tracing::error!("retention sweep failed: {}", e);
            }
        }
    }

    fn until_next_midnight(&self) -> std::time::Duration {
        let now = self.clock.now().with_timezone(&self.zone);
        let mut next = now.date_naive() + Duration::days(1);

        loop {
            // A DST shift cannot make midnight ambiguous in practice,
            // but a nonexistent midnight rolls to the following day.
            match self
                .zone
                .from_local_datetime(&next.and_hms_opt(0, 0, 0).unwrap_or_default())
                .earliest()
            {
                Some(instant) => {
                    let wait = instant.signed_duration_since(now.with_timezone(&Utc));
                    return wait.to_std().unwrap_or(std::time::Duration::from_secs(60));
                }
                None => next += Duration::days(1),
            }
        }
    }

    pub async fn sweep(&self) -> anyhow::Result<()> {
        let now = self.clock.now();
        let today = now.with_timezone(&self.zone).date_naive();

        // Everything before today's local midnight goes. A nonexistent
        // local midnight (DST) falls back to the UTC one.
        let local_midnight = today.and_hms_opt(0, 0, 0).unwrap_or_default();
        let cutoff = self
            .zone
            .from_local_datetime(&local_midnight)
            .earliest()
            .map(|instant| instant.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local_midnight));

        let removed = self.energy_repository.delete_recorded_before(cutoff).await?;
        tracing::info!(removed, "purged energy samples from previous days");

        let online = self.cache.online_devices().await;
        for device_id in online {
            if let Err(e) = self
                .dispatcher
                .publish_command(&device_id, commands::reset_energy(now.timestamp_millis()))
                .await
            {
                tracing::error!(device_id = %device_id, "failed to send energy reset: {}", e);
            } else {
                tracing::info!(device_id = %device_id, "sent daily energy reset");
            }
        }

        Ok(())
    }
}
