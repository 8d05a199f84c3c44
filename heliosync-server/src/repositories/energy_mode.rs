use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Error, Sqlite, Transaction};

use crate::configs::Storage;
use crate::models::{ChangedBy, DeviceEnergyMode, Mode};

/// History row joined with the (possibly deleted) schedule's name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModeHistoryEntry {
    pub id: i32,
    pub device_id: String,
    pub from_mode: Option<String>,
    pub to_mode: String,
    pub changed_by: String,
    pub schedule_id: Option<i32>,
    pub schedule_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The mode ledger: current mode per device plus an append-only
/// transition history. Every write is attributed; the ledger records
/// whatever transition it is asked to record — equal-mode
/// short-circuiting is the API layer's business, not enforced here.
pub struct EnergyModeRepository {
    storage: Arc<Storage>,
}

impl EnergyModeRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &sqlx::SqlitePool {
        self.storage.get_pool()
    }

    pub async fn get(&self, device_id: &str) -> Result<Option<DeviceEnergyMode>, Error> {
        let mode: Option<DeviceEnergyMode> =
            sqlx::query_as("SELECT * FROM device_energy_modes WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(self.storage.get_pool())
                .await?;

        Ok(mode)
    }

    pub async fn get_in_tx(
        &self,
        device_id: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<Option<DeviceEnergyMode>, Error> {
        let mode: Option<DeviceEnergyMode> =
            sqlx::query_as("SELECT * FROM device_energy_modes WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(&mut **transaction)
                .await?;

        Ok(mode)
    }

    /// Lazily writes the implicit solar default the first time a
    /// device's mode is read through the API.
    pub async fn get_or_default(&self, device_id: &str) -> Result<DeviceEnergyMode, Error> {
        if let Some(mode) = self.get(device_id).await? {
            return Ok(mode);
        }

        let mode: DeviceEnergyMode = sqlx::query_as(
            r#"
            INSERT INTO device_energy_modes (device_id, current_mode, changed_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO UPDATE SET device_id = device_id
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(Mode::Solar.as_str())
        .bind(ChangedBy::Default.as_str())
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(mode)
    }

    pub async fn upsert(
        &self,
        device_id: &str,
        mode: Mode,
        changed_by: ChangedBy,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO device_energy_modes (device_id, current_mode, changed_by, last_changed)
            VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
            ON CONFLICT (device_id)
            DO UPDATE SET
                current_mode = $2,
                changed_by = $3,
                last_changed = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(device_id)
        .bind(mode.as_str())
        .bind(changed_by.as_str())
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    pub async fn append_history(
        &self,
        device_id: &str,
        from_mode: Option<Mode>,
        to_mode: Mode,
        changed_by: ChangedBy,
        schedule_id: Option<i32>,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO energy_mode_history (device_id, from_mode, to_mode, changed_by, schedule_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(device_id)
        .bind(from_mode.map(Mode::as_str))
        .bind(to_mode.as_str())
        .bind(changed_by.as_str())
        .bind(schedule_id)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    /// Upsert plus history append as one transaction; returns the
    /// previous recorded mode (None when the device had no row).
    pub async fn set_mode(
        &self,
        device_id: &str,
        mode: Mode,
        changed_by: ChangedBy,
        schedule_id: Option<i32>,
    ) -> Result<Option<Mode>, Error> {
        let mut tx = self.storage.get_pool().begin().await?;

        let previous = self
            .get_in_tx(device_id, &mut tx)
            .await?
            .and_then(|m| m.mode());

        self.upsert(device_id, mode, changed_by, &mut tx).await?;
        self.append_history(device_id, previous, mode, changed_by, schedule_id, &mut tx)
            .await?;

        tx.commit().await?;

        Ok(previous)
    }

    pub async fn find_history(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<ModeHistoryEntry>, Error> {
        let history: Vec<ModeHistoryEntry> = sqlx::query_as(
            r#"
            SELECT
                h.id, h.device_id, h.from_mode, h.to_mode, h.changed_by,
                h.schedule_id, s.name AS schedule_name, h.timestamp
            FROM energy_mode_history h
            LEFT JOIN energy_schedules s ON h.schedule_id = s.id
            WHERE h.device_id = $1
            ORDER BY h.timestamp DESC, h.id DESC
            LIMIT $2
            "#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(history)
    }

    pub async fn delete_for_device(
        &self,
        device_id: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM energy_mode_history WHERE device_id = $1")
            .bind(device_id)
            .execute(&mut **transaction)
            .await?;

        sqlx::query("DELETE FROM device_energy_modes WHERE device_id = $1")
            .bind(device_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }
}
