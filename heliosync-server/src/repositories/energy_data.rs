use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Error, Sqlite, Transaction};

use crate::configs::Storage;
use crate::models::EnergyData;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnergyStats {
    pub total_records: i64,
    pub min_power: Option<f64>,
    pub max_power: Option<f64>,
    pub avg_power: Option<f64>,
    pub start_energy: Option<f64>,
    pub end_energy: Option<f64>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

pub struct EnergyDataRepository {
    storage: Arc<Storage>,
}

impl EnergyDataRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn insert(
        &self,
        device_id: &str,
        power_kw: f64,
        energy_kwh: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<i32, Error> {
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO energy_data (device_id, power_kw, energy_kwh, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(device_id)
        .bind(power_kw)
        .bind(energy_kwh)
        .bind(timestamp)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(id)
    }

    pub async fn find_since(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<EnergyData>, Error> {
        let rows: Vec<EnergyData> = match since {
            Some(since) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM energy_data
                    WHERE device_id = $1 AND timestamp >= $2
                    ORDER BY timestamp ASC
                    LIMIT $3
                    "#,
                )
                .bind(device_id)
                .bind(since)
                .bind(limit)
                .fetch_all(self.storage.get_pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM energy_data
                    WHERE device_id = $1
                    ORDER BY timestamp ASC
                    LIMIT $2
                    "#,
                )
                .bind(device_id)
                .bind(limit)
                .fetch_all(self.storage.get_pool())
                .await?
            }
        };

        Ok(rows)
    }

    pub async fn stats_since(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<EnergyStats, Error> {
        let stats: EnergyStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_records,
                MIN(power_kw) AS min_power,
                MAX(power_kw) AS max_power,
                AVG(power_kw) AS avg_power,
                MIN(energy_kwh) AS start_energy,
                MAX(energy_kwh) AS end_energy,
                MIN(timestamp) AS period_start,
                MAX(timestamp) AS period_end
            FROM energy_data
            WHERE device_id = $1 AND ($2 IS NULL OR timestamp >= $2)
            "#,
        )
        .bind(device_id)
        .bind(since)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(stats)
    }

    pub async fn delete_for_device(&self, device_id: &str) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM energy_data WHERE device_id = $1")
            .bind(device_id)
            .execute(self.storage.get_pool())
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_for_device_tx(
        &self,
        device_id: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM energy_data WHERE device_id = $1")
            .bind(device_id)
            .execute(&mut **transaction)
            .await?;

        Ok(result.rows_affected())
    }

    /// Retention sweep: drop every sample recorded before the cutoff.
    pub async fn delete_recorded_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM energy_data WHERE timestamp < $1")
            .bind(cutoff)
            .execute(self.storage.get_pool())
            .await?;

        Ok(result.rows_affected())
    }
}
