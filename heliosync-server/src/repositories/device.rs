use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Error, Sqlite, Transaction};

use crate::configs::Storage;
use crate::models::Device;

/// A device together with the querying user's link metadata.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceWithAccess {
    pub id: i32,
    pub device_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_owner: bool,
    pub added_at: DateTime<Utc>,
}

pub struct DeviceRepository {
    storage: Arc<Storage>,
}

impl DeviceRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &sqlx::SqlitePool {
        self.storage.get_pool()
    }

    pub async fn create(
        &self,
        device_id: &str,
        name: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<Device, Error> {
        let device: Device = sqlx::query_as(
            r#"
            INSERT INTO devices (device_id, name)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(name)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(device)
    }

    pub async fn find_by_device_id(&self, device_id: &str) -> Result<Option<Device>, Error> {
        let device: Option<Device> =
            sqlx::query_as("SELECT * FROM devices WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(self.storage.get_pool())
                .await?;

        Ok(device)
    }

    pub async fn find_with_access_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<DeviceWithAccess>, Error> {
        let devices: Vec<DeviceWithAccess> = sqlx::query_as(
            r#"
            SELECT d.id, d.device_id, d.name, d.created_at, ud.is_owner, ud.added_at
            FROM devices d
            JOIN user_devices ud ON d.id = ud.device_id
            WHERE ud.user_id = $1
            ORDER BY ud.added_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(devices)
    }

    pub async fn rename(&self, id: i32, name: &str) -> Result<(), Error> {
        sqlx::query("UPDATE devices SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(self.storage.get_pool())
            .await?;

        Ok(())
    }

    pub async fn delete(
        &self,
        id: i32,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    pub async fn has_access(&self, user_id: i32, device_id: &str) -> Result<bool, Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM user_devices ud
            JOIN devices d ON d.id = ud.device_id
            WHERE ud.user_id = $1 AND d.device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(self.storage.get_pool())
        .await?;

        Ok(row.is_some())
    }

    pub async fn is_owner(&self, user_id: i32, device_id: &str) -> Result<bool, Error> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT ud.is_owner FROM user_devices ud
            JOIN devices d ON d.id = ud.device_id
            WHERE ud.user_id = $1 AND d.device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(self.storage.get_pool())
        .await?;

        Ok(row.map(|(owner,)| owner).unwrap_or(false))
    }

    pub async fn is_linked(&self, user_id: i32, device_db_id: i32) -> Result<bool, Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM user_devices WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_db_id)
        .fetch_optional(self.storage.get_pool())
        .await?;

        Ok(row.is_some())
    }

    pub async fn link_user(
        &self,
        user_id: i32,
        device_db_id: i32,
        is_owner: bool,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO user_devices (user_id, device_id, is_owner) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(device_db_id)
        .bind(is_owner)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    pub async fn unlink_user(
        &self,
        user_id: i32,
        device_db_id: i32,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM user_devices WHERE user_id = $1 AND device_id = $2")
            .bind(user_id)
            .bind(device_db_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    pub async fn count_users(
        &self,
        device_db_id: i32,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<i64, Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_devices WHERE device_id = $1")
                .bind(device_db_id)
                .fetch_one(&mut **transaction)
                .await?;

        Ok(count)
    }
}
