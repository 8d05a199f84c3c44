use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Error, Sqlite, Transaction};

use crate::configs::Storage;
use crate::models::Schedule;

/// Fully validated column set for an insert or a whole-row update.
/// The handler layer builds one of these; columns of the inactive
/// variant are `None`, so a variant switch nulls them in one write.
#[derive(Debug, Clone)]
pub struct ScheduleDraft {
    pub device_id: String,
    pub user_id: i32,
    pub name: String,
    pub target_mode: String,
    pub schedule_type: String,
    pub hour: Option<i32>,
    pub minute: Option<i32>,
    pub start_hour: Option<i32>,
    pub start_minute: Option<i32>,
    pub end_hour: Option<i32>,
    pub end_minute: Option<i32>,
    pub secondary_mode: Option<String>,
    pub repeat_type: String,
    pub repeat_days: Option<String>,
    pub is_enabled: bool,
    pub next_execution: Option<DateTime<Utc>>,
}

pub struct ScheduleRepository {
    storage: Arc<Storage>,
}

impl ScheduleRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &sqlx::SqlitePool {
        self.storage.get_pool()
    }

    /// Enabled fixed-time schedules whose precomputed next-fire time
    /// has arrived. An indexed range scan thanks to the denormalized
    /// `next_execution` column.
    pub async fn find_due_fixed(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>, Error> {
        let schedules: Vec<Schedule> = sqlx::query_as(
            r#"
            SELECT * FROM energy_schedules
            WHERE is_enabled = TRUE
              AND schedule_type = 'time'
              AND next_execution IS NOT NULL
              AND next_execution <= $1
            "#,
        )
        .bind(now)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(schedules)
    }

    /// Range schedules are evaluated live every tick, no denormalized
    /// due marker.
    pub async fn find_enabled_range(&self) -> Result<Vec<Schedule>, Error> {
        let schedules: Vec<Schedule> = sqlx::query_as(
            r#"
            SELECT * FROM energy_schedules
            WHERE is_enabled = TRUE AND schedule_type = 'range'
            "#,
        )
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(schedules)
    }

    pub async fn find_by_device(
        &self,
        device_id: &str,
        user_id: i32,
    ) -> Result<Vec<Schedule>, Error> {
        let schedules: Vec<Schedule> = sqlx::query_as(
            r#"
            SELECT * FROM energy_schedules
            WHERE device_id = $1 AND user_id = $2
            ORDER BY
                COALESCE(hour, start_hour),
                COALESCE(minute, start_minute)
            "#,
        )
        .bind(device_id)
        .bind(user_id)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(schedules)
    }

    pub async fn find_owned(
        &self,
        id: i32,
        device_id: &str,
        user_id: i32,
    ) -> Result<Option<Schedule>, Error> {
        let schedule: Option<Schedule> = sqlx::query_as(
            r#"
            SELECT * FROM energy_schedules
            WHERE id = $1 AND device_id = $2 AND user_id = $3
            "#,
        )
        .bind(id)
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(self.storage.get_pool())
        .await?;

        Ok(schedule)
    }

    pub async fn create(&self, draft: &ScheduleDraft) -> Result<Schedule, Error> {
        let schedule: Schedule = sqlx::query_as(
            r#"
            INSERT INTO energy_schedules
                (device_id, user_id, name, target_mode, schedule_type,
                 hour, minute, start_hour, start_minute, end_hour, end_minute,
                 secondary_mode, repeat_type, repeat_days, is_enabled, next_execution)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(&draft.device_id)
        .bind(draft.user_id)
        .bind(&draft.name)
        .bind(&draft.target_mode)
        .bind(&draft.schedule_type)
        .bind(draft.hour)
        .bind(draft.minute)
        .bind(draft.start_hour)
        .bind(draft.start_minute)
        .bind(draft.end_hour)
        .bind(draft.end_minute)
        .bind(&draft.secondary_mode)
        .bind(&draft.repeat_type)
        .bind(&draft.repeat_days)
        .bind(draft.is_enabled)
        .bind(draft.next_execution)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(schedule)
    }

    pub async fn update(&self, id: i32, draft: &ScheduleDraft) -> Result<Schedule, Error> {
        let schedule: Schedule = sqlx::query_as(
            r#"
            UPDATE energy_schedules
            SET name = $1,
                target_mode = $2,
                schedule_type = $3,
                hour = $4,
                minute = $5,
                start_hour = $6,
                start_minute = $7,
                end_hour = $8,
                end_minute = $9,
                secondary_mode = $10,
                repeat_type = $11,
                repeat_days = $12,
                is_enabled = $13,
                next_execution = $14,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $15
            RETURNING *
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.target_mode)
        .bind(&draft.schedule_type)
        .bind(draft.hour)
        .bind(draft.minute)
        .bind(draft.start_hour)
        .bind(draft.start_minute)
        .bind(draft.end_hour)
        .bind(draft.end_minute)
        .bind(&draft.secondary_mode)
        .bind(&draft.repeat_type)
        .bind(&draft.repeat_days)
        .bind(draft.is_enabled)
        .bind(draft.next_execution)
        .bind(id)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(schedule)
    }

    pub async fn delete(&self, id: i32, device_id: &str, user_id: i32) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM energy_schedules WHERE id = $1 AND device_id = $2 AND user_id = $3",
        )
        .bind(id)
        .bind(device_id)
        .bind(user_id)
        .execute(self.storage.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_device(
        &self,
        device_id: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM energy_schedules WHERE device_id = $1")
            .bind(device_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    /// One-shot schedules never fire twice: disable and clear the
    /// due marker in the same write.
    pub async fn mark_fired_once(
        &self,
        id: i32,
        now: DateTime<Utc>,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE energy_schedules
            SET last_executed = $1,
                next_execution = NULL,
                is_enabled = FALSE,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    pub async fn mark_fired_recurring(
        &self,
        id: i32,
        now: DateTime<Utc>,
        next_execution: DateTime<Utc>,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE energy_schedules
            SET last_executed = $1,
                next_execution = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(next_execution)
        .bind(id)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    pub async fn mark_range_fired(
        &self,
        id: i32,
        now: DateTime<Utc>,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE energy_schedules
            SET last_executed = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}
