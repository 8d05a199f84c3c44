use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Mode, Table};

/// Recurrence rule governing which calendar days a schedule is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    Once,
    Daily,
    Weekly,
    Weekdays,
    Weekends,
}

impl RepeatType {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatType::Once => "once",
            RepeatType::Daily => "daily",
            RepeatType::Weekly => "weekly",
            RepeatType::Weekdays => "weekdays",
            RepeatType::Weekends => "weekends",
        }
    }
}

impl FromStr for RepeatType {
    type Err = ();

    fn from_str(input: &str) -> Result<RepeatType, Self::Err> {
        match input {
            "once" => Ok(RepeatType::Once),
            "daily" => Ok(RepeatType::Daily),
            "weekly" => Ok(RepeatType::Weekly),
            "weekdays" => Ok(RepeatType::Weekdays),
            "weekends" => Ok(RepeatType::Weekends),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RepeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two schedule shapes, parsed out of the nullable column pairs.
/// The evaluator matches on this exhaustively instead of probing
/// nullable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    FixedTime {
        hour: u32,
        minute: u32,
    },
    Range {
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
        secondary_mode: Option<Mode>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: i32,
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
    /// JSON array of weekday numbers, 0 = Sunday .. 6 = Saturday.
    /// Only meaningful when `repeat_type` is `weekly`.
    pub repeat_days: Option<String>,
    pub is_enabled: bool,
    pub last_executed: Option<DateTime<Utc>>,
    /// Denormalized next-fire instant for fixed-time schedules,
    /// recomputed transactionally on every write. NULL when disabled
    /// and always NULL for range schedules.
    pub next_execution: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Exactly one variant's fields are populated per record; a row
    /// violating that yields `None` and is skipped (and logged) by the
    /// evaluator. The create/update paths never persist such a row.
    pub fn kind(&self) -> Option<ScheduleKind> {
        match self.schedule_type.as_str() {
            "time" => Some(ScheduleKind::FixedTime {
                hour: u32::try_from(self.hour?).ok()?,
                minute: u32::try_from(self.minute?).ok()?,
            }),
            "range" => Some(ScheduleKind::Range {
                start_hour: u32::try_from(self.start_hour?).ok()?,
                start_minute: u32::try_from(self.start_minute?).ok()?,
                end_hour: u32::try_from(self.end_hour?).ok()?,
                end_minute: u32::try_from(self.end_minute?).ok()?,
                secondary_mode: match &self.secondary_mode {
                    Some(raw) => Some(raw.parse().ok()?),
                    None => None,
                },
            }),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<Mode> {
        self.target_mode.parse().ok()
    }

    /// Unrecognized repeat types degrade to once semantics, matching
    /// the firmware-era backend.
    pub fn repeat(&self) -> RepeatType {
        self.repeat_type.parse().unwrap_or(RepeatType::Once)
    }

    pub fn repeat_days(&self) -> Vec<u32> {
        self.repeat_days
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct ScheduleTable;

impl Table for ScheduleTable {
    fn name(&self) -> &'static str {
        "energy_schedules"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS energy_schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                target_mode TEXT NOT NULL,
                schedule_type TEXT NOT NULL DEFAULT 'time',
                hour INTEGER,
                minute INTEGER,
                start_hour INTEGER,
                start_minute INTEGER,
                end_hour INTEGER,
                end_minute INTEGER,
                secondary_mode TEXT,
                repeat_type TEXT NOT NULL DEFAULT 'once',
                repeat_days TEXT,
                is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
                last_executed TIMESTAMP,
                next_execution TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS energy_schedules;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["users"]
    }
}
