use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Table;

/// Operating mode of a controller: feed from the panels or from the
/// grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Solar,
    Grid,
}

impl Mode {
    pub fn complement(self) -> Self {
        match self {
            Mode::Solar => Mode::Grid,
            Mode::Grid => Mode::Solar,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Solar => "solar",
            Mode::Grid => "grid",
        }
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(input: &str) -> Result<Mode, Self::Err> {
        match input {
            "solar" => Ok(Mode::Solar),
            "grid" => Ok(Mode::Grid),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution for a mode write. Every ledger entry carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedBy {
    Manual,
    Schedule,
    ScheduleRange,
    Default,
}

impl ChangedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangedBy::Manual => "manual",
            ChangedBy::Schedule => "schedule",
            ChangedBy::ScheduleRange => "schedule_range",
            ChangedBy::Default => "default",
        }
    }
}

impl fmt::Display for ChangedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current mode per device, at most one row per device. Absence means
/// the implicit solar default; callers apply it, the store does not.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceEnergyMode {
    pub id: i32,
    pub device_id: String,
    pub current_mode: String,
    pub changed_by: String,
    pub last_changed: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceEnergyMode {
    pub fn mode(&self) -> Option<Mode> {
        self.current_mode.parse().ok()
    }
}

#[derive(Clone)]
pub struct EnergyModeTable;

impl Table for EnergyModeTable {
    fn name(&self) -> &'static str {
        "device_energy_modes"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS device_energy_modes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL UNIQUE,
                current_mode TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                last_changed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS device_energy_modes;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}

#[derive(Clone)]
pub struct ModeHistoryTable;

impl Table for ModeHistoryTable {
    fn name(&self) -> &'static str {
        "energy_mode_history"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS energy_mode_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                from_mode TEXT,
                to_mode TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                schedule_id INTEGER,
                timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (schedule_id) REFERENCES energy_schedules (id) ON DELETE SET NULL
            );
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS energy_mode_history;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["energy_schedules"]
    }
}
