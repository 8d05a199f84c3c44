use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Table;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnergyData {
    pub id: i32,
    pub device_id: String,
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EnergyDataTable;

impl Table for EnergyDataTable {
    fn name(&self) -> &'static str {
        "energy_data"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS energy_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                power_kw REAL NOT NULL,
                energy_kwh REAL NOT NULL,
                timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS energy_data;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
