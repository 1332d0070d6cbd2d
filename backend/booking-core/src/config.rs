// src/config.rs
use serde::Deserialize;
use std::path::PathBuf;

use crate::allocation::{
    BookingSettings, DEFAULT_DAYS_PER_FTE, DEFAULT_HOURS_PER_DAY, DEFAULT_LEAVE_PROJECT,
    DEFAULT_LEAVE_TASK,
};
use crate::booking_plan::FundingCode;
use crate::off_days_cache::DEFAULT_OFF_DAYS_DIR;

pub const ENV_PREFIX: &str = "BOOKING_";

fn default_roster_path() -> PathBuf {
    PathBuf::from("roster.json")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("ledger.csv")
}

fn default_off_days_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OFF_DAYS_DIR)
}

fn default_off_days_max_age_days() -> i64 {
    7
}

fn default_ledger_max_age_hours() -> i64 {
    24
}

fn default_hours_per_day() -> f64 {
    DEFAULT_HOURS_PER_DAY
}

fn default_days_per_fte() -> f64 {
    DEFAULT_DAYS_PER_FTE
}

fn default_leave_project() -> String {
    DEFAULT_LEAVE_PROJECT.to_string()
}

fn default_leave_task() -> String {
    DEFAULT_LEAVE_TASK.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // Input files
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    // Caches
    #[serde(default = "default_off_days_dir")]
    pub off_days_dir: PathBuf,
    #[serde(default = "default_off_days_max_age_days")]
    pub off_days_max_age_days: i64,
    #[serde(default = "default_ledger_max_age_hours")]
    pub ledger_max_age_hours: i64,

    // Booking rules
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: f64,
    #[serde(default = "default_days_per_fte")]
    pub days_per_fte: f64,
    #[serde(default = "default_leave_project")]
    pub leave_project: String,
    #[serde(default = "default_leave_task")]
    pub leave_task: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        envy::prefixed(ENV_PREFIX).from_env::<AppConfig>()
    }

    pub fn booking_settings(&self) -> BookingSettings {
        BookingSettings {
            hours_per_day: self.hours_per_day,
            days_per_fte: self.days_per_fte,
            leave_code: FundingCode::new(&self.leave_project, &self.leave_task),
            ..BookingSettings::default()
        }
    }
}
