// src/ledger.rs
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::booking_plan::{BookingPlan, FundingCode};
use crate::error::BookingResult;

// --- Logged Hours ---

/// Hours already booked per funding code this fiscal year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggedHours {
    hours: HashMap<FundingCode, f64>,
}

impl LoggedHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing codes have logged nothing yet.
    pub fn get(&self, code: &FundingCode) -> f64 {
        self.hours.get(code).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, code: FundingCode, hours: f64) {
        self.hours.insert(code, hours);
    }

    pub fn add(&mut self, code: FundingCode, hours: f64) {
        *self.hours.entry(code).or_insert(0.0) += hours;
    }
}

impl FromIterator<(FundingCode, f64)> for LoggedHours {
    fn from_iter<T: IntoIterator<Item = (FundingCode, f64)>>(iter: T) -> Self {
        let mut logged = LoggedHours::new();
        for (code, hours) in iter {
            logged.add(code, hours);
        }
        logged
    }
}

// --- Ledger Snapshot ---

fn parse_item_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    // Report exports use either ISO dates or dd/mm/YYYY, sometimes with a time part
    let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .map_err(|e| serde::de::Error::custom(format!("invalid item date '{}': {}", raw, e)))
}

/// One booking row from the external finance report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerRecord {
    #[serde(rename = "Employee/Supplier Name")]
    pub employee: String,
    #[serde(rename = "Project Number")]
    pub project: String,
    #[serde(rename = "Task Number")]
    pub task: String,
    #[serde(rename = "Item Date", deserialize_with = "parse_item_date")]
    pub item_date: NaiveDate,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
}

impl LedgerRecord {
    pub fn code(&self) -> FundingCode {
        FundingCode::new(&self.project, &self.task)
    }
}

/// Snapshot of hours booked in the external ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    records: Vec<LedgerRecord>,
}

impl Ledger {
    pub fn new(records: Vec<LedgerRecord>) -> Self {
        Self { records }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> BookingResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();
        for row in csv_reader.deserialize() {
            let record: LedgerRecord = row?;
            records.push(record);
        }
        debug!("Read {} ledger rows", records.len());
        Ok(Self { records })
    }

    pub fn from_csv_path(path: &Path) -> BookingResult<Self> {
        info!("Loading ledger snapshot from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    fn rows_for<'a>(&'a self, person: &'a str) -> impl Iterator<Item = &'a LedgerRecord> + 'a {
        self.records.iter().filter(move |r| r.employee == person)
    }

    /// Per-code totals for the plan's codes. A code only counts rows on or
    /// after the earliest start among the plan's entries for it, so a code
    /// reused by a continuation project does not pick up older periods.
    pub fn logged_hours(&self, person: &str, plan: &BookingPlan) -> LoggedHours {
        let mut logged = LoggedHours::new();
        for code in plan.codes() {
            let since = plan
                .entries()
                .iter()
                .filter(|e| e.code == code)
                .map(|e| e.start_date)
                .min()
                .unwrap_or(NaiveDate::MIN);
            let total: f64 = self
                .rows_for(person)
                .filter(|r| r.item_date >= since && r.code() == code)
                .map(|r| r.quantity)
                .sum();
            debug!("{}: {} logged {:.2} hours since {}", person, code, total, since);
            logged.insert(code, total);
        }
        logged
    }

    /// Total hours the person has in the Monday-Sunday week containing `date`.
    pub fn hours_for_week(&self, person: &str, date: NaiveDate) -> f64 {
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        let next_monday = monday + Duration::days(7);
        self.rows_for(person)
            .filter(|r| r.item_date >= monday && r.item_date < next_monday)
            .map(|r| r.quantity)
            .sum()
    }
}

// --- Ledger Cache ---

struct CachedLedger {
    ledger: Ledger,
    loaded_at: NaiveDateTime,
}

/// Holds one ledger snapshot and reloads it once it is older than `max_age`
/// or after `invalidate`.
pub struct LedgerCache {
    max_age: Duration,
    cached: Option<CachedLedger>,
}

impl LedgerCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            cached: None,
        }
    }

    pub fn get_or_load<F>(&mut self, now: NaiveDateTime, loader: F) -> BookingResult<&Ledger>
    where
        F: FnOnce() -> BookingResult<Ledger>,
    {
        if let Some(cached) = &self.cached {
            if now - cached.loaded_at > self.max_age {
                info!(
                    "Ledger snapshot from {} is older than {} hours, reloading",
                    cached.loaded_at,
                    self.max_age.num_hours()
                );
                self.cached = None;
            } else {
                debug!("Ledger cache HIT (loaded {})", cached.loaded_at);
            }
        }

        let cached = match self.cached.take() {
            Some(cached) => cached,
            None => {
                debug!("Ledger cache MISS, loading");
                CachedLedger {
                    ledger: loader()?,
                    loaded_at: now,
                }
            }
        };
        Ok(&self.cached.insert(cached).ledger)
    }

    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            info!("Ledger cache INVALIDATED");
        }
    }

    pub fn loaded_at(&self) -> Option<NaiveDateTime> {
        self.cached.as_ref().map(|c| c.loaded_at)
    }
}
