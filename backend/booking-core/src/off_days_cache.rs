// src/off_days_cache.rs
use chrono::{DateTime, Duration, Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::calendar::CalendarFacts;
use crate::error::{BookingError, BookingResult};

pub const DEFAULT_OFF_DAYS_DIR: &str = "./off_days_cache";
const DATE_FORMAT: &str = "%d/%m/%Y";

/// One text file of off days per person, reported stale once older than `max_age`.
/// Lines look like `25/12/2025<TAB>7.40`.
#[derive(Debug, Clone)]
pub struct OffDaysCache {
    dir: PathBuf,
    max_age: Duration,
}

impl OffDaysCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn path_for(&self, person: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", person))
    }

    /// Cached facts for `person`, or `None` when the file is missing or stale.
    pub fn load_fresh(&self, person: &str, now: DateTime<Local>) -> BookingResult<Option<CalendarFacts>> {
        let path = self.path_for(person);
        if !path.exists() {
            debug!("No off-day cache file at {}", path.display());
            return Ok(None);
        }
        let modified: DateTime<Local> = fs::metadata(&path)?.modified()?.into();
        if now - modified > self.max_age {
            info!(
                "Off-day cache for {} was written {} and is stale",
                person,
                modified.format("%d/%m/%Y %H:%M")
            );
            return Ok(None);
        }
        info!("Loading off days from cache for {}", person);
        Self::read_file(&path).map(Some)
    }

    /// Fresh facts if there are any, otherwise whatever is on file however old.
    pub fn load_latest(&self, person: &str, now: DateTime<Local>) -> BookingResult<Option<CalendarFacts>> {
        if let Some(facts) = self.load_fresh(person, now)? {
            return Ok(Some(facts));
        }
        let stale = self.load(person)?;
        if stale.is_some() {
            warn!("Using stale off days for {}; record leave again to refresh them", person);
        }
        Ok(stale)
    }

    /// Cached facts for `person` however old they are.
    pub fn load(&self, person: &str) -> BookingResult<Option<CalendarFacts>> {
        let path = self.path_for(person);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    pub fn store(&self, person: &str, facts: &CalendarFacts) -> BookingResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(person);
        fs::write(&path, Self::render(facts))?;
        info!("Saved {} off days for {} to {}", facts.len(), person, path.display());
        Ok(())
    }

    fn render(facts: &CalendarFacts) -> String {
        facts
            .iter()
            .map(|(day, hours)| format!("{}\t{:.2}", day.format(DATE_FORMAT), hours))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn read_file(path: &Path) -> BookingResult<CalendarFacts> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> BookingResult<CalendarFacts> {
        let mut facts = CalendarFacts::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let bad_line = || BookingError::InvalidCacheLine {
                line_number: i + 1,
                line: line.to_string(),
            };
            let (day, hours) = line.split_once('\t').ok_or_else(bad_line)?;
            let day = NaiveDate::parse_from_str(day.trim(), DATE_FORMAT).map_err(|_| bad_line())?;
            let hours: f64 = hours.trim().parse().map_err(|_| bad_line())?;
            facts.set_off_hours(day, hours);
        }
        Ok(facts)
    }
}
