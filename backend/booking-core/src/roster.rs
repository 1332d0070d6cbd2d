// src/roster.rs
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::booking_plan::{BookingPlan, CodeSpec, Entry, FundingCode, Priority, DEFAULT_TASK};
use crate::error::{BookingError, BookingResult};
use crate::fiscal::FiscalYear;
use crate::weekly::{default_known_as, PersonInfo};

fn default_task() -> String {
    DEFAULT_TASK.to_string()
}

fn default_priority() -> Priority {
    Priority::External
}

/// A named funding code as it appears under `codes`.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeDefinition {
    pub project: String,
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl CodeDefinition {
    fn spec(&self, fiscal_year: FiscalYear) -> CodeSpec {
        let start = self.start.unwrap_or_else(|| fiscal_year.start());
        let end = self.end.unwrap_or_else(|| fiscal_year.end());
        CodeSpec::new(FundingCode::new(&self.project, &self.task), fiscal_year)
            .with_window(start, end)
            .with_priority(self.priority)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanLine {
    pub code: String,
    #[serde(default)]
    pub fte: Option<f64>,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub person_number: String,
    #[serde(default)]
    pub known_as: Option<String>,
    #[serde(default)]
    pub entries: Vec<PlanLine>,
}

impl PersonRecord {
    pub fn info(&self) -> PersonInfo {
        PersonInfo {
            name: self.name.clone(),
            person_number: self.person_number.clone(),
            known_as: self
                .known_as
                .clone()
                .unwrap_or_else(|| default_known_as(&self.name)),
        }
    }
}

/// Funding codes and the people booking to them, loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub codes: BTreeMap<String, CodeDefinition>,
    #[serde(default)]
    pub people: Vec<PersonRecord>,
}

impl Roster {
    pub fn from_json(text: &str) -> BookingResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> BookingResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let roster = Self::from_json(&text)?;
        info!(
            "Loaded roster from {}: {} codes, {} people",
            path.display(),
            roster.codes.len(),
            roster.people.len()
        );
        Ok(roster)
    }

    pub fn person(&self, name: &str) -> Option<&PersonRecord> {
        self.people.iter().find(|p| p.name == name)
    }

    /// Builds the person's plan for `fiscal_year`. Entry windows are clipped to
    /// the fiscal year and entries entirely outside it are left out.
    pub fn plan_for(&self, person: &PersonRecord, fiscal_year: FiscalYear) -> BookingResult<BookingPlan> {
        let mut entries = Vec::with_capacity(person.entries.len());
        for line in &person.entries {
            let definition = self.codes.get(&line.code).ok_or_else(|| BookingError::UnknownCode {
                person: person.name.clone(),
                key: line.code.clone(),
            })?;
            let spec = definition.spec(fiscal_year);
            let mut entry = Entry::new(&spec, line.fte);
            if let Some(start) = line.start {
                entry = entry.starting(start);
            }
            if let Some(end) = line.end {
                entry = entry.ending(end);
            }
            if let Some(priority) = line.priority {
                entry = entry.with_priority(priority);
            }
            let explicit_window = (line.start.or(definition.start), line.end.or(definition.end));
            if matches!(explicit_window, (Some(start), Some(end)) if start > end) {
                // Caught by plan validation
                entries.push(entry);
                continue;
            }

            let start = entry.start_date.max(fiscal_year.start());
            let end = entry.end_date.min(fiscal_year.end());
            if start > end {
                debug!(
                    "{}: {} is outside fiscal year {}, leaving it out",
                    person.name, entry.code, fiscal_year.0
                );
                continue;
            }
            entries.push(entry.starting(start).ending(end));
        }
        BookingPlan::new(entries)
    }
}
