// src/weekly.rs
use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

use crate::allocation::{BookingRun, DayAllocation};
use crate::error::{BookingError, BookingResult};

pub const WORKING_DAYS_PER_WEEK: i64 = 5;
const ACTIVITY_TYPE: &str = "Labour";
const BULK_ACTION: &str = "CREATE";
const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Readable lines for typing into a timecard by hand.
    Manual,
    /// One CSV record per code per day for the bulk upload sheet.
    BulkUpload,
}

/// Who the emitted lines are for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonInfo {
    pub name: String,
    pub person_number: String,
    pub known_as: String,
}

impl PersonInfo {
    pub fn new(name: &str, person_number: &str) -> Self {
        Self {
            name: name.to_string(),
            person_number: person_number.to_string(),
            known_as: default_known_as(name),
        }
    }

    pub fn with_known_as(mut self, known_as: &str) -> Self {
        self.known_as = known_as.to_string();
        self
    }
}

pub fn default_known_as(name: &str) -> String {
    name.split_whitespace().next().unwrap_or(name).to_string()
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

// --- Emitter ---

/// Renders a person's allocations one week at a time. The last emitted day
/// carries over between weeks so repeated days stay suppressed.
pub struct WeeklyEmitter {
    person: PersonInfo,
    mode: EmitMode,
    previous: Option<DayAllocation>,
}

impl WeeklyEmitter {
    pub fn new(person: PersonInfo, mode: EmitMode) -> Self {
        Self {
            person,
            mode,
            previous: None,
        }
    }

    pub fn person(&self) -> &PersonInfo {
        &self.person
    }

    /// Allocates Monday to Friday of the week containing `week_beginning`, in
    /// date order, and returns the rendered lines. `today` is stamped into
    /// bulk upload notes.
    pub fn emit_week(
        &mut self,
        run: &mut BookingRun<'_>,
        week_beginning: NaiveDate,
        today: NaiveDate,
    ) -> BookingResult<Vec<String>> {
        let monday = monday_of(week_beginning);
        let mut lines = Vec::new();
        for offset in 0..WORKING_DAYS_PER_WEEK {
            let date = monday + Duration::days(offset);
            let allocation = run.allocate(date)?;
            match self.mode {
                EmitMode::Manual => {
                    lines.push(date.format("%a").to_string());
                    if let Some(previous) = &self.previous {
                        if allocation.is_close_to(previous) {
                            debug!("{} matches the previous day, skipping", date);
                            continue;
                        }
                    }
                    lines.extend(manual_lines(&allocation));
                }
                EmitMode::BulkUpload => {
                    lines.extend(self.bulk_upload_lines(&allocation, today)?);
                }
            }
            self.previous = Some(allocation);
        }
        Ok(lines)
    }

    fn bulk_upload_lines(&self, allocation: &DayAllocation, today: NaiveDate) -> BookingResult<Vec<String>> {
        let note = format!(
            "{} timecard submitted through bulk upload {}",
            self.person.known_as,
            today.format(DATE_FORMAT)
        );
        let day = allocation.date.format(DATE_FORMAT).to_string();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for (code, hours) in &allocation.bookings {
            let hours = format!("{:.2}", hours);
            writer.write_record([
                self.person.person_number.as_str(),
                code.project.as_str(),
                code.task.as_str(),
                ACTIVITY_TYPE,
                day.as_str(),
                hours.as_str(),
                note.as_str(),
                BULK_ACTION,
                "",
                "",
                "",
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| BookingError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

fn manual_lines(allocation: &DayAllocation) -> Vec<String> {
    allocation
        .bookings
        .iter()
        .map(|(code, hours)| format!("{}\t{:.2}", code, hours))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::BookingSettings;
    use crate::booking_plan::{BookingPlan, CodeSpec, Entry, FundingCode, Priority};
    use crate::calendar::CalendarFacts;
    use crate::fiscal::FiscalYear;
    use crate::ledger::LoggedHours;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn core_only_plan() -> BookingPlan {
        let core = CodeSpec::new(FundingCode::new("STGA00220", "01"), FiscalYear(2025))
            .with_priority(Priority::Balancing);
        BookingPlan::new(vec![Entry::new(&core, None)]).unwrap()
    }

    fn ada() -> PersonInfo {
        PersonInfo::new("Ada Lovelace", "12345")
    }

    #[test]
    fn known_as_defaults_to_first_name() {
        assert_eq!(ada().known_as, "Ada");
        assert_eq!(ada().with_known_as("Countess").known_as, "Countess");
        assert_eq!(default_known_as("Plato"), "Plato");
    }

    #[test]
    fn week_start_moves_back_to_monday() {
        assert_eq!(monday_of(d("2026-03-19")), d("2026-03-16"));
        assert_eq!(monday_of(d("2026-03-22")), d("2026-03-16"));
        assert_eq!(monday_of(d("2026-03-16")), d("2026-03-16"));
    }

    #[test]
    fn manual_mode_suppresses_repeated_days() {
        let plan = core_only_plan();
        let mut calendar = CalendarFacts::new();
        calendar.add_whole_day(d("2026-03-18"), 7.4);
        let logged = LoggedHours::new();
        let settings = BookingSettings::default();
        let mut run = BookingRun::new(&plan, &calendar, &logged, &settings);
        let mut emitter = WeeklyEmitter::new(ada(), EmitMode::Manual);

        // Thursday still emits the whole week from Monday
        let lines = emitter.emit_week(&mut run, d("2026-03-19"), d("2026-03-13")).unwrap();
        assert_eq!(
            lines,
            vec![
                "Mon",
                "STGA00220 01\t7.40",
                "Tue",
                "Wed",
                "STRA00009 01.01\t7.40",
                "Thu",
                "STGA00220 01\t7.40",
                "Fri",
            ]
        );

        // Nothing changes the following week either
        let next_week = emitter.emit_week(&mut run, d("2026-03-23"), d("2026-03-13")).unwrap();
        assert_eq!(next_week, vec!["Mon", "Tue", "Wed", "Thu", "Fri"]);
    }

    #[test]
    fn bulk_upload_emits_every_day() {
        let plan = core_only_plan();
        let calendar = CalendarFacts::new();
        let logged = LoggedHours::new();
        let settings = BookingSettings::default();
        let mut run = BookingRun::new(&plan, &calendar, &logged, &settings);
        let mut emitter = WeeklyEmitter::new(ada(), EmitMode::BulkUpload);

        let lines = emitter.emit_week(&mut run, d("2026-03-16"), d("2026-03-13")).unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "12345,STGA00220,01,Labour,16/03/2026,7.40,\
             Ada timecard submitted through bulk upload 13/03/2026,CREATE,,,"
        );
        assert!(lines[4].contains(",20/03/2026,7.40,"));
    }
}
