// src/booking_plan.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{BookingError, BookingResult};
use crate::fiscal::FiscalYear;

pub const DEFAULT_TASK: &str = "01";
/// Explicit shares may miss 1.0 by this much before the plan is rejected.
pub const SHARE_TOLERANCE: f64 = 1e-4;

static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_-]+)(?:\s*[/\s]\s*([A-Za-z0-9._-]+))?\s*$")
        .expect("funding code pattern is valid")
});

// --- Priority ---

/// Lower value = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Externally funded; aim to book exactly as expected.
    External = 0,
    /// Internally funded with a committed amount of time.
    Agreed = 1,
    /// Absorbs whatever time is left so the day adds up.
    Balancing = 2,
}

impl Priority {
    pub fn rank(self) -> u32 {
        self as u32
    }
}

// --- Funding Code ---

/// A project-task pair that hours are booked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FundingCode {
    pub project: String,
    pub task: String,
}

impl FundingCode {
    pub fn new(project: &str, task: &str) -> Self {
        Self {
            project: project.trim().to_string(),
            task: task.trim().to_string(),
        }
    }

    pub fn with_default_task(project: &str) -> Self {
        Self::new(project, DEFAULT_TASK)
    }
}

impl fmt::Display for FundingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.project, self.task)
    }
}

impl FromStr for FundingCode {
    type Err = BookingError;

    /// Accepts "PROJECT TASK", "PROJECT/TASK" or a bare "PROJECT".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = CODE_PATTERN
            .captures(s)
            .ok_or_else(|| BookingError::InvalidCode(s.to_string()))?;
        let project = &caps[1];
        let task = caps.get(2).map(|m| m.as_str()).unwrap_or(DEFAULT_TASK);
        Ok(FundingCode::new(project, task))
    }
}

/// A funding code together with its own active window and default priority.
/// Entries take these defaults unless they override them.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSpec {
    pub code: FundingCode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub priority: Priority,
}

impl CodeSpec {
    pub fn new(code: FundingCode, fiscal_year: FiscalYear) -> Self {
        Self {
            code,
            start: fiscal_year.start(),
            end: fiscal_year.end(),
            priority: Priority::External,
        }
    }

    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

// --- Entry ---

/// One line of a person's booking plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub code: FundingCode,
    /// Fraction of a work-year. `None` takes an even split of what is left.
    pub annual_fte: Option<f64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub priority: Priority,
}

impl Entry {
    pub fn new(spec: &CodeSpec, annual_fte: Option<f64>) -> Self {
        Self {
            code: spec.code.clone(),
            annual_fte,
            start_date: spec.start,
            end_date: spec.end,
            priority: spec.priority,
        }
    }

    pub fn starting(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn ending(mut self, end_date: NaiveDate) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn share(&self) -> f64 {
        self.annual_fte.unwrap_or(0.0)
    }

    pub fn is_active(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2}, from {}-{}, priority {:?}",
            self.code,
            self.share(),
            self.start_date.format("%d/%m/%Y"),
            self.end_date.format("%d/%m/%Y"),
            self.priority
        )
    }
}

// --- Booking Plan ---

/// A validated set of entries whose shares add up to one full work-year.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPlan {
    entries: Vec<Entry>,
}

impl BookingPlan {
    pub fn new(mut entries: Vec<Entry>) -> BookingResult<Self> {
        if entries.is_empty() {
            return Err(BookingError::EmptyPlan);
        }
        for entry in &entries {
            if entry.start_date > entry.end_date {
                return Err(BookingError::InvalidWindow {
                    code: entry.code.to_string(),
                    start: entry.start_date,
                    end: entry.end_date,
                });
            }
            if let Some(share) = entry.annual_fte {
                if !share.is_finite() || share < 0.0 {
                    return Err(BookingError::InvalidShare {
                        code: entry.code.to_string(),
                        share,
                    });
                }
            }
        }

        // Any balancing entries? If not, the lowest-priority one (last on ties) becomes one
        if !entries.iter().any(|e| e.priority == Priority::Balancing) {
            let lowest = entries
                .iter()
                .enumerate()
                .max_by_key(|(i, e)| (e.priority, *i))
                .map(|(i, _)| i)
                .unwrap_or(0);
            info!(
                "No balancing entries found. Setting {} to balancing",
                entries[lowest].code
            );
            entries[lowest].priority = Priority::Balancing;
        }

        let mut plan = Self { entries };
        let blank_count = plan.entries.iter().filter(|e| e.annual_fte.is_none()).count();
        let explicit_total = plan.total_share();

        if blank_count == 0 {
            if (explicit_total - 1.0).abs() > SHARE_TOLERANCE {
                return Err(BookingError::ShareTotalMismatch {
                    total: explicit_total,
                });
            }
            return Ok(plan);
        }

        let fte_share = (1.0 - explicit_total) / blank_count as f64;
        if fte_share < -SHARE_TOLERANCE {
            return Err(BookingError::ShareTotalExceeded {
                total: explicit_total,
            });
        }
        let fte_share = fte_share.max(0.0);
        for entry in plan.entries.iter_mut().filter(|e| e.annual_fte.is_none()) {
            debug!("Setting {} FTE share to {:.4}", entry.code, fte_share);
            entry.annual_fte = Some(fte_share);
        }
        Ok(plan)
    }

    /// Sum of the annual FTE shares across all entries.
    pub fn total_share(&self) -> f64 {
        self.entries.iter().map(Entry::share).sum()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Distinct funding codes, in plan order.
    pub fn codes(&self) -> Vec<FundingCode> {
        let mut codes: Vec<FundingCode> = Vec::new();
        for entry in &self.entries {
            if !codes.contains(&entry.code) {
                codes.push(entry.code.clone());
            }
        }
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn spec(project: &str, task: &str, priority: Priority) -> CodeSpec {
        CodeSpec::new(FundingCode::new(project, task), FiscalYear(2025)).with_priority(priority)
    }

    #[test]
    fn funding_codes_compare_by_project_and_task() {
        let a = FundingCode::new("STKA00183", "06.05");
        let b: FundingCode = "STKA00183/06.05".parse().unwrap();
        let c: FundingCode = " STKA00183   06.05 ".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(FundingCode::new("A", "01") < FundingCode::new("A", "02"));
        assert!(FundingCode::new("A", "99") < FundingCode::new("B", "01"));
    }

    #[test]
    fn funding_code_parse_defaults_task() {
        let code: FundingCode = "STRA00009".parse().unwrap();
        assert_eq!(code, FundingCode::new("STRA00009", DEFAULT_TASK));
        assert_eq!(code.to_string(), "STRA00009 01");
        assert!(matches!(
            "".parse::<FundingCode>(),
            Err(BookingError::InvalidCode(_))
        ));
        assert!(matches!(
            "A B C".parse::<FundingCode>(),
            Err(BookingError::InvalidCode(_))
        ));
    }

    #[test]
    fn entry_takes_code_defaults_unless_overridden() {
        let s = spec("X", "01", Priority::Agreed);
        let entry = Entry::new(&s, Some(0.5));
        assert_eq!(entry.start_date, d("2025-04-01"));
        assert_eq!(entry.end_date, d("2026-03-31"));
        assert_eq!(entry.priority, Priority::Agreed);

        let custom = Entry::new(&s, None)
            .starting(d("2025-06-01"))
            .ending(d("2025-09-30"))
            .with_priority(Priority::External);
        assert_eq!(custom.start_date, d("2025-06-01"));
        assert_eq!(custom.end_date, d("2025-09-30"));
        assert_eq!(custom.priority, Priority::External);
        assert!(custom.is_active(d("2025-06-01")));
        assert!(custom.is_active(d("2025-09-30")));
        assert!(!custom.is_active(d("2025-10-01")));
    }

    #[test]
    fn explicit_shares_over_one_are_rejected() {
        let result = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.55)),
            Entry::new(&spec("B", "01", Priority::Balancing), Some(0.5)),
        ]);
        match result {
            Err(BookingError::ShareTotalMismatch { total }) => {
                assert!((total - 1.05).abs() < 1e-9)
            }
            other => panic!("Expected ShareTotalMismatch, got {:?}", other),
        }
    }

    #[test]
    fn explicit_shares_under_one_are_rejected() {
        let result = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.4)),
            Entry::new(&spec("B", "01", Priority::Balancing), Some(0.5)),
        ]);
        assert!(matches!(result, Err(BookingError::ShareTotalMismatch { .. })));
    }

    #[test]
    fn blank_share_takes_the_remainder() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.57)),
            Entry::new(&spec("B", "01", Priority::Agreed), Some(0.4)),
            Entry::new(&spec("C", "01", Priority::Balancing), None),
        ])
        .unwrap();
        assert!((plan.entries()[2].share() - 0.03).abs() < 1e-9);
        assert!((plan.total_share() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blank_shares_split_evenly() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.5)),
            Entry::new(&spec("B", "01", Priority::Balancing), None),
            Entry::new(&spec("C", "01", Priority::Balancing), None),
        ])
        .unwrap();
        assert!((plan.entries()[1].share() - 0.25).abs() < 1e-9);
        assert!((plan.entries()[2].share() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn blank_share_with_explicit_total_over_one_is_rejected() {
        let result = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.8)),
            Entry::new(&spec("B", "01", Priority::Agreed), Some(0.3)),
            Entry::new(&spec("C", "01", Priority::Balancing), None),
        ]);
        assert!(matches!(result, Err(BookingError::ShareTotalExceeded { .. })));
    }

    #[test]
    fn exact_plan_is_accepted() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.25)),
            Entry::new(&spec("B", "01", Priority::Agreed), Some(0.25)),
            Entry::new(&spec("C", "01", Priority::Balancing), Some(0.5)),
        ])
        .unwrap();
        assert_eq!(plan.total_share(), 1.0);
        assert_eq!(plan.entries().len(), 3);
    }

    #[test]
    fn last_lowest_priority_entry_becomes_balancing() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.3)),
            Entry::new(&spec("B", "01", Priority::Agreed), Some(0.3)),
            Entry::new(&spec("C", "01", Priority::Agreed), Some(0.4)),
        ])
        .unwrap();
        let priorities: Vec<Priority> = plan.entries().iter().map(|e| e.priority).collect();
        assert_eq!(
            priorities,
            vec![Priority::External, Priority::Agreed, Priority::Balancing]
        );
    }

    #[test]
    fn all_external_plan_coerces_last_entry() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("A", "01", Priority::External), Some(0.5)),
            Entry::new(&spec("B", "01", Priority::External), Some(0.5)),
        ])
        .unwrap();
        let balancing: Vec<&FundingCode> = plan
            .entries()
            .iter()
            .filter(|e| e.priority == Priority::Balancing)
            .map(|e| &e.code)
            .collect();
        assert_eq!(balancing, vec![&FundingCode::new("B", "01")]);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        assert!(matches!(BookingPlan::new(vec![]), Err(BookingError::EmptyPlan)));

        let backwards = Entry::new(&spec("A", "01", Priority::Balancing), Some(1.0))
            .starting(d("2025-09-01"))
            .ending(d("2025-08-01"));
        assert!(matches!(
            BookingPlan::new(vec![backwards]),
            Err(BookingError::InvalidWindow { .. })
        ));

        let negative = Entry::new(&spec("A", "01", Priority::Balancing), Some(-0.1));
        let err = BookingPlan::new(vec![negative]).unwrap_err();
        assert!(matches!(err, BookingError::InvalidShare { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn codes_are_deduplicated_in_plan_order() {
        let plan = BookingPlan::new(vec![
            Entry::new(&spec("B", "01", Priority::External), Some(0.25))
                .ending(d("2025-09-30")),
            Entry::new(&spec("A", "01", Priority::Agreed), Some(0.5)),
            Entry::new(&spec("B", "01", Priority::External), Some(0.25))
                .starting(d("2025-10-01")),
        ])
        .unwrap();
        assert_eq!(
            plan.codes(),
            vec![FundingCode::new("B", "01"), FundingCode::new("A", "01")]
        );
    }
}
