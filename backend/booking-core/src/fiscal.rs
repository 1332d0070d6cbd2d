// src/fiscal.rs
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const FISCAL_YEAR_START_MONTH: u32 = 4;

/// An April 1 to March 31 booking year, named by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiscalYear(pub i32);

impl FiscalYear {
    pub fn containing(date: NaiveDate) -> Self {
        // last calendar year if before April
        if date.month() < FISCAL_YEAR_START_MONTH {
            FiscalYear(date.year() - 1)
        } else {
            FiscalYear(date.year())
        }
    }

    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, FISCAL_YEAR_START_MONTH, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 + 1, FISCAL_YEAR_START_MONTH - 1, 31).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start() <= date && date <= self.end()
    }

    pub fn next(&self) -> Self {
        FiscalYear(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    #[test]
    fn dates_before_april_belong_to_previous_year() {
        assert_eq!(FiscalYear::containing(d("2026-03-31")), FiscalYear(2025));
        assert_eq!(FiscalYear::containing(d("2026-01-15")), FiscalYear(2025));
        assert_eq!(FiscalYear::containing(d("2026-04-01")), FiscalYear(2026));
    }

    #[test]
    fn window_runs_april_to_march() {
        let fy = FiscalYear(2025);
        assert_eq!(fy.start(), d("2025-04-01"));
        assert_eq!(fy.end(), d("2026-03-31"));
        assert!(fy.contains(d("2025-12-25")));
        assert!(!fy.contains(d("2026-04-01")));
        assert_eq!(fy.next(), FiscalYear(2026));
    }
}
