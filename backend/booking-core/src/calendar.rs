// src/calendar.rs
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::BTreeMap;
use tracing::debug;

// Off-hours within this of a full day count as a whole day off
const WHOLE_DAY_TOLERANCE: f64 = 1e-9;

/// Hours already accounted for as non-working, per date. Site holidays and
/// personal leave are merged into the same map; missing dates mean zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarFacts {
    off_hours: BTreeMap<NaiveDate, f64>,
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

impl CalendarFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site_holidays<I>(holidays: I, hours_per_day: f64) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut facts = Self::new();
        for day in holidays {
            facts.add_whole_day(day, hours_per_day);
        }
        facts
    }

    pub fn off_hours(&self, date: NaiveDate) -> f64 {
        self.off_hours.get(&date).copied().unwrap_or(0.0)
    }

    pub fn set_off_hours(&mut self, date: NaiveDate, hours: f64) {
        self.off_hours.insert(date, hours);
    }

    pub fn add_whole_day(&mut self, date: NaiveDate, hours_per_day: f64) {
        self.off_hours.insert(date, hours_per_day);
    }

    /// Spreads `hours` of absence over the weekdays in `start..=end`, filling
    /// each day up to `hours_per_day` so any left-over hours land on the last day.
    /// e.g. 8.4 hours over 2 days is 7.4 hours on day 1, 1 hour on day 2.
    pub fn add_absence(&mut self, start: NaiveDate, end: NaiveDate, hours: f64, hours_per_day: f64) {
        let mut remaining = hours;
        let mut day = start;
        while day <= end && remaining > 0.0 {
            if is_weekday(day) {
                let hours_this_day = remaining.min(hours_per_day);
                self.off_hours.insert(day, hours_this_day);
                remaining -= hours_this_day;
            }
            day = match day.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }
        if remaining > WHOLE_DAY_TOLERANCE {
            debug!(
                "Absence {}..{} has {:.2} hours left over after filling every weekday",
                start, end, remaining
            );
        }
    }

    /// Later facts win for dates present in both.
    pub fn merge(&mut self, other: &CalendarFacts) {
        for (day, hours) in &other.off_hours {
            self.off_hours.insert(*day, *hours);
        }
    }

    /// A full day's worth of off-hours (or more) removes the day entirely.
    pub fn is_whole_day_off(&self, date: NaiveDate, hours_per_day: f64) -> bool {
        self.off_hours(date) > hours_per_day - WHOLE_DAY_TOLERANCE
    }

    /// Mon-Fri dates in `start..=end` that are not whole days off.
    /// Partial days off still count.
    pub fn working_days_between(&self, start: NaiveDate, end: NaiveDate, hours_per_day: f64) -> u32 {
        if start > end {
            return 0;
        }
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| is_weekday(*day) && !self.is_whole_day_off(*day, hours_per_day))
            .count() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &f64)> {
        self.off_hours.iter()
    }

    pub fn len(&self) -> usize {
        self.off_hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.off_hours.is_empty()
    }
}

impl FromIterator<(NaiveDate, f64)> for CalendarFacts {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, f64)>>(iter: T) -> Self {
        Self {
            off_hours: iter.into_iter().collect(),
        }
    }
}
