// src/allocation.rs
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

use crate::booking_plan::{BookingPlan, Entry, FundingCode, Priority};
use crate::calendar::CalendarFacts;
use crate::error::{BookingError, BookingResult};
use crate::fair_round::fair_round;
use crate::ledger::LoggedHours;

// --- Settings ---

pub const DEFAULT_HOURS_PER_DAY: f64 = 7.4;
pub const DEFAULT_DAYS_PER_FTE: f64 = 215.0;
/// The timecard system accepts hours to 0.01 and rejects days that don't add up.
pub const DEFAULT_GRANULARITY: f64 = 0.01;
pub const DEFAULT_RECONCILE_TOLERANCE: f64 = 0.5;
pub const DEFAULT_LEAVE_PROJECT: &str = "STRA00009";
pub const DEFAULT_LEAVE_TASK: &str = "01.01";

// Two days whose bookings differ by less than this per code are the same
const CLOSE_HOURS: Decimal = dec!(0.000001);

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSettings {
    /// Nominal length of a full working day.
    pub hours_per_day: f64,
    /// Working days in a full fiscal year for a 1.0 FTE share.
    pub days_per_fte: f64,
    pub granularity: f64,
    /// Raw daily totals this close to the available hours skip reweighting.
    pub reconcile_tolerance: f64,
    /// Unproductive/leave code that absorbs days and part-days off.
    pub leave_code: FundingCode,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            hours_per_day: DEFAULT_HOURS_PER_DAY,
            days_per_fte: DEFAULT_DAYS_PER_FTE,
            granularity: DEFAULT_GRANULARITY,
            reconcile_tolerance: DEFAULT_RECONCILE_TOLERANCE,
            leave_code: FundingCode::new(DEFAULT_LEAVE_PROJECT, DEFAULT_LEAVE_TASK),
        }
    }
}

impl BookingSettings {
    fn decimal_places(&self) -> u32 {
        (-self.granularity.log10()).round().max(0.0) as u32
    }

    fn to_hours(&self, value: f64, date: NaiveDate) -> BookingResult<Decimal> {
        Decimal::from_f64(value)
            .map(|hours| {
                hours
                    .round_dp_with_strategy(self.decimal_places(), RoundingStrategy::MidpointAwayFromZero)
                    .normalize()
            })
            .ok_or(BookingError::NonFiniteHours { date })
    }
}

// --- Allocation Result ---

/// Hours given to one active plan entry on one day, with the priority it was
/// treated as for that day.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryBooking {
    pub entry_index: usize,
    pub code: FundingCode,
    pub priority: Priority,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayAllocation {
    pub date: NaiveDate,
    /// Hours per distinct code, zero bookings left out. Includes the leave
    /// code when part or all of the day is off.
    pub bookings: BTreeMap<FundingCode, Decimal>,
    /// Per-entry breakdown for the entries active on `date`.
    pub entries: Vec<EntryBooking>,
}

impl DayAllocation {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            bookings: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.bookings.values().copied().sum()
    }

    pub fn hours_for(&self, code: &FundingCode) -> Decimal {
        self.bookings.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Same codes with every value numerically indistinguishable.
    pub fn is_close_to(&self, other: &DayAllocation) -> bool {
        self.bookings.len() == other.bookings.len()
            && self.bookings.iter().all(|(code, hours)| {
                other
                    .bookings
                    .get(code)
                    .map_or(false, |theirs| (*hours - *theirs).abs() < CLOSE_HOURS)
            })
    }
}

// --- Booking Run ---

/// Allocates days for one person's plan. Keeps a running total of what it has
/// booked so later days in the same run treat earlier output as logged.
pub struct BookingRun<'a> {
    plan: &'a BookingPlan,
    calendar: &'a CalendarFacts,
    logged: &'a LoggedHours,
    settings: &'a BookingSettings,
    booked: HashMap<FundingCode, Decimal>,
}

impl<'a> BookingRun<'a> {
    pub fn new(
        plan: &'a BookingPlan,
        calendar: &'a CalendarFacts,
        logged: &'a LoggedHours,
        settings: &'a BookingSettings,
    ) -> Self {
        Self {
            plan,
            calendar,
            logged,
            settings,
            booked: HashMap::new(),
        }
    }

    pub fn plan(&self) -> &BookingPlan {
        self.plan
    }

    /// Hours this run has booked to `code` so far.
    pub fn booked_this_run(&self, code: &FundingCode) -> Decimal {
        self.booked.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn reset(&mut self) {
        self.booked.clear();
    }

    fn remaining_working_days(&self, entry: &Entry, date: NaiveDate) -> u32 {
        self.calendar
            .working_days_between(date, entry.end_date, self.settings.hours_per_day)
    }

    /// Daily hours needed for `entry` to reach its annual target by the end of
    /// its window, given what has been logged so far. Zero outside the window.
    pub fn catch_up_hours(&self, entry: &Entry, date: NaiveDate) -> f64 {
        if !entry.is_active(date) {
            return 0.0;
        }
        let hours_logged = self.logged.get(&entry.code)
            + self.booked_this_run(&entry.code).to_f64().unwrap_or(0.0);
        let target = self.settings.hours_per_day * self.settings.days_per_fte * entry.share();
        let hours_needed = target - hours_logged;
        let days_left = self.remaining_working_days(entry, date);
        debug!(
            "{}: target {:.2}, logged {:.2}, needed {:.2} over {} days",
            entry.code, target, hours_logged, hours_needed, days_left
        );
        if days_left == 0 {
            return 0.0;
        }
        (hours_needed / days_left as f64).max(0.0)
    }

    /// Works out the bookings for `date` and records them in the run total.
    /// Callers skip weekends themselves.
    pub fn allocate(&mut self, date: NaiveDate) -> BookingResult<DayAllocation> {
        let settings = self.settings;
        let plan = self.plan;
        let hours_per_day = settings.hours_per_day;
        let off_hours = self.calendar.off_hours(date);
        let mut allocation = DayAllocation::empty(date);

        if self.calendar.is_whole_day_off(date, hours_per_day) {
            debug!("{} is a whole day off", date);
            allocation
                .bookings
                .insert(settings.leave_code.clone(), settings.to_hours(hours_per_day, date)?);
            return Ok(allocation);
        }
        // Leave is booked at the granularity, so the plan gets whatever that leaves
        let nominal = settings.to_hours(hours_per_day, date)?;
        let leave = settings.to_hours(off_hours.max(0.0), date)?;
        if leave > Decimal::ZERO {
            allocation.bookings.insert(settings.leave_code.clone(), leave);
        }
        let working = nominal - leave;
        let working_hours = working.to_f64().ok_or(BookingError::NonFiniteHours { date })?;

        let mut active: Vec<(usize, &Entry)> = plan
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_active(date))
            .collect();
        if active.is_empty() {
            debug!("No active entries on {}", date);
            return Ok(allocation);
        }

        // Top priority (0) first; stable so plan order breaks ties
        active.sort_by_key(|(_, entry)| entry.priority);
        let mut priorities: Vec<Priority> = active.iter().map(|(_, e)| e.priority).collect();
        if !priorities.contains(&Priority::Balancing) {
            let last = priorities.len() - 1;
            info!(
                "No balancing entry active on {}; treating {} as balancing for the day",
                date, active[last].1.code
            );
            priorities[last] = Priority::Balancing;
        }
        let days_left: Vec<u32> = active
            .iter()
            .map(|(_, entry)| self.remaining_working_days(entry, date))
            .collect();

        let mut hours = vec![0.0_f64; active.len()];
        let mut hours_left = working_hours;
        for (i, (_, entry)) in active.iter().enumerate() {
            if priorities[i] != Priority::Balancing {
                hours[i] = self.catch_up_hours(entry, date);
                hours_left -= hours[i];
            }
        }

        // Apportion what is left by share of expected booking
        let balancing: Vec<usize> = (0..active.len())
            .filter(|&i| priorities[i] == Priority::Balancing)
            .collect();
        let balancing_share: f64 = balancing.iter().map(|&i| active[i].1.share()).sum();
        for &i in &balancing {
            let fraction = if balancing_share > 0.0 {
                active[i].1.share() / balancing_share
            } else {
                1.0 / balancing.len() as f64
            };
            hours[i] = (hours_left * fraction).clamp(0.0, hours_per_day);
        }
        for (i, (_, entry)) in active.iter().enumerate() {
            debug!("{} ({:?}): {:.4} raw hours", entry.code, priorities[i], hours[i]);
        }

        // Catch-up values follow annual targets, not today's capacity, so the
        // raw total can be well off. Weight by remaining time and priority:
        // fewer days left and higher priority keep more of their share.
        let raw_total: f64 = hours.iter().sum();
        if (raw_total - working_hours).abs() > settings.reconcile_tolerance {
            debug!(
                "Raw total {:.2} vs {:.2} available on {}, reweighting",
                raw_total, working_hours, date
            );
            for (i, h) in hours.iter_mut().enumerate() {
                let weight = days_left[i].max(1) as f64 * (priorities[i].rank() + 1) as f64;
                *h /= weight;
            }
        }

        let weighted_total: f64 = hours.iter().sum();
        if weighted_total > 0.0 {
            let scale_factor = weighted_total / working_hours;
            for h in hours.iter_mut() {
                *h /= scale_factor;
            }
        } else {
            for &i in &balancing {
                hours[i] = working_hours / balancing.len() as f64;
            }
        }
        if hours.iter().any(|h| !h.is_finite()) {
            error!("Non-finite hours on {}: {:?}", date, hours);
            return Err(BookingError::NonFiniteHours { date });
        }

        let rounded = fair_round(&hours, settings.granularity);
        let mut booked_hours = Vec::with_capacity(rounded.len());
        for value in rounded {
            booked_hours.push(settings.to_hours(value, date)?);
        }
        let actual: Decimal = booked_hours.iter().copied().sum();
        if actual != working {
            error!(
                "Rounded bookings for {} add up to {}, expected {}: {:?}",
                date, actual, working, booked_hours
            );
            return Err(BookingError::RoundingMismatch {
                date,
                expected: working,
                actual,
            });
        }

        // Add up any codes that are identical
        for (i, (entry_index, entry)) in active.iter().enumerate() {
            let hrs = booked_hours[i];
            allocation.entries.push(EntryBooking {
                entry_index: *entry_index,
                code: entry.code.clone(),
                priority: priorities[i],
                hours: hrs,
            });
            if hrs > Decimal::ZERO {
                *allocation
                    .bookings
                    .entry(entry.code.clone())
                    .or_insert(Decimal::ZERO) += hrs;
                // Keep track of new bookings so amounts don't drift through the week
                *self.booked.entry(entry.code.clone()).or_insert(Decimal::ZERO) += hrs;
            }
        }
        debug!("Bookings for {}: {:?}", date, allocation.bookings);
        Ok(allocation)
    }
}

/// Allocates a single day with a fresh run total.
pub fn allocate(
    plan: &BookingPlan,
    date: NaiveDate,
    calendar: &CalendarFacts,
    logged: &LoggedHours,
    settings: &BookingSettings,
) -> BookingResult<DayAllocation> {
    BookingRun::new(plan, calendar, logged, settings).allocate(date)
}
