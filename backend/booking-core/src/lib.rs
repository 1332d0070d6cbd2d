// src/lib.rs
pub mod allocation;
pub mod booking_plan;
pub mod calendar;
pub mod config;
pub mod error;
pub mod fair_round;
pub mod fiscal;
pub mod ledger;
pub mod off_days_cache;
pub mod roster;
pub mod weekly;


pub use allocation::{allocate, BookingRun, BookingSettings, DayAllocation, EntryBooking};
pub use booking_plan::{BookingPlan, CodeSpec, Entry, FundingCode, Priority};
pub use calendar::CalendarFacts;
pub use config::AppConfig;
pub use error::{BookingError, BookingResult};
pub use fair_round::fair_round;
pub use fiscal::FiscalYear;
pub use ledger::{Ledger, LedgerCache, LoggedHours};
pub use off_days_cache::OffDaysCache;
pub use roster::Roster;
pub use weekly::{EmitMode, PersonInfo, WeeklyEmitter};
