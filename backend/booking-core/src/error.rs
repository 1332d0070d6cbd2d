// src/error.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

// --- Error Types ---

#[derive(Error, Debug)]
pub enum BookingError {
    // Configuration errors: fatal for one person's plan, never for the whole run
    #[error("Booking plan has no entries")]
    EmptyPlan,
    #[error("Total FTE for plan ({total:.2}) != 1.0, no blank entries")]
    ShareTotalMismatch { total: f64 },
    #[error("Total FTE for plan ({total:.2}) > 1.0")]
    ShareTotalExceeded { total: f64 },
    #[error("Invalid FTE share {share} for {code}")]
    InvalidShare { code: String, share: f64 },
    #[error("Entry for {code} starts on {start} but ends on {end}")]
    InvalidWindow {
        code: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Roster entry for {person} refers to unknown code '{key}'")]
    UnknownCode { person: String, key: String },
    #[error("Could not parse funding code from '{0}'")]
    InvalidCode(String),

    // Logic errors: a bug in reconciliation or rounding
    #[error("Rounded bookings for {date} add up to {actual}, expected {expected}")]
    RoundingMismatch {
        date: NaiveDate,
        expected: Decimal,
        actual: Decimal,
    },
    #[error("Non-finite hours computed for {date}")]
    NonFiniteHours { date: NaiveDate },

    // I/O and formats
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid off-day cache line {line_number}: '{line}'")]
    InvalidCacheLine { line_number: usize, line: String },
}

impl BookingError {
    /// True for errors caused by a person's plan data. Drivers looping over
    /// several people skip that person and carry on.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BookingError::EmptyPlan
                | BookingError::ShareTotalMismatch { .. }
                | BookingError::ShareTotalExceeded { .. }
                | BookingError::InvalidShare { .. }
                | BookingError::InvalidWindow { .. }
                | BookingError::UnknownCode { .. }
                | BookingError::InvalidCode(_)
        )
    }
}

pub type BookingResult<T> = std::result::Result<T, BookingError>;
