use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the effort core before or during a computation.
#[derive(Debug, Error)]
pub enum EffortError {
    /// The academic year did not match `YYYY-YYYY`.
    #[error("invalid academic year '{0}': expected YYYY-YYYY")]
    InvalidAcademicYear(String),

    /// The academic year matched the pattern but its years are not adjacent.
    #[error("academic year '{0}' must span consecutive years")]
    NonConsecutiveYears(String),

    /// A percentage assignment outside 0 to 100.
    #[error("percentage {0} is outside 0..=100")]
    PercentOutOfRange(Decimal),

    /// An interval or window whose end precedes its start.
    #[error("date range {start} to {end} ends before it starts")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// A data-access or persistence collaborator failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for EffortError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EffortError>;
