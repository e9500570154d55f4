use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Typed errors raised by the metrics engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error(
        "Invalid record #{sequence} on {date}: departure {departure} precedes arrival {arrival}"
    )]
    InvalidRecord {
        sequence: usize,
        date: NaiveDate,
        arrival: NaiveDateTime,
        departure: NaiveDateTime,
    },
    #[error("No visits in the selected range")]
    EmptyDataset,
    #[error("No gaps available: no date has two or more visits")]
    NoGapsAvailable,
}

pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
