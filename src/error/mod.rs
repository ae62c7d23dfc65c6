use thiserror::Error;

/// Errors raised by the aggregation core and its boundary checks.
///
/// I/O, database and network failures travel as `anyhow::Error`; these
/// variants are the ones callers are expected to match on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDateRange(String),

    #[error("invalid population {0}: must be a positive number")]
    InvalidPopulation(f64),

    #[error("unknown province slug {0:?}")]
    UnknownProvince(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
