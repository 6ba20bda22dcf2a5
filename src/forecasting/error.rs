use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while fitting or evaluating the forecasting model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Dataframe has less than 2 non-NaN rows (got {rows})")]
    InsufficientData { rows: usize },

    #[error("All observations share the date {date}; the time axis cannot be scaled")]
    DegenerateTimeRange { date: NaiveDate },

    #[error("Observation on {date} has a non-finite value ({value})")]
    NonFiniteValue { date: NaiveDate, value: f64 },

    #[error("Model has not been fit; call fit() before predict()")]
    NotFitted,

    #[error("Model has already been fit; create a new instance to refit")]
    AlreadyFitted,

    #[error("Linear algebra failure: {0}")]
    Linalg(String),

    #[error("Date arithmetic overflowed after {0}")]
    DateOutOfRange(NaiveDate),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}
