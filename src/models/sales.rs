use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::forecasting::Observation;

/// Payload shape errors for the forecast request
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No sales data provided")]
    NoSalesData,

    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("sales_data must be an array of {{date, sales}} objects")]
    SalesDataNotArray,

    #[error("sales_data[{index}] must be an object")]
    RecordNotObject { index: usize },

    #[error("sales_data[{index}] is missing '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Unknown datetime string format, unable to parse: {value}")]
    InvalidDate { value: String },

    #[error("sales_data[{index}].sales could not convert to float: {value}")]
    InvalidSales { index: usize, value: String },

    #[error("forecast_periods must be a positive integer, got {0}")]
    InvalidForecastPeriods(String),
}

/// One historical sales row as sent by clients.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SalesObservation {
    /// `YYYY-MM-DD`, `YYYY-MM`, `YYYY/MM/DD` or an ISO 8601 datetime
    #[schema(example = "2024-01-01")]
    pub date: String,
    /// Number or numeric string
    #[schema(value_type = f64, example = 1250.5)]
    pub sales: Value,
}

/// Body of `POST /api/forecast/prophet`; documentation shape only.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ForecastRequestBody {
    pub sales_data: Vec<SalesObservation>,
    /// Months to forecast past the last observation (default 12)
    #[schema(minimum = 1, example = 12)]
    pub forecast_periods: Option<u32>,
}

/// A validated forecast request.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    /// Observations in payload order
    pub sales_data: Vec<Observation>,
    pub forecast_periods: usize,
}

impl ForecastRequest {
    pub fn from_slice(body: &[u8], default_periods: usize) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(&value, default_periods)
    }

    /// Validates a decoded body.
    ///
    /// A missing or falsy `sales_data` is reported as [`ParseError::NoSalesData`]
    /// before anything else is inspected.
    pub fn from_value(body: &Value, default_periods: usize) -> Result<Self, ParseError> {
        let object = body.as_object().ok_or(ParseError::NotAnObject)?;

        let raw_sales = match object.get("sales_data") {
            Some(value) if !is_falsy(value) => value,
            _ => return Err(ParseError::NoSalesData),
        };

        let forecast_periods = match object.get("forecast_periods") {
            None | Some(Value::Null) => default_periods,
            Some(value) => parse_periods(value)?,
        };

        let records = raw_sales.as_array().ok_or(ParseError::SalesDataNotArray)?;
        let sales_data = records
            .iter()
            .enumerate()
            .map(|(index, record)| parse_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sales_data,
            forecast_periods,
        })
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn parse_periods(value: &Value) -> Result<usize, ParseError> {
    value
        .as_u64()
        .filter(|&n| n >= 1)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ParseError::InvalidForecastPeriods(value.to_string()))
}

fn parse_record(index: usize, record: &Value) -> Result<Observation, ParseError> {
    let fields = record
        .as_object()
        .ok_or(ParseError::RecordNotObject { index })?;

    let raw_date = fields
        .get("date")
        .ok_or(ParseError::MissingField {
            index,
            field: "date",
        })?;
    let date = match raw_date {
        Value::String(s) => parse_date(s)?,
        other => {
            return Err(ParseError::InvalidDate {
                value: other.to_string(),
            })
        }
    };

    let raw_sales = fields
        .get("sales")
        .ok_or(ParseError::MissingField {
            index,
            field: "sales",
        })?;

    Ok(Observation::new(date, parse_sales(index, raw_sales)?))
}

/// Parses the date forms clients send; any time of day is dropped.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    let s = raw.trim();

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }

    // year-month only
    if s.len() == 7 && s.as_bytes()[4] == b'-' {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
            return Ok(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.date());
        }
    }

    Err(ParseError::InvalidDate {
        value: raw.to_string(),
    })
}

fn parse_sales(index: usize, value: &Value) -> Result<f64, ParseError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ParseError::InvalidSales {
        index,
        value: value.to_string(),
    })
}
