use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::accuracy::MetricsReport;

/// In-sample fit for one input row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FittedPoint {
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub date: NaiveDate,
    pub actual: f64,
    /// `null` when the model produced no in-sample value for the date
    pub predicted: Option<f64>,
}

/// Out-of-sample forecast for one future month.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastPoint {
    #[schema(value_type = String, format = Date, example = "2025-01-01")]
    pub date: NaiveDate,
    pub forecast: f64,
    pub forecast_lower: f64,
    pub forecast_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrendPoint {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DataInfo {
    pub total_records: usize,
    pub forecast_periods: usize,
}

/// Successful forecast envelope.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub success: bool,
    pub historical_data: Vec<FittedPoint>,
    pub future_forecast: Vec<ForecastPoint>,
    /// In-sample rows first, then future rows
    pub trend: Vec<TrendPoint>,
    pub metrics: MetricsReport,
    pub data_info: DataInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "Prophet Forecasting")]
    pub model: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            model: "Prophet Forecasting".to_string(),
        }
    }
}
