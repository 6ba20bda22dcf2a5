//! Request and response shapes of the HTTP API.

pub mod forecast;
pub mod sales;

pub use forecast::{
    DataInfo, FittedPoint, ForecastPoint, ForecastResponse, HealthResponse, TrendPoint,
};
pub use sales::{parse_date, ForecastRequest, ForecastRequestBody, ParseError, SalesObservation};
