use std::collections::HashMap;

use anyhow::{anyhow, Context};
use axum::{body::Bytes, extract::rejection::BytesRejection};
use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::{
    accuracy::MetricsReport,
    config::AppConfig,
    errors::ApiError,
    forecasting::{month_starts_after, AdditiveModel, Forecaster, ModelConfig, Prediction},
    metrics::FORECAST_METRICS,
    models::{
        DataInfo, FittedPoint, ForecastPoint, ForecastRequest, ForecastResponse, ParseError,
        TrendPoint,
    },
    tracing::timed,
};

/// Runs the fit / predict / evaluate pipeline behind the forecast endpoint
#[derive(Debug, Clone)]
pub struct ForecastingService {
    model_config: ModelConfig,
    default_periods: usize,
    verbose_errors: bool,
}

impl ForecastingService {
    pub fn new(model_config: ModelConfig, default_periods: usize) -> Self {
        Self {
            model_config,
            default_periods,
            verbose_errors: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model_config: config.model.clone(),
            default_periods: config.default_forecast_periods,
            verbose_errors: config.debug,
        }
    }

    /// Handles a raw request body.
    ///
    /// Missing sales data is a bad request; every other failure, including
    /// malformed JSON, is an internal error.
    pub async fn forecast_from_body(&self, body: Bytes) -> Result<ForecastResponse, ApiError> {
        FORECAST_METRICS.requests_total.inc();

        let request = match ForecastRequest::from_slice(&body, self.default_periods) {
            Ok(request) => request,
            Err(ParseError::NoSalesData) => {
                FORECAST_METRICS.bad_requests_total.inc();
                return Err(ApiError::BadRequest(ParseError::NoSalesData.to_string()));
            }
            Err(e) => {
                let error = anyhow::Error::new(e).context("parsing forecast request");
                return Err(self.failure(error));
            }
        };

        let service = self.clone();
        let outcome = tokio::task::spawn_blocking(move || service.forecast(request))
            .await
            .context("forecast worker terminated unexpectedly")
            .and_then(|result| result);

        outcome.map_err(|e| self.failure(e))
    }

    /// Body that could not be buffered, e.g. over the configured size limit.
    pub fn unreadable_body(&self, rejection: BytesRejection) -> ApiError {
        FORECAST_METRICS.requests_total.inc();
        self.failure(anyhow::Error::new(rejection).context("reading request body"))
    }

    fn failure(&self, error: anyhow::Error) -> ApiError {
        FORECAST_METRICS.failures_total.inc();
        ApiError::internal(error).verbose(self.verbose_errors)
    }

    /// Blocking pipeline: sort, fit, predict in-sample and ahead, evaluate.
    #[instrument(skip_all, fields(rows = request.sales_data.len(), periods = request.forecast_periods))]
    pub fn forecast(&self, request: ForecastRequest) -> anyhow::Result<ForecastResponse> {
        let ForecastRequest {
            sales_data: mut history,
            forecast_periods,
        } = request;
        // stable: duplicate dates keep their payload order
        history.sort_by_key(|o| o.date);

        let mut model = AdditiveModel::new(self.model_config.clone());
        let (fitted, elapsed) = timed("fit", history.len(), || model.fit(&history));
        fitted.context("fitting forecasting model")?;
        FORECAST_METRICS.record_fit(history.len(), elapsed);

        let dates: Vec<NaiveDate> = history.iter().map(|o| o.date).collect();
        let in_sample = model
            .predict(&dates)
            .context("predicting over the history")?;

        let last = dates
            .last()
            .copied()
            .ok_or_else(|| anyhow!("history is empty after fitting"))?;
        let future_dates = month_starts_after(last, forecast_periods)
            .context("building future month starts")?;
        let (future, _) = timed("predict", future_dates.len(), || model.predict(&future_dates));
        let future = future.context("predicting future periods")?;

        let actual: Vec<f64> = history.iter().map(|o| o.value).collect();
        let predicted: Vec<f64> = in_sample.iter().map(|p| p.yhat).collect();
        let metrics = MetricsReport::compute(&actual, &predicted)
            .context("computing accuracy metrics")?;

        let by_date = first_prediction_by_date(&in_sample);
        let historical_data = history
            .iter()
            .map(|o| FittedPoint {
                date: o.date,
                actual: o.value,
                predicted: by_date.get(&o.date).map(|p| p.yhat),
            })
            .collect();

        let future_forecast: Vec<ForecastPoint> = future
            .iter()
            .take(forecast_periods)
            .map(|p| ForecastPoint {
                date: p.date,
                forecast: p.yhat,
                forecast_lower: p.yhat_lower,
                forecast_upper: p.yhat_upper,
            })
            .collect();

        let trend = in_sample
            .iter()
            .chain(&future)
            .map(|p| TrendPoint {
                date: p.date,
                trend: p.trend,
            })
            .collect();

        info!(
            rows = history.len(),
            periods = forecast_periods,
            r2 = metrics.r2,
            mape = metrics.mape,
            "Forecast completed"
        );

        Ok(ForecastResponse {
            success: true,
            historical_data,
            future_forecast,
            trend,
            metrics,
            data_info: DataInfo {
                total_records: history.len(),
                forecast_periods,
            },
        })
    }
}

fn first_prediction_by_date(predictions: &[Prediction]) -> HashMap<NaiveDate, &Prediction> {
    let mut by_date = HashMap::with_capacity(predictions.len());
    for p in predictions {
        by_date.entry(p.date).or_insert(p);
    }
    by_date
}
