/*!
 * # Forecasting Module
 *
 * Additive time-series model used by the forecast endpoint.
 *
 * The model decomposes a series into:
 *
 * - a piecewise-linear trend with automatically placed changepoints
 * - Fourier seasonality (yearly, and optionally weekly and daily)
 * - Gaussian observation noise
 *
 * Parameters are fitted as a MAP estimate. Seasonal coefficients get Gaussian
 * priors and changepoint deltas get Laplace priors. Uncertainty intervals come
 * from simulating future trend changes plus observation noise.
 *
 * Callers only depend on the [`Forecaster`] trait.
 */

mod calendar;
mod error;
mod model;
mod seasonality;
mod trend;
mod uncertainty;

pub use calendar::{days_since_epoch, month_starts_after};
pub use error::ModelError;
pub use model::AdditiveModel;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

/// A single dated value the model is trained on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Model output for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
}

/// A fit-then-predict time-series model.
pub trait Forecaster: Send {
    /// Fit the model on the full history. Observations need not be sorted.
    fn fit(&mut self, history: &[Observation]) -> Result<(), ModelError>;

    /// Predict at arbitrary dates, in-sample or future.
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>, ModelError>;
}

/// How seasonal components combine with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    #[default]
    Additive,
}

/// Model hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub seasonality_mode: SeasonalityMode,

    #[serde(default = "default_true")]
    pub yearly_seasonality: bool,

    #[serde(default)]
    pub weekly_seasonality: bool,

    #[serde(default)]
    pub daily_seasonality: bool,

    #[serde(default = "default_yearly_fourier_order")]
    pub yearly_fourier_order: usize,

    #[serde(default = "default_weekly_fourier_order")]
    pub weekly_fourier_order: usize,

    #[serde(default = "default_daily_fourier_order")]
    pub daily_fourier_order: usize,

    /// Standard deviation of the Gaussian prior on seasonal coefficients
    #[serde(default = "default_seasonality_prior_scale")]
    pub seasonality_prior_scale: f64,

    /// Scale of the Laplace prior on changepoint deltas
    #[serde(default = "default_changepoint_prior_scale")]
    pub changepoint_prior_scale: f64,

    #[serde(default = "default_n_changepoints")]
    pub n_changepoints: usize,

    /// Fraction of the history in which changepoints may be placed
    #[serde(default = "default_changepoint_range")]
    pub changepoint_range: f64,

    /// Width of the uncertainty interval, e.g. 0.8 for the 10th..90th percentile
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,

    /// Number of simulated trajectories behind the intervals; 0 disables them
    #[serde(default = "default_uncertainty_samples")]
    pub uncertainty_samples: usize,

    /// Fixed RNG seed for reproducible intervals
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Additive,
            yearly_seasonality: true,
            weekly_seasonality: false,
            daily_seasonality: false,
            yearly_fourier_order: default_yearly_fourier_order(),
            weekly_fourier_order: default_weekly_fourier_order(),
            daily_fourier_order: default_daily_fourier_order(),
            seasonality_prior_scale: default_seasonality_prior_scale(),
            changepoint_prior_scale: default_changepoint_prior_scale(),
            n_changepoints: default_n_changepoints(),
            changepoint_range: default_changepoint_range(),
            interval_width: default_interval_width(),
            uncertainty_samples: default_uncertainty_samples(),
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn default_true() -> bool {
    true
}
fn default_yearly_fourier_order() -> usize {
    10
}
fn default_weekly_fourier_order() -> usize {
    3
}
fn default_daily_fourier_order() -> usize {
    4
}
fn default_seasonality_prior_scale() -> f64 {
    10.0
}
fn default_changepoint_prior_scale() -> f64 {
    0.05
}
fn default_n_changepoints() -> usize {
    25
}
fn default_changepoint_range() -> f64 {
    0.8
}
fn default_interval_width() -> f64 {
    0.8
}
fn default_uncertainty_samples() -> usize {
    1000
}

impl Validate for ModelConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let positive = |value: f64| value.is_finite() && value > 0.0;

        if !positive(self.seasonality_prior_scale) {
            errors.add(
                "seasonality_prior_scale",
                invalid("positive", "Must be a finite value greater than 0"),
            );
        }
        if !positive(self.changepoint_prior_scale) {
            errors.add(
                "changepoint_prior_scale",
                invalid("positive", "Must be a finite value greater than 0"),
            );
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            errors.add(
                "changepoint_range",
                invalid("changepoint_range", "changepoint_range must be in (0, 1]"),
            );
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            errors.add(
                "interval_width",
                invalid("interval_width", "interval_width must be in (0, 1)"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_model_settings() {
        let cfg = ModelConfig::default();
        assert!(cfg.yearly_seasonality);
        assert!(!cfg.weekly_seasonality);
        assert!(!cfg.daily_seasonality);
        assert_eq!(cfg.seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(cfg.seasonality_prior_scale, 10.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn interval_width_outside_unit_range_is_rejected() {
        let cfg = ModelConfig {
            interval_width: 1.0,
            ..Default::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("interval_width"));
    }

    #[test]
    fn non_positive_prior_scale_is_rejected() {
        let cfg = ModelConfig {
            seasonality_prior_scale: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
