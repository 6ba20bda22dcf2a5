//! Regression accuracy metrics.
//!
//! Every function compares `actual` against `predicted` pairwise and follows the
//! scikit-learn definition of the metric with the same name. Inputs must be
//! non-empty and of equal length.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

use crate::numeric::{median, percentile};

/// Quantile used by the pinball-based metrics
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Lower clamp applied to inputs of the log error in [`MetricsReport`]
const MSLE_FLOOR: f64 = 1e-10;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("Found input variables with inconsistent numbers of samples: [{actual}, {predicted}]")]
    LengthMismatch { actual: usize, predicted: usize },

    #[error("Found array with 0 sample(s) while a minimum of 1 is required")]
    Empty,

    #[error("Mean Squared Logarithmic Error cannot be used when targets contain values less than or equal to -1")]
    LogDomain,

    #[error("{metric} is not well-defined with less than two samples (got {samples})")]
    TooFewSamples { metric: &'static str, samples: usize },
}

fn check_pairs(actual: &[f64], predicted: &[f64]) -> Result<usize, MetricError> {
    if actual.len() != predicted.len() {
        return Err(MetricError::LengthMismatch {
            actual: actual.len(),
            predicted: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(actual.len())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

fn residuals<'a>(actual: &'a [f64], predicted: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    actual.iter().zip(predicted).map(|(y, p)| y - p)
}

/// `1 - num/den`, forced finite: a zero denominator yields 1 for a perfect
/// numerator and 0 otherwise.
fn one_minus_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - numerator / denominator
    }
}

fn pinball(actual: &[f64], predicted: impl Iterator<Item = f64>, alpha: f64) -> f64 {
    mean(actual.iter().zip(predicted).map(|(&y, p)| {
        let diff = y - p;
        if diff >= 0.0 {
            alpha * diff
        } else {
            (alpha - 1.0) * diff
        }
    }))
}

/// Coefficient of determination.
///
/// Fewer than two samples gives NaN, which serializes as `null`.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    let n = check_pairs(actual, predicted)?;
    if n < 2 {
        return Ok(f64::NAN);
    }
    let y_mean = mean(actual.iter().copied());
    let ss_res: f64 = residuals(actual, predicted).map(|r| r * r).sum();
    let ss_tot: f64 = actual.iter().map(|y| (y - y_mean).powi(2)).sum();
    Ok(one_minus_ratio(ss_res, ss_tot))
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    Ok(mean(residuals(actual, predicted).map(f64::abs)))
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    Ok(mean(residuals(actual, predicted).map(|r| r * r)))
}

pub fn mean_squared_log_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    if actual.iter().chain(predicted).any(|&v| v <= -1.0) {
        return Err(MetricError::LogDomain);
    }
    Ok(mean(
        actual
            .iter()
            .zip(predicted)
            .map(|(y, p)| (y.ln_1p() - p.ln_1p()).powi(2)),
    ))
}

/// Mean of `|y - ŷ| / max(|y|, ε)`, as a fraction rather than a percentage.
pub fn mean_absolute_percentage_error(
    actual: &[f64],
    predicted: &[f64],
) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    Ok(mean(
        actual
            .iter()
            .zip(predicted)
            .map(|(y, p)| (y - p).abs() / y.abs().max(f64::EPSILON)),
    ))
}

pub fn median_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    let errors: Vec<f64> = residuals(actual, predicted).map(f64::abs).collect();
    Ok(median(&errors))
}

pub fn max_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    Ok(residuals(actual, predicted)
        .map(f64::abs)
        .fold(0.0, f64::max))
}

pub fn explained_variance_score(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    let diff: Vec<f64> = residuals(actual, predicted).collect();
    let diff_mean = mean(diff.iter().copied());
    let residual_var = mean(diff.iter().map(|d| (d - diff_mean).powi(2)));
    let y_mean = mean(actual.iter().copied());
    let actual_var = mean(actual.iter().map(|y| (y - y_mean).powi(2)));
    Ok(one_minus_ratio(residual_var, actual_var))
}

pub fn mean_pinball_loss(
    actual: &[f64],
    predicted: &[f64],
    alpha: f64,
) -> Result<f64, MetricError> {
    check_pairs(actual, predicted)?;
    Ok(pinball(actual, predicted.iter().copied(), alpha))
}

/// D² with the Tweedie deviance at power 0, i.e. squared error against the mean.
pub fn d2_tweedie_score(actual: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    let n = check_pairs(actual, predicted)?;
    if n < 2 {
        return Err(MetricError::TooFewSamples {
            metric: "D^2 score",
            samples: n,
        });
    }
    let y_mean = mean(actual.iter().copied());
    let numerator = mean(residuals(actual, predicted).map(|r| r * r));
    let denominator = mean(actual.iter().map(|y| (y - y_mean).powi(2)));
    Ok(one_minus_ratio(numerator, denominator))
}

/// D² with the pinball loss; the baseline predicts the empirical `alpha` quantile.
pub fn d2_pinball_score(
    actual: &[f64],
    predicted: &[f64],
    alpha: f64,
) -> Result<f64, MetricError> {
    let n = check_pairs(actual, predicted)?;
    if n < 2 {
        return Err(MetricError::TooFewSamples {
            metric: "D^2 score",
            samples: n,
        });
    }
    let numerator = pinball(actual, predicted.iter().copied(), alpha);
    let baseline = percentile(actual, alpha);
    let denominator = pinball(actual, std::iter::repeat(baseline), alpha);
    Ok(one_minus_ratio(numerator, denominator))
}

/// Accuracy figures reported with every forecast.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MetricsReport {
    pub r2: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub msle: f64,
    pub mape: f64,
    /// `(1 - mape) * 100`
    pub accuracy: f64,
    pub medae: f64,
    pub max_error: f64,
    pub explained_variance: f64,
    pub mean_pinball_loss: f64,
    pub d2_tweedie: f64,
    pub d2_pinball: f64,
}

impl MetricsReport {
    /// Computes the full report.
    ///
    /// The log error, pinball loss and both D² scores degrade to 0 when they
    /// cannot be computed. Every other failure is returned.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, MetricError> {
        let mse = mean_squared_error(actual, predicted)?;
        let mape = mean_absolute_percentage_error(actual, predicted)?;

        let clamped_actual: Vec<f64> = actual.iter().map(|v| v.max(MSLE_FLOOR)).collect();
        let clamped_predicted: Vec<f64> = predicted.iter().map(|v| v.max(MSLE_FLOOR)).collect();

        Ok(Self {
            r2: r2_score(actual, predicted)?,
            mae: mean_absolute_error(actual, predicted)?,
            mse,
            rmse: mse.sqrt(),
            msle: or_zero(
                "msle",
                mean_squared_log_error(&clamped_actual, &clamped_predicted),
            ),
            mape,
            accuracy: (1.0 - mape) * 100.0,
            medae: median_absolute_error(actual, predicted)?,
            max_error: max_error(actual, predicted)?,
            explained_variance: explained_variance_score(actual, predicted)?,
            mean_pinball_loss: or_zero(
                "mean_pinball_loss",
                mean_pinball_loss(actual, predicted, DEFAULT_ALPHA),
            ),
            d2_tweedie: or_zero("d2_tweedie", d2_tweedie_score(actual, predicted)),
            d2_pinball: or_zero(
                "d2_pinball",
                d2_pinball_score(actual, predicted, DEFAULT_ALPHA),
            ),
        })
    }
}

fn or_zero(metric: &str, result: Result<f64, MetricError>) -> f64 {
    result.unwrap_or_else(|e| {
        warn!(metric, error = %e, "Metric could not be computed; reporting 0");
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn matches_reference_values() {
        // sklearn docs examples
        let y = [3.0, -0.5, 2.0, 7.0];
        let p = [2.5, 0.0, 2.0, 8.0];
        assert!(close(r2_score(&y, &p).unwrap(), 0.948_608_137_044_967_9));
        assert!(close(mean_absolute_error(&y, &p).unwrap(), 0.5));
        assert!(close(mean_squared_error(&y, &p).unwrap(), 0.375));
        assert!(close(median_absolute_error(&y, &p).unwrap(), 0.5));
        assert!(close(max_error(&y, &p).unwrap(), 1.0));
        assert!(close(
            explained_variance_score(&y, &p).unwrap(),
            0.957_173_447_537_473_2
        ));
        assert!(close(
            mean_absolute_percentage_error(&y, &p).unwrap(),
            0.327_380_952_380_952_4
        ));
    }

    #[test]
    fn msle_reference_value() {
        let y = [3.0, 5.0, 2.5, 7.0];
        let p = [2.5, 5.0, 4.0, 8.0];
        assert!(close(
            mean_squared_log_error(&y, &p).unwrap(),
            0.039_730_122_995_200_24
        ));
    }

    #[test]
    fn pinball_reference_values() {
        let y = [1.0, 2.0, 3.0];
        assert!(close(mean_pinball_loss(&y, &[0.0, 2.0, 3.0], 0.1).unwrap(), 0.1 / 3.0));
        assert!(close(mean_pinball_loss(&y, &[1.0, 2.0, 4.0], 0.1).unwrap(), 0.3));
        assert!(close(d2_pinball_score(&y, &[1.0, 3.0, 3.0], 0.5).unwrap(), 0.5));
    }

    #[test]
    fn d2_tweedie_at_power_zero_equals_r2() {
        let y = [3.0, -0.5, 2.0, 7.0];
        let p = [2.5, 0.0, 2.0, 8.0];
        assert!(close(
            d2_tweedie_score(&y, &p).unwrap(),
            r2_score(&y, &p).unwrap()
        ));
    }

    #[test]
    fn constant_target_is_forced_finite() {
        let y = [2.0, 2.0, 2.0];
        assert_eq!(r2_score(&y, &y).unwrap(), 1.0);
        assert_eq!(r2_score(&y, &[1.0, 2.0, 3.0]).unwrap(), 0.0);
        assert_eq!(explained_variance_score(&y, &[1.0, 2.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn mape_uses_epsilon_floor_for_zero_actuals() {
        let mape = mean_absolute_percentage_error(&[0.0], &[1.0]).unwrap();
        assert!(close(mape, 1.0 / f64::EPSILON));
    }

    #[test]
    fn input_shape_errors() {
        assert_matches!(
            mean_squared_error(&[1.0, 2.0], &[1.0]),
            Err(MetricError::LengthMismatch {
                actual: 2,
                predicted: 1
            })
        );
        assert_matches!(mean_absolute_error(&[], &[]), Err(MetricError::Empty));
        assert_matches!(
            mean_squared_log_error(&[-1.0], &[0.0]),
            Err(MetricError::LogDomain)
        );
        assert_matches!(
            d2_tweedie_score(&[1.0], &[1.0]),
            Err(MetricError::TooFewSamples { samples: 1, .. })
        );
    }

    #[test]
    fn single_zero_pair_degrades_gracefully() {
        let report = MetricsReport::compute(&[0.0], &[0.0]).unwrap();
        assert_eq!(report.msle, 0.0);
        assert_eq!(report.mae, 0.0);
        assert_eq!(report.mse, 0.0);
        assert_eq!(report.rmse, 0.0);
        assert_eq!(report.mape, 0.0);
        assert_eq!(report.accuracy, 100.0);
        assert_eq!(report.d2_tweedie, 0.0);
        assert_eq!(report.d2_pinball, 0.0);
        assert_eq!(report.explained_variance, 1.0);
        assert!(report.r2.is_nan());
    }

    #[test]
    fn report_clamps_negative_values_for_msle() {
        let report = MetricsReport::compute(&[-5.0, 2.0], &[1.0, 2.0]).unwrap();
        assert!(report.msle.is_finite());
        assert!(report.msle > 0.0);
    }

    #[test]
    fn report_propagates_shape_errors() {
        assert_matches!(
            MetricsReport::compute(&[1.0], &[]),
            Err(MetricError::LengthMismatch { .. })
        );
    }

    proptest! {
        #[test]
        fn derived_fields_are_consistent(
            pairs in prop::collection::vec((1.0f64..1_000.0, 1.0f64..1_000.0), 2..40)
        ) {
            let (y, p): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let report = MetricsReport::compute(&y, &p).unwrap();
            prop_assert!((report.rmse - report.mse.sqrt()).abs() < 1e-9);
            prop_assert!((report.accuracy - (1.0 - report.mape) * 100.0).abs() < 1e-9);
            prop_assert!(report.medae <= report.max_error + 1e-12);
            prop_assert!(report.mae <= report.max_error + 1e-12);
        }

        #[test]
        fn perfect_predictions_score_perfectly(
            y in prop::collection::vec(0.0f64..500.0, 2..30)
        ) {
            prop_assert_eq!(mean_squared_error(&y, &y).unwrap(), 0.0);
            prop_assert_eq!(mean_absolute_percentage_error(&y, &y).unwrap(), 0.0);
            prop_assert_eq!(r2_score(&y, &y).unwrap(), 1.0);
        }
    }
}
