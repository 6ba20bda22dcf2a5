use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{
    calendar::days_since_epoch,
    seasonality::{self, Seasonality},
    trend::{self, PiecewiseLinear},
    uncertainty, Forecaster, ModelConfig, ModelError, Observation, Prediction,
};

const MAX_IRLS_ITERATIONS: usize = 25;
const IRLS_TOLERANCE: f64 = 1e-8;
/// Lower bound on the noise scale (in scaled units) so priors never vanish
const MIN_SIGMA: f64 = 1e-3;
/// Lower bound on |delta| when reweighting the Laplace penalty
const DELTA_FLOOR: f64 = 1e-6;
/// Prior scale on the base slope and offset
const TREND_PRIOR_SCALE: f64 = 5.0;
const SVD_EPS: f64 = 1e-12;

/// Everything `predict` needs once fitting is done.
#[derive(Debug, Clone)]
pub(crate) struct FittedParams {
    pub start_day: f64,
    pub t_scale: f64,
    pub y_scale: f64,
    pub trend: PiecewiseLinear,
    pub seasonalities: Vec<Seasonality>,
    pub beta: Vec<f64>,
    /// Observation noise in scaled units
    pub sigma: f64,
}

impl FittedParams {
    fn scaled_time(&self, day: f64) -> f64 {
        (day - self.start_day) / self.t_scale
    }

    fn seasonal(&self, features: &[f64]) -> f64 {
        features.iter().zip(&self.beta).map(|(x, b)| x * b).sum()
    }
}

/// Additive trend + seasonality model with MAP fitting.
///
/// An instance can be fit exactly once; create a new one per series.
#[derive(Debug, Clone, Default)]
pub struct AdditiveModel {
    config: ModelConfig,
    params: Option<FittedParams>,
}

impl AdditiveModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            params: None,
        }
    }

    /// Ridge penalties per parameter for one IRLS round.
    ///
    /// The first round treats the changepoint prior as Gaussian. Every round
    /// after that reweights it by the current |delta|, which turns the ridge
    /// into a Laplace (L1) penalty at convergence.
    fn penalties(
        &self,
        theta: &DVector<f64>,
        sigma: f64,
        n_changepoints: usize,
        n_seasonal: usize,
        first_round: bool,
    ) -> Vec<f64> {
        let var = sigma * sigma;
        let tau = self.config.changepoint_prior_scale;
        let seasonal_var = self.config.seasonality_prior_scale.powi(2);

        let mut penalties = Vec::with_capacity(2 + n_changepoints + n_seasonal);
        penalties.push(var / TREND_PRIOR_SCALE.powi(2));
        penalties.push(var / TREND_PRIOR_SCALE.powi(2));
        for j in 0..n_changepoints {
            let penalty = if first_round {
                var / (tau * tau)
            } else {
                var / (tau * theta[2 + j].abs().max(DELTA_FLOOR))
            };
            penalties.push(penalty);
        }
        penalties.extend(std::iter::repeat(var / seasonal_var).take(n_seasonal));
        penalties
    }
}

impl Forecaster for AdditiveModel {
    fn fit(&mut self, history: &[Observation]) -> Result<(), ModelError> {
        if self.params.is_some() {
            return Err(ModelError::AlreadyFitted);
        }
        if history.len() < 2 {
            return Err(ModelError::InsufficientData {
                rows: history.len(),
            });
        }
        if let Some(bad) = history.iter().find(|o| !o.value.is_finite()) {
            return Err(ModelError::NonFiniteValue {
                date: bad.date,
                value: bad.value,
            });
        }

        let mut sorted = history.to_vec();
        sorted.sort_by_key(|o| o.date);
        let n = sorted.len();

        let days: Vec<f64> = sorted.iter().map(|o| days_since_epoch(o.date)).collect();
        let start_day = days[0];
        let t_scale = days[n - 1] - start_day;
        if t_scale <= 0.0 {
            return Err(ModelError::DegenerateTimeRange {
                date: sorted[0].date,
            });
        }

        let y_scale = match sorted.iter().map(|o| o.value.abs()).fold(0.0, f64::max) {
            s if s > 0.0 => s,
            _ => 1.0,
        };
        let t: Vec<f64> = days.iter().map(|d| (d - start_day) / t_scale).collect();
        let y: Vec<f64> = sorted.iter().map(|o| o.value / y_scale).collect();

        let changepoints: Vec<f64> = trend::changepoint_indexes(
            n,
            self.config.n_changepoints,
            self.config.changepoint_range,
        )
        .into_iter()
        .map(|i| t[i])
        .collect();
        let seasonalities = seasonality::enabled(&self.config);
        let seasonal_rows = seasonality::feature_rows(&seasonalities, &days);

        let n_cp = changepoints.len();
        let n_seasonal = seasonality::total_width(&seasonalities);
        let p = 2 + n_cp + n_seasonal;

        let design = DMatrix::from_fn(n, p, |r, c| match c {
            0 => t[r],
            1 => 1.0,
            c if c < 2 + n_cp => trend::hinge(t[r], changepoints[c - 2]),
            c => seasonal_rows[r][c - 2 - n_cp],
        });
        let target = DVector::from_vec(y.clone());

        let (k0, m0) = trend::initial_slope_intercept(&t, &y);
        let mut theta = DVector::<f64>::zeros(p);
        theta[0] = k0;
        theta[1] = m0;
        let mut sigma = residual_scale(&design, &target, &theta);

        for round in 0..MAX_IRLS_ITERATIONS {
            let penalties = self.penalties(&theta, sigma, n_cp, n_seasonal, round == 0);
            let next = solve_penalized(&design, &target, &penalties)?;
            let change = (&next - &theta).amax();
            theta = next;
            sigma = residual_scale(&design, &target, &theta);
            if round > 0 && change < IRLS_TOLERANCE {
                break;
            }
        }

        let trend = PiecewiseLinear {
            k: theta[0],
            m: theta[1],
            changepoints,
            deltas: theta.rows(2, n_cp).iter().copied().collect(),
        };
        let beta: Vec<f64> = theta.rows(2 + n_cp, n_seasonal).iter().copied().collect();

        debug!(
            rows = n,
            changepoints = n_cp,
            seasonal_terms = n_seasonal,
            sigma,
            y_scale,
            "Additive model fitted"
        );

        self.params = Some(FittedParams {
            start_day,
            t_scale,
            y_scale,
            trend,
            seasonalities,
            beta,
            sigma,
        });
        Ok(())
    }

    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>, ModelError> {
        let params = self.params.as_ref().ok_or(ModelError::NotFitted)?;

        let days: Vec<f64> = dates.iter().map(|&d| days_since_epoch(d)).collect();
        let t: Vec<f64> = days.iter().map(|&d| params.scaled_time(d)).collect();
        let seasonal: Vec<f64> = seasonality::feature_rows(&params.seasonalities, &days)
            .iter()
            .map(|row| params.seasonal(row))
            .collect();
        let bounds = uncertainty::intervals(params, &self.config, &t, &seasonal)?;

        Ok(dates
            .iter()
            .zip(t.iter().zip(&seasonal))
            .zip(bounds)
            .map(|((&date, (&ti, &si)), (lower, upper))| {
                let trend = params.trend.value(ti);
                Prediction {
                    date,
                    yhat: (trend + si) * params.y_scale,
                    yhat_lower: lower,
                    yhat_upper: upper,
                    trend: trend * params.y_scale,
                }
            })
            .collect())
    }
}

fn residual_scale(design: &DMatrix<f64>, target: &DVector<f64>, theta: &DVector<f64>) -> f64 {
    let residuals = target - design * theta;
    (residuals.norm_squared() / target.len() as f64)
        .sqrt()
        .max(MIN_SIGMA)
}

/// Solves `min ||Xθ - y||² + Σ λ_j θ_j²` via the augmented system `[X; √Λ]θ = [y; 0]`.
fn solve_penalized(
    design: &DMatrix<f64>,
    target: &DVector<f64>,
    penalties: &[f64],
) -> Result<DVector<f64>, ModelError> {
    let (n, p) = design.shape();
    let augmented = DMatrix::from_fn(n + p, p, |r, c| {
        if r < n {
            design[(r, c)]
        } else if r - n == c {
            penalties[c].sqrt()
        } else {
            0.0
        }
    });
    let rhs = DVector::from_fn(n + p, |r, _| if r < n { target[r] } else { 0.0 });

    augmented
        .svd(true, true)
        .solve(&rhs, SVD_EPS)
        .map_err(|e| ModelError::Linalg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecasting::month_starts_after;
    use assert_matches::assert_matches;
    use chrono::{Datelike, Months};

    fn monthly(values: &[f64]) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation::new(start + Months::new(i as u32), v))
            .collect()
    }

    fn seeded() -> AdditiveModel {
        AdditiveModel::new(ModelConfig::default().with_seed(7))
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = seeded();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_matches!(model.predict(&[date]), Err(ModelError::NotFitted));
    }

    #[test]
    fn single_row_is_rejected() {
        let mut model = seeded();
        let err = model.fit(&monthly(&[0.0])).unwrap_err();
        assert_matches!(err, ModelError::InsufficientData { rows: 1 });
    }

    #[test]
    fn identical_dates_are_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history = vec![Observation::new(date, 1.0), Observation::new(date, 2.0)];
        assert_matches!(
            seeded().fit(&history),
            Err(ModelError::DegenerateTimeRange { .. })
        );
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut history = monthly(&[1.0, 2.0, 3.0]);
        history[1].value = f64::NAN;
        assert_matches!(
            seeded().fit(&history),
            Err(ModelError::NonFiniteValue { .. })
        );
    }

    #[test]
    fn refitting_is_rejected() {
        let mut model = seeded();
        model.fit(&monthly(&[1.0, 2.0, 3.0])).unwrap();
        assert_matches!(
            model.fit(&monthly(&[1.0, 2.0, 3.0])),
            Err(ModelError::AlreadyFitted)
        );
    }

    #[test]
    fn linear_series_is_tracked_closely() {
        let values: Vec<f64> = (0..24).map(|i| 100.0 + i as f64).collect();
        let history = monthly(&values);
        let mut model = seeded();
        model.fit(&history).unwrap();

        let dates: Vec<NaiveDate> = history.iter().map(|o| o.date).collect();
        let predictions = model.predict(&dates).unwrap();
        assert_eq!(predictions.len(), 24);
        for (obs, pred) in history.iter().zip(&predictions) {
            assert!(
                (obs.value - pred.yhat).abs() < 2.0,
                "{} predicted {} for actual {}",
                obs.date,
                pred.yhat,
                obs.value
            );
        }
    }

    #[test]
    fn future_trend_keeps_rising_for_increasing_series() {
        let values: Vec<f64> = (0..24).map(|i| 100.0 + i as f64).collect();
        let history = monthly(&values);
        let mut model = seeded();
        model.fit(&history).unwrap();

        let last = history.last().unwrap().date;
        let future = month_starts_after(last, 3).unwrap();
        let predictions = model.predict(&future).unwrap();
        assert_eq!(predictions.len(), 3);
        assert!(predictions[0].trend < predictions[2].trend);
        assert!(predictions[0].trend > 110.0);
        for p in &predictions {
            assert!(p.yhat_lower <= p.yhat_upper);
            assert!(p.yhat.is_finite());
        }
    }

    #[test]
    fn yearly_pattern_is_captured() {
        // three years of a pure sinusoid around a flat level
        let values: Vec<f64> = (0..36)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * (i % 12) as f64 / 12.0).sin())
            .collect();
        let history = monthly(&values);
        let mut model = seeded();
        model.fit(&history).unwrap();

        let dates: Vec<NaiveDate> = history.iter().map(|o| o.date).collect();
        let predictions = model.predict(&dates).unwrap();
        let peak = predictions.iter().find(|p| p.date.month() == 4).unwrap();
        let trough = predictions.iter().find(|p| p.date.month() == 10).unwrap();
        assert!(peak.yhat > trough.yhat + 10.0);
    }

    #[test]
    fn all_zero_series_predicts_zero() {
        let history = monthly(&[0.0; 12]);
        let mut model = seeded();
        model.fit(&history).unwrap();
        let predictions = model.predict(&[history[3].date]).unwrap();
        assert!(predictions[0].yhat.abs() < 1e-6);
        assert!(predictions[0].trend.abs() < 1e-6);
    }

    #[test]
    fn seeded_intervals_are_reproducible() {
        let values: Vec<f64> = (0..24).map(|i| 100.0 + (i * 7 % 5) as f64).collect();
        let history = monthly(&values);
        let future = month_starts_after(history.last().unwrap().date, 6).unwrap();

        let mut a = seeded();
        a.fit(&history).unwrap();
        let mut b = seeded();
        b.fit(&history).unwrap();

        assert_eq!(a.predict(&future).unwrap(), b.predict(&future).unwrap());
    }

    #[test]
    fn disabled_sampling_collapses_intervals() {
        let config = ModelConfig {
            uncertainty_samples: 0,
            ..Default::default()
        };
        let mut model = AdditiveModel::new(config);
        let history = monthly(&[3.0, 5.0, 4.0, 6.0]);
        model.fit(&history).unwrap();
        let predictions = model.predict(&[history[0].date]).unwrap();
        assert_eq!(predictions[0].yhat_lower, predictions[0].yhat);
        assert_eq!(predictions[0].yhat_upper, predictions[0].yhat);
    }
}
