use rand::{distributions::Distribution, rngs::StdRng, Rng, SeedableRng};
use statrs::distribution::{Laplace, Normal, Poisson};

use super::{
    model::FittedParams,
    trend::{self, PiecewiseLinear},
    ModelConfig, ModelError,
};
use crate::numeric::percentile_sorted;

/// Lower/upper interval bound per requested time, in original units.
///
/// Each simulated trajectory extends the fitted trend with random changepoints
/// beyond the end of the history. It then adds Gaussian observation noise.
/// Bounds are the symmetric percentiles covering `interval_width`.
pub(crate) fn intervals(
    params: &FittedParams,
    config: &ModelConfig,
    t: &[f64],
    seasonal: &[f64],
) -> Result<Vec<(f64, f64)>, ModelError> {
    if config.uncertainty_samples == 0 || t.is_empty() {
        return Ok(t
            .iter()
            .zip(seasonal)
            .map(|(&ti, &si)| {
                let yhat = (params.trend.value(ti) + si) * params.y_scale;
                (yhat, yhat)
            })
            .collect());
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, params.sigma)
        .map_err(|e| ModelError::InvalidConfig(format!("observation noise: {}", e)))?;
    let horizon = t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let future = FutureChanges::new(&params.trend, horizon)?;

    let n_samples = config.uncertainty_samples;
    let mut samples: Vec<Vec<f64>> = (0..t.len()).map(|_| Vec::with_capacity(n_samples)).collect();

    for _ in 0..n_samples {
        let (changepoints, deltas) = future.sample(&mut rng);
        for (column, (&ti, &si)) in samples.iter_mut().zip(t.iter().zip(seasonal)) {
            let trend = trend::evaluate(
                params.trend.k,
                params.trend.m,
                &changepoints,
                &deltas,
                ti,
            );
            column.push((trend + si + noise.sample(&mut rng)) * params.y_scale);
        }
    }

    let lower_q = (1.0 - config.interval_width) / 2.0;
    let upper_q = (1.0 + config.interval_width) / 2.0;
    Ok(samples
        .into_iter()
        .map(|mut column| {
            column.sort_by(f64::total_cmp);
            (
                percentile_sorted(&column, lower_q),
                percentile_sorted(&column, upper_q),
            )
        })
        .collect())
}

/// Generator of random trend changes past the end of the history (t > 1).
///
/// Changes arrive at the historical rate, one per historical changepoint per
/// unit of scaled time. Their magnitudes are Laplace distributed with the mean
/// absolute historical delta as scale.
struct FutureChanges<'a> {
    trend: &'a PiecewiseLinear,
    horizon: f64,
    arrivals: Option<Poisson>,
    magnitude: Laplace,
}

impl<'a> FutureChanges<'a> {
    fn new(trend: &'a PiecewiseLinear, horizon: f64) -> Result<Self, ModelError> {
        let rate = trend.changepoints.len() as f64 * (horizon - 1.0);
        let arrivals = if rate > 0.0 {
            Some(
                Poisson::new(rate)
                    .map_err(|e| ModelError::InvalidConfig(format!("changepoint rate: {}", e)))?,
            )
        } else {
            None
        };
        let magnitude = Laplace::new(0.0, trend.mean_abs_delta() + 1e-8)
            .map_err(|e| ModelError::InvalidConfig(format!("changepoint scale: {}", e)))?;

        Ok(Self {
            trend,
            horizon,
            arrivals,
            magnitude,
        })
    }

    fn sample(&self, rng: &mut StdRng) -> (Vec<f64>, Vec<f64>) {
        let mut changepoints = self.trend.changepoints.clone();
        let mut deltas = self.trend.deltas.clone();

        if let Some(arrivals) = &self.arrivals {
            let count = Distribution::<f64>::sample(arrivals, rng) as usize;
            let mut times: Vec<f64> = (0..count)
                .map(|_| 1.0 + rng.gen::<f64>() * (self.horizon - 1.0))
                .collect();
            times.sort_by(f64::total_cmp);
            for time in times {
                changepoints.push(time);
                deltas.push(self.magnitude.sample(rng));
            }
        }

        (changepoints, deltas)
    }
}
