/// Piecewise-linear trend on the scaled time axis.
///
/// The slope starts at `k` and changes by `deltas[j]` at `changepoints[j]`. The
/// offset is adjusted at each changepoint so the trend stays continuous.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PiecewiseLinear {
    pub k: f64,
    pub m: f64,
    pub changepoints: Vec<f64>,
    pub deltas: Vec<f64>,
}

impl PiecewiseLinear {
    pub fn value(&self, t: f64) -> f64 {
        evaluate(self.k, self.m, &self.changepoints, &self.deltas, t)
    }

    /// Mean absolute changepoint delta: the scale of simulated future changes.
    pub fn mean_abs_delta(&self) -> f64 {
        if self.deltas.is_empty() {
            return 0.0;
        }
        self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64
    }
}

pub(crate) fn evaluate(k: f64, m: f64, changepoints: &[f64], deltas: &[f64], t: f64) -> f64 {
    let mut slope = k;
    let mut offset = m;
    for (&s, &delta) in changepoints.iter().zip(deltas) {
        if t >= s {
            slope += delta;
            offset -= s * delta;
        }
    }
    slope * t + offset
}

/// Hinge column for a changepoint: `(t - s)` once `t` has reached `s`, else 0.
pub(crate) fn hinge(t: f64, changepoint: f64) -> f64 {
    if t >= changepoint {
        t - changepoint
    } else {
        0.0
    }
}

/// Row indexes (into the sorted history) at which changepoints are placed.
///
/// Candidates are limited to the first `range` share of the history and spaced
/// evenly. The first row never becomes a changepoint. The count shrinks when
/// the history is too short to hold `requested` of them.
pub(crate) fn changepoint_indexes(rows: usize, requested: usize, range: f64) -> Vec<usize> {
    let hist_size = (rows as f64 * range).floor() as usize;
    let count = if requested + 1 > hist_size {
        hist_size.saturating_sub(1)
    } else {
        requested
    };
    if count == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    (1..=count)
        .map(|i| round_half_even(last * i as f64 / count as f64) as usize)
        .collect()
}

/// Slope and intercept of the line through the first and last points.
pub(crate) fn initial_slope_intercept(t: &[f64], y: &[f64]) -> (f64, f64) {
    let (i0, i1) = (0, t.len() - 1);
    let span = t[i1] - t[i0];
    let k = if span.abs() > f64::EPSILON {
        (y[i1] - y[i0]) / span
    } else {
        0.0
    };
    let m = y[i0] - k * t[i0];
    (k, m)
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}
