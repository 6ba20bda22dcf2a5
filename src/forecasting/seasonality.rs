use std::f64::consts::PI;

use super::ModelConfig;

/// A periodic component expressed as a truncated Fourier series.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Seasonality {
    pub name: &'static str,
    /// Period in days
    pub period: f64,
    pub fourier_order: usize,
}

impl Seasonality {
    pub fn yearly(order: usize) -> Self {
        Self {
            name: "yearly",
            period: 365.25,
            fourier_order: order,
        }
    }

    pub fn weekly(order: usize) -> Self {
        Self {
            name: "weekly",
            period: 7.0,
            fourier_order: order,
        }
    }

    pub fn daily(order: usize) -> Self {
        Self {
            name: "daily",
            period: 1.0,
            fourier_order: order,
        }
    }

    /// Number of feature columns: one sin/cos pair per order
    pub fn width(&self) -> usize {
        2 * self.fourier_order
    }

    /// Writes `sin(2πit/P), cos(2πit/P)` for i in 1..=order into `out`.
    fn write_features(&self, day: f64, out: &mut Vec<f64>) {
        for i in 1..=self.fourier_order {
            let x = 2.0 * PI * i as f64 * day / self.period;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

/// Seasonal components enabled by the config, in a fixed column order.
pub(crate) fn enabled(config: &ModelConfig) -> Vec<Seasonality> {
    let mut seasonalities = Vec::new();
    if config.yearly_seasonality && config.yearly_fourier_order > 0 {
        seasonalities.push(Seasonality::yearly(config.yearly_fourier_order));
    }
    if config.weekly_seasonality && config.weekly_fourier_order > 0 {
        seasonalities.push(Seasonality::weekly(config.weekly_fourier_order));
    }
    if config.daily_seasonality && config.daily_fourier_order > 0 {
        seasonalities.push(Seasonality::daily(config.daily_fourier_order));
    }
    seasonalities
}

/// Total number of seasonal columns
pub(crate) fn total_width(seasonalities: &[Seasonality]) -> usize {
    seasonalities.iter().map(Seasonality::width).sum()
}

/// One row of seasonal features per day, columns concatenated across components.
pub(crate) fn feature_rows(seasonalities: &[Seasonality], days: &[f64]) -> Vec<Vec<f64>> {
    let width = total_width(seasonalities);
    days.iter()
        .map(|&day| {
            let mut row = Vec::with_capacity(width);
            for seasonality in seasonalities {
                seasonality.write_features(day, &mut row);
            }
            row
        })
        .collect()
}
