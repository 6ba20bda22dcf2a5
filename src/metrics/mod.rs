/*!
 * # Metrics Module
 *
 * In-process operational counters for the forecast service.
 *
 * ## Metrics Formats
 *
 * Metrics are exposed in the following formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use dashmap::DashMap;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const FORECAST_REQUESTS_TOTAL: &str = "forecast_requests_total";
pub const FORECAST_BAD_REQUESTS_TOTAL: &str = "forecast_bad_requests_total";
pub const FORECAST_FAILURES_TOTAL: &str = "forecast_failures_total";
pub const FORECAST_FIT_DURATION_MS: &str = "forecast_fit_duration_ms";
pub const FORECAST_ROWS: &str = "forecast_rows";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and running sum of observed values.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    /// f64 bit pattern
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: f64) {
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    fn sorted_counters(&self) -> Vec<(String, u64)> {
        let mut counters: Vec<_> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        counters.sort();
        counters
    }

    fn sorted_histograms(&self) -> Vec<(String, u64, f64)> {
        let mut histograms: Vec<_> = self
            .histograms
            .iter()
            .map(|entry| {
                let h = entry.value();
                (entry.key().clone(), h.get_count(), h.get_sum())
            })
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));
        histograms
    }

    /// Prometheus text exposition
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let mut output = String::new();

        for (name, value) in self.sorted_counters() {
            writeln!(output, "# TYPE {} counter", name)
                .and_then(|_| writeln!(output, "{} {}", name, value))
                .map_err(|e| MetricsError::ExportError(e.to_string()))?;
        }

        for (name, count, sum) in self.sorted_histograms() {
            writeln!(output, "# TYPE {} summary", name)
                .and_then(|_| writeln!(output, "{}_count {}", name, count))
                .and_then(|_| writeln!(output, "{}_sum {}", name, sum))
                .map_err(|e| MetricsError::ExportError(e.to_string()))?;
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        for (name, value) in self.sorted_counters() {
            counters.insert(name, json!(value));
        }

        let mut histograms = serde_json::Map::new();
        for (name, count, sum) in self.sorted_histograms() {
            histograms.insert(name, json!({ "count": count, "sum": sum }));
        }

        json!({
            "counters": counters,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
    pub static ref FORECAST_METRICS: ForecastMetrics = ForecastMetrics::new(&METRICS);
}

/// Handles on the forecast endpoint's counters
pub struct ForecastMetrics {
    pub requests_total: Counter,
    pub bad_requests_total: Counter,
    pub failures_total: Counter,
    pub fit_duration_ms: Histogram,
    pub rows: Histogram,
}

impl ForecastMetrics {
    pub fn new(registry: &MetricsRegistry) -> Self {
        Self {
            requests_total: registry.get_or_create_counter(FORECAST_REQUESTS_TOTAL),
            bad_requests_total: registry.get_or_create_counter(FORECAST_BAD_REQUESTS_TOTAL),
            failures_total: registry.get_or_create_counter(FORECAST_FAILURES_TOTAL),
            fit_duration_ms: registry.get_or_create_histogram(FORECAST_FIT_DURATION_MS),
            rows: registry.get_or_create_histogram(FORECAST_ROWS),
        }
    }

    pub fn record_fit(&self, rows: usize, elapsed: Duration) {
        self.rows.observe(rows as f64);
        self.fit_duration_ms.observe(elapsed.as_secs_f64() * 1000.0);
    }
}

pub async fn metrics_handler() -> Result<String, MetricsError> {
    // touch the forecast handles so they are listed before the first request
    lazy_static::initialize(&FORECAST_METRICS);
    METRICS.export_metrics()
}

pub async fn metrics_json_handler() -> Result<serde_json::Value, MetricsError> {
    lazy_static::initialize(&FORECAST_METRICS);
    Ok(METRICS.export_metrics_json())
}
