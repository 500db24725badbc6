/*!
 * # Metrics Module
 *
 * In-process counters and gauges for the alert API.
 *
 * Metrics are exposed in the following formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

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

/// Gauge storing an `f64` as its bit pattern.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
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

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    /// Prometheus text exposition, names sorted for stable output.
    pub fn export_metrics(&self) -> String {
        let mut output = String::new();

        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        counters.sort();
        for (name, value) in counters {
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        let mut gauges: Vec<(String, f64)> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in gauges {
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            counters.insert(name.to_string(), json!(counter.get()));
        }

        let mut gauges = serde_json::Map::new();
        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            gauges.insert(name.to_string(), json!(gauge.get()));
        }

        json!({
            "counters": counters,
            "gauges": gauges,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
    pub static ref BP_METRICS: BpMetrics = BpMetrics::new();
}

/// Detector-level metrics.
pub struct BpMetrics {
    pub evaluations_total: Counter,
    pub alerts_total: Counter,
    pub invalid_requests_total: Counter,
    pub window_readings: Gauge,
}

impl BpMetrics {
    pub fn new() -> Self {
        Self {
            evaluations_total: METRICS.get_or_create_counter("bp_evaluations_total"),
            alerts_total: METRICS.get_or_create_counter("bp_alerts_total"),
            invalid_requests_total: METRICS.get_or_create_counter("bp_invalid_requests_total"),
            window_readings: METRICS.get_or_create_gauge("bp_window_readings"),
        }
    }

    pub fn record_evaluation(&self, alert: bool, window_len: usize) {
        self.evaluations_total.inc();
        if alert {
            self.alerts_total.inc();
        }
        self.window_readings.set(window_len as f64);
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests_total.inc();
    }
}

impl Default for BpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// HTTP endpoint handlers for metrics
pub async fn metrics_handler() -> String {
    METRICS.export_metrics()
}

pub async fn metrics_json_handler() -> axum::Json<serde_json::Value> {
    axum::Json(METRICS.export_metrics_json())
}
