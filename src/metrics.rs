//! Run statistics for a featurization.
//!
//! - [`Metric`] is the interface every metric implements
//! - [`MetricsCollector`] holds named metrics plus the run's start and end time
//! - [`CounterMetric`] and [`GaugeMetric`] are the built-in kinds
//!
//! The pipeline fills a collector with the row counts, the per-reason invalid
//! counts, the worker count and the gate usage of the run. Callers can add
//! their own metrics before or after and report everything as JSON or through
//! the log.
//!
//! # Example
//!
//! ```
//! use molprint::metrics::{GaugeMetric, MetricsCollector};
//!
//! let metrics = MetricsCollector::new();
//! metrics.increment_counter("rows_total", 3);
//! metrics.increment_counter("rows_total", 2);
//! metrics.register(Box::new(GaugeMetric::new("load", 0.5)));
//!
//! let json = metrics.to_json();
//! assert_eq!(json["rows_total"]["value"], 5);
//! assert_eq!(json["load"]["value"], 0.5);
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

/// Names of the metrics the pipeline records.
pub mod names {
    pub const ROWS_TOTAL: &str = "rows_total";
    pub const ROWS_VALID: &str = "rows_valid";
    pub const ROWS_INVALID: &str = "rows_invalid";
    pub const WORKERS: &str = "workers";
    pub const GATE_CAPACITY: &str = "gate_capacity";
    pub const PEAK_IN_FLIGHT: &str = "peak_in_flight";
    /// Prefix of the per-reason invalid counters, e.g. `invalid_encode_failed`.
    pub const INVALID_PREFIX: &str = "invalid_";
}

/// A named value reported at the end of a run.
pub trait Metric: Send + Sync + Any {
    /// The name of this metric (e.g., `rows_valid`).
    fn name(&self) -> &str;

    /// The current value as JSON.
    fn value(&self) -> Value;

    /// Optional description of what this metric measures.
    fn description(&self) -> Option<&str> {
        None
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Thread-safe, cheaply cloneable set of metrics.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    metrics: BTreeMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metric, replacing any metric of the same name.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Time between [`record_start`](Self::record_start) and
    /// [`record_end`](Self::record_end), once both were called.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to the counter `name`, creating it at zero if needed.
    ///
    /// A non-counter metric of the same name is replaced.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        if let Some(counter) = inner
            .metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<CounterMetric>())
        {
            counter.count += value;
            return;
        }
        inner.metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, value)),
        );
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.register(Box::new(CounterMetric::with_value(name, value)));
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.register(Box::new(GaugeMetric::new(name, value)));
    }

    /// Current value of counter `name`, if it exists.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock()
            .metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<CounterMetric>())
            .map(|c| c.count)
    }

    /// All metrics as a JSON object, plus `execution_time_ms` once the run ended.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut out = serde_json::Map::new();
        for (name, metric) in &inner.metrics {
            let mut obj = serde_json::Map::new();
            obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                obj.insert("description".to_string(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(obj));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": end.duration_since(start).as_millis(),
                    "description": "Wall time of the run in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Emit every metric as one `info` event.
    pub fn log_summary(&self) {
        let elapsed_ms = self.elapsed().map(|d| d.as_millis());
        for (name, value) in self.snapshot() {
            info!(metric = %name, %value, "run metric");
        }
        if let Some(elapsed_ms) = elapsed_ms {
            info!(elapsed_ms, "run finished");
        }
    }

    /// Write [`to_json`](Self::to_json) to `path` as pretty JSON.
    ///
    /// # Errors
    /// Fails if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path)
            .with_context(|| format!("creating metrics file {}", path.display()))?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }

    /// Names and values of every registered metric.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

/// A monotonically increasing count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A single numeric reading.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = MetricsCollector::new();
        m.increment_counter("a", 1);
        m.increment_counter("a", 41);
        assert_eq!(m.counter("a"), Some(42));
        assert_eq!(m.counter("b"), None);
    }

    #[test]
    fn gauges_are_replaced_by_counters() {
        let m = MetricsCollector::new();
        m.set_gauge("x", 1.5);
        m.increment_counter("x", 2);
        assert_eq!(m.counter("x"), Some(2));
    }

    #[test]
    fn elapsed_needs_both_ends() {
        let m = MetricsCollector::new();
        assert!(m.elapsed().is_none());
        m.record_start();
        assert!(m.elapsed().is_none());
        m.record_end();
        assert!(m.elapsed().is_some());
        assert!(m.to_json().get("execution_time_ms").is_some());
    }
}
