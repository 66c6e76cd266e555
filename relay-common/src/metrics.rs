use parking_lot::Mutex;
use std::collections::HashMap;

/// Simple trait for metrics instrumentation
pub trait MetricsCollector: Send + Sync {
    fn inc_counter(&self, name: &str);
    fn observe_gauge(&self, name: &str, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn inc_counter(&self, _name: &str) {}
    fn observe_gauge(&self, _name: &str, _value: f64) {}
}

/// In-memory counters and last-seen gauges.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, f64>>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().get(name).copied()
    }
}

impl MetricsCollector for CounterMetrics {
    fn inc_counter(&self, name: &str) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += 1;
    }

    fn observe_gauge(&self, name: &str, value: f64) {
        self.gauges.lock().insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_metrics() {
        let metrics = CounterMetrics::new();
        metrics.inc_counter("dispatch.attempt");
        metrics.inc_counter("dispatch.attempt");
        metrics.observe_gauge("dispatch.attempt_ms", 12.5);

        assert_eq!(metrics.counter("dispatch.attempt"), 2);
        assert_eq!(metrics.counter("dispatch.success"), 0);
        assert_eq!(metrics.gauge("dispatch.attempt_ms"), Some(12.5));
    }
}
