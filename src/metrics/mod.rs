//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Selection metrics
    pub selections: CounterVec,
    pub selection_duration: Histogram,
    pub budget_overflows: Counter,

    // Cache metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_evictions: Counter,
    pub cache_invalidations: Counter,

    // Compression metrics
    pub compressions: CounterVec,

    // Learning metrics
    pub feedback_events: CounterVec,
    pub profile_updates: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let selections = register_counter_vec_with_registry!(
            Opts::new("context_selections_total", "Total context selections"),
            &["strategy", "source"],
            registry
        )?;

        let selection_duration = register_histogram_with_registry!(
            "context_selection_duration_seconds",
            "Context selection duration in seconds",
            registry
        )?;

        let budget_overflows = register_counter_with_registry!(
            Opts::new(
                "context_budget_overflows_total",
                "Selections returned above their token budget"
            ),
            registry
        )?;

        let cache_hits = register_counter_with_registry!(
            Opts::new("selection_cache_hits_total", "Selection cache hits"),
            registry
        )?;

        let cache_misses = register_counter_with_registry!(
            Opts::new("selection_cache_misses_total", "Selection cache misses"),
            registry
        )?;

        let cache_evictions = register_counter_with_registry!(
            Opts::new("selection_cache_evictions_total", "Selection cache evictions"),
            registry
        )?;

        let cache_invalidations = register_counter_with_registry!(
            Opts::new(
                "selection_cache_invalidations_total",
                "Entries dropped by project-change invalidation"
            ),
            registry
        )?;

        let compressions = register_counter_vec_with_registry!(
            Opts::new("context_compressions_total", "Total compression operations"),
            &["strategy"],
            registry
        )?;

        let feedback_events = register_counter_vec_with_registry!(
            Opts::new("context_feedback_events_total", "Total feedback events"),
            &["kind"],
            registry
        )?;

        let profile_updates = register_counter_with_registry!(
            Opts::new("task_profile_updates_total", "Total task profile updates"),
            registry
        )?;

        Ok(Self {
            registry,
            selections,
            selection_duration,
            budget_overflows,
            cache_hits,
            cache_misses,
            cache_evictions,
            cache_invalidations,
            compressions,
            feedback_events,
            profile_updates,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed selection
    pub fn record_selection(&self, strategy: &str, cached: bool, duration_secs: f64) {
        let source = if cached { "cache" } else { "computed" };
        self.selections.with_label_values(&[strategy, source]).inc();
        self.selection_duration.observe(duration_secs);
    }

    /// Record a selection that ended over its token budget
    pub fn record_budget_overflow(&self) {
        self.budget_overflows.inc();
    }

    /// Record a compression operation
    pub fn record_compression(&self, strategy: &str) {
        self.compressions.with_label_values(&[strategy]).inc();
    }

    /// Record a feedback event
    pub fn record_feedback(&self, kind: &str) {
        self.feedback_events.with_label_values(&[kind]).inc();
        self.profile_updates.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_selection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_selection("balanced", false, 0.002);
        metrics.record_selection("balanced", true, 0.0001);
        metrics.record_budget_overflow();
        // Metrics should be recorded without panicking
    }

    #[test]
    fn test_export_contains_registered_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_compression("snippet");
        let text = metrics.export_prometheus();
        assert!(text.contains("context_compressions_total"));
    }
}
