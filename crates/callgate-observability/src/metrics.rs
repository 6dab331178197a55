//! Reconcile Metrics
//!
//! Prometheus counters and histograms for the controller. Label values are
//! drawn from small closed sets (outcome, executor kind, decision) so series
//! cardinality stays fixed regardless of how many tool calls pass through.
//!
//! Each [`ReconcileMetrics`] owns its registry, so tests and embedded
//! controllers never collide on global registration.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Latency buckets for dispatch durations, in seconds
pub const DISPATCH_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.01,  // 10ms
    0.05,  // 50ms
    0.1,   // 100ms
    0.25,  // 250ms
    0.5,   // 500ms
    1.0,   // 1s
    2.5,   // 2.5s
    5.0,   // 5s
    10.0,  // 10s
    30.0,  // 30s
    60.0,  // 1m
];

/// Controller metrics
#[derive(Debug, Clone)]
pub struct ReconcileMetrics {
    registry: Registry,
    reconcile_total: IntCounterVec,          // cardinality: ≤8 (outcome)
    dispatch_total: IntCounterVec,           // cardinality: 6 (kind, result)
    dispatch_duration_seconds: HistogramVec, // cardinality: 3 (kind)
    approval_callbacks_total: IntCounterVec, // cardinality: 2 (decision)
}

impl ReconcileMetrics {
    /// Create and register all metrics under `namespace`
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_reconcile_total"),
                "Total reconcile passes by outcome",
            ),
            &["outcome"],
        )?;

        let dispatch_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_dispatch_total"),
                "Total tool dispatches by executor kind and result",
            ),
            &["kind", "result"],
        )?;

        let dispatch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                format!("{namespace}_dispatch_duration_seconds"),
                "Tool dispatch duration in seconds by executor kind",
            )
            .buckets(DISPATCH_BUCKETS.to_vec()),
            &["kind"],
        )?;

        let approval_callbacks_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_approval_callbacks_total"),
                "Total applied approval callbacks by decision",
            ),
            &["decision"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(dispatch_total.clone()))?;
        registry.register(Box::new(dispatch_duration_seconds.clone()))?;
        registry.register(Box::new(approval_callbacks_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            dispatch_total,
            dispatch_duration_seconds,
            approval_callbacks_total,
        })
    }

    /// Count one reconcile pass ending in `outcome`
    pub fn record_reconcile(&self, outcome: &str) {
        self.reconcile_total.with_label_values(&[outcome]).inc();
    }

    /// Count one dispatch and observe its duration
    pub fn record_dispatch(&self, kind: &str, success: bool, duration: Duration) {
        let result = if success { "success" } else { "failure" };
        self.dispatch_total.with_label_values(&[kind, result]).inc();
        self.dispatch_duration_seconds
            .with_label_values(&[kind])
            .observe(duration.as_secs_f64());
    }

    /// Start timing a dispatch for `kind`
    pub fn start_dispatch(&self, kind: &'static str) -> DispatchTimer<'_> {
        DispatchTimer {
            metrics: self,
            kind,
            start_time: Instant::now(),
        }
    }

    /// Count one applied approval callback
    pub fn record_callback(&self, approved: bool) {
        let decision = if approved { "approved" } else { "rejected" };
        self.approval_callbacks_total
            .with_label_values(&[decision])
            .inc();
    }

    /// Current value of `reconcile_total{outcome}`
    pub fn reconcile_count(&self, outcome: &str) -> u64 {
        self.reconcile_total.with_label_values(&[outcome]).get()
    }

    /// Current value of `dispatch_total{kind,result}` summed over results
    pub fn dispatch_count(&self, kind: &str) -> u64 {
        ["success", "failure"]
            .iter()
            .map(|result| self.dispatch_total.with_label_values(&[kind, *result]).get())
            .sum()
    }

    /// Prometheus text exposition of every metric in this registry
    pub fn render(&self) -> Result<String, MetricsError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Timer for a single dispatch
pub struct DispatchTimer<'a> {
    metrics: &'a ReconcileMetrics,
    kind: &'static str,
    start_time: Instant,
}

impl DispatchTimer<'_> {
    /// Finish timing and record the dispatch result
    pub fn finish(self, success: bool) {
        self.metrics
            .record_dispatch(self.kind, success, self.start_time.elapsed());
    }
}

/// Metrics errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
