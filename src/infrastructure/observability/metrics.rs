//! Prometheus metrics definitions for the alert engine.
//!
//! All metrics use the `alertd_` prefix and are read-only from the rest of
//! the crate's point of view: every field here is a registered
//! Prometheus collector that components increment/set as they work.

use prometheus::{
    CounterVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the alert engine.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Ticks successfully applied to PriceCache.
    pub ticks_processed_total: prometheus::Counter,
    /// Ticks dropped for arriving older than the current bucket's open time.
    pub out_of_order_dropped_total: prometheus::Counter,
    /// Ticks dropped by the ingestion channel's drop-oldest backpressure policy.
    pub ticks_dropped_total: prometheus::Counter,
    /// Bucket rolls emitted by the scheduler, by timeframe.
    pub bucket_rolls_total: CounterVec,
    /// Rule evaluations that were skipped because a dependent series had
    /// not completed warm-up.
    pub warming_up_skips_total: prometheus::Counter,
    /// Trigger decisions admitted by the throttle gate and durably journaled.
    pub triggers_fired_total: prometheus::Counter,
    /// Trigger decisions suppressed by the throttle gate.
    pub throttle_suppressed_total: prometheus::Counter,
    /// Journal fsync failures.
    pub journal_fsync_failures_total: prometheus::Counter,
    /// Upstream ingestion reconnect attempts.
    pub ingestion_reconnects_total: prometheus::Counter,
    /// Currently armed (active, non-dormant, warmed-up) rule count.
    pub rules_armed: GenericGauge<AtomicF64>,
    /// Currently dormant rule count (references an unknown symbol).
    pub rules_dormant: GenericGauge<AtomicF64>,
    /// Per-tick end-to-end evaluation latency (apply + rule matching).
    pub tick_evaluation_seconds: Histogram,
    /// Server uptime in seconds.
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all collectors registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks_processed_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_ticks_processed_total",
            "Ticks successfully applied to the price cache",
        ))?;
        registry.register(Box::new(ticks_processed_total.clone()))?;

        let out_of_order_dropped_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_out_of_order_dropped_total",
            "Ticks rejected for arriving before the current bucket's open time",
        ))?;
        registry.register(Box::new(out_of_order_dropped_total.clone()))?;

        let ticks_dropped_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_ticks_dropped_total",
            "Ticks dropped by ingestion backpressure (drop-oldest per symbol)",
        ))?;
        registry.register(Box::new(ticks_dropped_total.clone()))?;

        let bucket_rolls_total = CounterVec::new(
            Opts::new("alertd_bucket_rolls_total", "Bucket rolls emitted by the scheduler"),
            &["timeframe"],
        )?;
        registry.register(Box::new(bucket_rolls_total.clone()))?;

        let warming_up_skips_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_warming_up_skips_total",
            "Rule evaluations skipped because a dependent series had not finished warm-up",
        ))?;
        registry.register(Box::new(warming_up_skips_total.clone()))?;

        let triggers_fired_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_triggers_fired_total",
            "Trigger decisions admitted and durably journaled",
        ))?;
        registry.register(Box::new(triggers_fired_total.clone()))?;

        let throttle_suppressed_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_throttle_suppressed_total",
            "Trigger decisions suppressed by the throttle gate",
        ))?;
        registry.register(Box::new(throttle_suppressed_total.clone()))?;

        let journal_fsync_failures_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_journal_fsync_failures_total",
            "Journal append/fsync failures",
        ))?;
        registry.register(Box::new(journal_fsync_failures_total.clone()))?;

        let ingestion_reconnects_total = prometheus::Counter::with_opts(Opts::new(
            "alertd_ingestion_reconnects_total",
            "Upstream WebSocket reconnect attempts",
        ))?;
        registry.register(Box::new(ingestion_reconnects_total.clone()))?;

        let rules_armed = prometheus::Gauge::with_opts(Opts::new(
            "alertd_rules_armed",
            "Rules currently armed for evaluation",
        ))?;
        registry.register(Box::new(rules_armed.clone()))?;

        let rules_dormant = prometheus::Gauge::with_opts(Opts::new(
            "alertd_rules_dormant",
            "Rules held dormant pending their symbol's first tick",
        ))?;
        registry.register(Box::new(rules_dormant.clone()))?;

        let tick_evaluation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "alertd_tick_evaluation_seconds",
                "Time to apply a tick and evaluate its affected rules",
            )
            .buckets(vec![
                0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(tick_evaluation_seconds.clone()))?;

        let uptime_seconds = prometheus::Gauge::with_opts(Opts::new(
            "alertd_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            ticks_processed_total,
            out_of_order_dropped_total,
            ticks_dropped_total,
            bucket_rolls_total,
            warming_up_skips_total,
            triggers_fired_total,
            throttle_suppressed_total,
            journal_fsync_failures_total,
            ingestion_reconnects_total,
            rules_armed,
            rules_dormant,
            tick_evaluation_seconds,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn inc_bucket_roll(&self, timeframe: &str) {
        self.bucket_rolls_total.with_label_values(&[timeframe]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct default Metrics")
    }
}
