//! Push-based observability for the alert engine.
//!
//! This module provides observability through **outbound data only** - no
//! HTTP server, no incoming requests. Metrics are pushed via:
//!
//! 1. **Structured JSON logs**: periodic JSON output to stdout (for Loki,
//!    Fluentd, CloudWatch).
//! 2. **Prometheus registry**: scraped by a sidecar pushgateway if one is
//!    configured; `Metrics::render()` exposes the text format directly.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
