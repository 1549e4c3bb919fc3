//! Push-based metrics reporter for the alert engine.
//!
//! Periodically outputs metrics as structured JSON to stdout. No HTTP
//! server, no incoming connections - only outbound data.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::application::alert_index::AlertIndex;
use crate::infrastructure::observability::metrics::Metrics;

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub rules: RuleSnapshot,
}

#[derive(Serialize)]
pub struct RuleSnapshot {
    pub total: usize,
    pub dormant: usize,
}

/// Push-based metrics reporter: outputs a JSON snapshot on a configurable
/// interval and keeps the `rules_armed`/`rules_dormant` gauges current.
pub struct MetricsReporter {
    alert_index: AlertIndex,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(alert_index: AlertIndex, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            alert_index,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting (push-based, JSON to stdout)");
        loop {
            tokio::time::sleep(self.interval).await;
            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{json}");
                    info!(
                        rules_total = snapshot.rules.total,
                        rules_dormant = snapshot.rules.dormant,
                        uptime_seconds = snapshot.uptime_seconds,
                        "metrics snapshot"
                    );
                }
                Err(e) => warn!(error = %e, "failed to serialize metrics snapshot"),
            }
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        let snap = self.alert_index.snapshot();
        let uptime = self.start_time.elapsed().as_secs();
        let total = snap.len();
        let dormant = snap.dormant_count();
        let armed = total.saturating_sub(dormant);

        self.metrics.rules_armed.set(armed as f64);
        self.metrics.rules_dormant.set(dormant as f64);
        self.metrics.uptime_seconds.set(uptime as f64);

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            rules: RuleSnapshot { total, dormant },
        }
    }
}
