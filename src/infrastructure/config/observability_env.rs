//! Observability environment configuration parsing.

use std::env;

#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub report_interval_seconds: u64,
    /// Optional bind address for the read-only query surface
    /// (`LISTEN_ADDR`). `None` disables it entirely.
    pub listen_addr: Option<String>,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_seconds: 60,
            listen_addr: Some(":5000".to_string()),
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env::var("OBSERVABILITY_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            report_interval_seconds: env::var("OBSERVABILITY_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.report_interval_seconds),
            listen_addr: env::var("LISTEN_ADDR").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_observability_on_port_5000() {
        let cfg = ObservabilityEnvConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.listen_addr.as_deref(), Some(":5000"));
    }
}
