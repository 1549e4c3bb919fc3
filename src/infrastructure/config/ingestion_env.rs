//! Ingestion environment configuration: the upstream tick feed endpoint
//! and the symbol universe to subscribe to.

use std::env;

#[derive(Debug, Clone)]
pub struct IngestionEnvConfig {
    /// WebSocket endpoint for the upstream mini-ticker/trade stream.
    pub upstream_ws_url: String,
    /// Symbols to subscribe to. Empty means "subscribe to the combined
    /// all-mini-ticker stream".
    pub symbols: Vec<String>,
    /// REST base URL used for the warm-up candle fetch.
    pub rest_base_url: String,
}

impl Default for IngestionEnvConfig {
    fn default() -> Self {
        Self {
            upstream_ws_url: "wss://stream.binance.com:9443".to_string(),
            symbols: Vec::new(),
            rest_base_url: "https://api.binance.com".to_string(),
        }
    }
}

impl IngestionEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upstream_ws_url: env::var("UPSTREAM_WS_URL").unwrap_or(defaults.upstream_ws_url),
            symbols: env::var("SYMBOLS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_ascii_uppercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rest_base_url: env::var("UPSTREAM_REST_URL").unwrap_or(defaults.rest_base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_binance_endpoints() {
        let cfg = IngestionEnvConfig::default();
        assert!(cfg.upstream_ws_url.starts_with("wss://"));
        assert!(cfg.symbols.is_empty());
    }
}
