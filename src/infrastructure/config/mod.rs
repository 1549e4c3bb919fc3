//! Configuration module for the alert engine.
//!
//! Structured loading from environment variables, organized by domain
//! (ingestion, journal, cache sizing, observability) and aggregated into
//! one `Config`.

mod cache_env;
mod ingestion_env;
mod journal_env;
mod observability_env;

pub use cache_env::CacheEnvConfig;
pub use ingestion_env::IngestionEnvConfig;
pub use journal_env::JournalEnvConfig;
pub use observability_env::ObservabilityEnvConfig;

use crate::domain::errors::AlertError;

/// Aggregated, validated configuration for one run of the alert engine.
/// Loading this is the only place a bad environment is fatal; everything
/// else is logged and continues.
#[derive(Debug, Clone)]
pub struct Config {
    pub ingestion: IngestionEnvConfig,
    pub journal: JournalEnvConfig,
    pub cache: CacheEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Loads configuration from the process environment, having already
    /// read a `.env` file if present (`dotenvy::dotenv()` is called by
    /// the binary's `main`, not here, so library consumers can supply
    /// their own env without a file on disk).
    pub fn from_env() -> Result<Self, AlertError> {
        let ingestion = IngestionEnvConfig::from_env();
        let journal = JournalEnvConfig::from_env();
        let cache = CacheEnvConfig::from_env();
        let observability = ObservabilityEnvConfig::from_env();

        if ingestion.upstream_ws_url.is_empty() {
            return Err(AlertError::Configuration {
                reason: "UPSTREAM_WS_URL must not be empty".to_string(),
            });
        }
        if cache.warmup_depth == 0 {
            return Err(AlertError::Configuration {
                reason: "WARMUP_DEPTH must be at least 1".to_string(),
            });
        }
        if cache.ring_capacity == 0 {
            return Err(AlertError::Configuration {
                reason: "RING_CAPACITY must be at least 1".to_string(),
            });
        }

        Ok(Self { ingestion, journal, cache, observability })
    }
}
