//! Journal environment configuration.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct JournalEnvConfig {
    pub dir: PathBuf,
    /// Optional external pub/sub endpoint mirroring the `triggers` channel.
    pub pubsub_url: Option<String>,
}

impl Default for JournalEnvConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./journal"),
            pubsub_url: None,
        }
    }
}

impl JournalEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dir: env::var("JOURNAL_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
            pubsub_url: env::var("PUBSUB_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}
