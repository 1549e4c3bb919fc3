//! Cache sizing environment configuration: warm-up depth, ring capacity
//! and shard count for C1/C2.

use std::env;

#[derive(Debug, Clone, Copy)]
pub struct CacheEnvConfig {
    pub warmup_depth: usize,
    pub ring_capacity: usize,
    /// `None` means "auto" - the number of available CPU cores.
    pub max_shards: Option<usize>,
}

impl Default for CacheEnvConfig {
    fn default() -> Self {
        Self {
            warmup_depth: 200,
            ring_capacity: 256,
            max_shards: None,
        }
    }
}

impl CacheEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            warmup_depth: parse_env("WARMUP_DEPTH", defaults.warmup_depth),
            ring_capacity: parse_env("RING_CAPACITY", defaults.ring_capacity),
            max_shards: env::var("MAX_SHARDS").ok().and_then(|v| v.parse().ok()),
        }
    }

    /// Resolves `max_shards` against the available parallelism when no
    /// explicit override is set, so shard count tracks the number of
    /// cores by default.
    pub fn resolved_shard_count(&self) -> usize {
        self.max_shards.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        })
    }
}

fn parse_env(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
