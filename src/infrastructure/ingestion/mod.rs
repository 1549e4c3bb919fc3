//! C5 IngestionSource: the upstream tick feed and the startup/on-demand
//! historical warm-up fetch that feeds CandleStore.

pub mod backpressure;
pub mod warmup;
pub mod websocket;

pub use backpressure::LatestTickBuffer;
