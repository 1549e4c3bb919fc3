//! Pure, deterministic functions over candle sequences. No state, no I/O.
//!
//! Indicators are always recomputed on demand from `CandleStore` slices
//! rather than cached alongside price state, so there is never a stale
//! value to invalidate. Keeping them pure also makes every one of these
//! trivially unit-testable without mocking a cache or a clock.

mod ema;
mod rsi;
mod shape;
mod volume;

pub use ema::ema;
pub use rsi::{rsi, rsi_series};
pub use shape::classify_shape;
pub use volume::volume_spike_ratio;
