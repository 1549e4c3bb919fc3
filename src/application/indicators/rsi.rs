use ta::indicators::RelativeStrengthIndex;
use ta::Next;

/// Wilder's-smoothing RSI over a slice of closes, returning the latest
/// value. `closes` must be in ascending time order.
///
/// Driven by the `ta` crate's `RelativeStrengthIndex`, the same indicator
/// construction the teacher uses in `feature_engineering_service.rs` - a
/// fresh indicator per call, fed the whole slice, since nothing here
/// caches indicator state across ticks (see `application/indicators/mod.rs`).
///
/// Undefined (`None`) when `closes.len() <= period`; callers treat `None`
/// as "condition not evaluable, do not fire" rather than an error.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).1
}

/// Like `rsi`, but also returns the reading one close earlier - the
/// "previous" value `crossingUp`/`crossingDown` conditions compare
/// against. Computed in a single pass through `closes` rather than
/// re-running the indicator twice over overlapping windows.
pub fn rsi_series(closes: &[f64], period: usize) -> (Option<f64>, Option<f64>) {
    if period == 0 || closes.len() <= period {
        return (None, None);
    }
    let Ok(mut indicator) = RelativeStrengthIndex::new(period) else {
        return (None, None);
    };

    let mut prev = None;
    let mut curr = None;
    for (i, &close) in closes.iter().enumerate() {
        let value = indicator.next(close);
        // Wilder's RSI is only defined once more than `period` closes have
        // fed the smoothing - matching the `len > period` boundary `rsi`
        // has always exposed, rather than `ta`'s very first output.
        if i >= period {
            prev = curr;
            curr = Some(value);
        }
    }
    (prev, curr)
}
