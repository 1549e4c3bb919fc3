/// Ratio of the current bucket's volume to the mean of the trailing
/// `window` buckets. Undefined when fewer than `window` historical
/// buckets are available.
pub fn volume_spike_ratio(current_volume: f64, volumes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || volumes.len() < window {
        return None;
    }
    let trailing = &volumes[volumes.len() - window..];
    let mean: f64 = trailing.iter().sum::<f64>() / window as f64;
    if mean == 0.0 {
        return None;
    }
    Some(current_volume / mean)
}
