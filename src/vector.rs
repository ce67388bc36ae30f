//! Vector builder (spec.md §4.3): reduces a device window to a live vector
//! of the latest fresh reading per sniffer, then normalizes it.

use crate::types::{DeviceWindow, SniffVector};

/// Reduce a window to the latest sample per sniffer, keeping only sniffers
/// whose latest sample is within `per_pi_fresh_sec` of `now`.
///
/// Returns `None` if the resulting domain size is below `min_sources` —
/// this is the `InsufficientSources` case from spec.md §7, modeled as
/// normal control flow rather than an error.
pub fn build_live_vector(
    window: &DeviceWindow,
    now: f64,
    per_pi_fresh_sec: f64,
    min_sources: usize,
) -> Option<SniffVector<i32>> {
    let mut latest_by_sniffer: SniffVector<(f64, i32)> = SniffVector::new();
    for s in &window.samples {
        latest_by_sniffer
            .entry(s.sniffer_id.clone())
            .and_modify(|entry| {
                if s.rx_ts > entry.0 {
                    *entry = (s.rx_ts, s.rssi);
                }
            })
            .or_insert((s.rx_ts, s.rssi));
    }

    let live: SniffVector<i32> = latest_by_sniffer
        .into_iter()
        .filter(|(_, (ts, _))| now - ts <= per_pi_fresh_sec)
        .map(|(sniffer, (_, rssi))| (sniffer, rssi))
        .collect();

    if live.len() < min_sources {
        None
    } else {
        Some(live)
    }
}

/// Median of an `i32` slice, matching the original source's even/odd
/// midpoint averaging.
pub fn median_i32(values: &[i32]) -> f64 {
    let mut sorted: Vec<i32> = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    }
}

/// Median of an `f64` slice, used when normalizing already-normalized
/// vectors (e.g. the calibration collector working over prior snapshots).
pub fn median_f64(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Round to one decimal place, matching the original source's
/// `round(x, 1)` calls.
fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Subtract the median from every entry, rounded to one decimal. The
/// median of the result is 0 within rounding (spec.md §8 invariant 3).
pub fn normalize(live: &SniffVector<i32>) -> SniffVector<f64> {
    let values: Vec<i32> = live.values().copied().collect();
    let median = median_i32(&values);
    live.iter()
        .map(|(sniffer, rssi)| (sniffer.clone(), round1(*rssi as f64 - median)))
        .collect()
}
