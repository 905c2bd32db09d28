use crate::config::IntervalBand;
use crate::metrics::stats::{mean, median, population_std};
use crate::signal::{valley_intervals_s, Valley};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRateEstimate {
    /// Beats per minute, 0 when undetermined.
    pub bpm: u32,
    /// 0..=100
    pub confidence: f64,
}

/// Heart rate from the median valley-to-valley interval.
///
/// Intervals outside `band` (seconds) are discarded. Confidence drops with the
/// coefficient of variation of the surviving intervals.
pub fn estimate_heart_rate(
    valleys: &[Valley],
    fs: f64,
    band: &IntervalBand,
) -> HeartRateEstimate {
    if valleys.len() < 2 {
        return HeartRateEstimate::default();
    }
    let valid: Vec<f64> = valley_intervals_s(valleys, fs)
        .into_iter()
        .filter(|&dt| band.contains(dt))
        .collect();
    heart_rate_from_intervals(&valid)
}

pub(crate) fn heart_rate_from_intervals(valid: &[f64]) -> HeartRateEstimate {
    if valid.is_empty() {
        return HeartRateEstimate::default();
    }
    let mid = median(valid);
    if mid <= 0.0 {
        return HeartRateEstimate::default();
    }
    let bpm = (60.0 / mid).round() as u32;
    let avg = mean(valid);
    let cv = if avg > 0.0 {
        population_std(valid) / avg
    } else {
        0.0
    };
    let confidence = (100.0 - cv * 100.0).clamp(0.0, 100.0);
    HeartRateEstimate { bpm, confidence }
}
