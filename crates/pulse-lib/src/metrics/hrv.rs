use crate::config::IntervalBand;
use crate::metrics::stats::{mean, sample_std};
use crate::signal::{valley_intervals_ms, Valley};
use serde::{Deserialize, Serialize};

/// SDNN-based HRV estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvEstimate {
    /// Milliseconds, rounded; 0 when undetermined.
    pub sdnn: f64,
    /// 0..=100, rounded.
    pub confidence: f64,
}

/// Time-domain summary of an RR series in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

/// HRV over the RR intervals between consecutive valleys.
pub fn estimate_hrv(
    valleys: &[Valley],
    fs: f64,
    band: &IntervalBand,
    full_confidence_intervals: usize,
) -> HrvEstimate {
    if valleys.len() < 2 {
        return HrvEstimate::default();
    }
    hrv_from_rr_ms(&valley_intervals_ms(valleys, fs), band, full_confidence_intervals)
}

/// SDNN and its confidence from raw RR intervals (ms).
///
/// Intervals outside `band` are dropped; at least two must survive.
pub fn hrv_from_rr_ms(
    rr_ms: &[f64],
    band: &IntervalBand,
    full_confidence_intervals: usize,
) -> HrvEstimate {
    let valid = filter_rr(rr_ms, band);
    let n = valid.len();
    if n < 2 {
        return HrvEstimate::default();
    }
    let mean_rr = mean(&valid);
    let sdnn = sample_std(&valid);
    let full = full_confidence_intervals.max(1) as f64;
    let interval_confidence = (n as f64 / full * 100.0).min(100.0);
    let consistency_confidence = if mean_rr > 0.0 {
        (100.0 - sdnn / mean_rr * 100.0).max(0.0)
    } else {
        0.0
    };
    let confidence = ((interval_confidence + consistency_confidence) / 2.0)
        .round()
        .clamp(0.0, 100.0);
    HrvEstimate {
        sdnn: sdnn.round(),
        confidence,
    }
}

/// Time-domain HRV over the in-band RR intervals (ms).
pub fn hrv_time(rr_ms: &[f64], band: &IntervalBand) -> HRVTime {
    let rr = filter_rr(rr_ms, band);
    let n = rr.len();
    let avnn = mean(&rr);
    let sdnn = sample_std(&rr);
    let rmssd = if n > 1 {
        let diffs = rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = rr.windows(2).filter(|w| (w[1] - w[0]).abs() > 50.0).count();
        count as f64 / (n as f64 - 1.0)
    } else {
        0.0
    };
    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}

fn filter_rr(rr_ms: &[f64], band: &IntervalBand) -> Vec<f64> {
    rr_ms.iter().copied().filter(|&rr| band.contains(rr)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band() -> IntervalBand {
        IntervalBand::new(250.0, 2000.0)
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn four_interval_reference_case() {
        let hrv = hrv_from_rr_ms(&[800.0, 810.0, 790.0, 805.0], &band(), 5);
        assert_eq!(hrv.sdnn, 9.0);
        assert_eq!(hrv.confidence, 89.0);
    }

    #[test]
    fn single_valid_interval_is_undetermined() {
        let hrv = hrv_from_rr_ms(&[800.0, 120.0, 2600.0], &band(), 5);
        assert_eq!(hrv, HrvEstimate::default());
    }

    #[test]
    fn fewer_than_two_valleys_is_undetermined() {
        let one = [Valley::at(10, 0.0, 300, 30.0, 50.0)];
        assert_eq!(estimate_hrv(&one, 30.0, &band(), 5), HrvEstimate::default());
    }

    #[test]
    fn valleys_convert_to_milliseconds() {
        let valleys: Vec<Valley> = [20, 44, 69, 93, 118, 142]
            .iter()
            .map(|&i| Valley::at(i, 0.0, 300, 30.0, 50.0))
            .collect();
        let hrv = estimate_hrv(&valleys, 30.0, &band(), 5);
        // RR ≈ 800, 833, 800, 833, 800 ms
        assert_eq!(hrv.sdnn, 18.0);
        assert!(hrv.confidence > 95.0 && hrv.confidence <= 100.0);
    }

    #[test]
    fn upper_edge_rr_is_kept_at_any_clock() {
        for now in [0.0, 1_000.0, 1.76e9] {
            let valleys: Vec<Valley> = [20, 80, 140, 200]
                .iter()
                .map(|&i| Valley::at(i, 0.0, 300, 30.0, now))
                .collect();
            let hrv = estimate_hrv(&valleys, 30.0, &band(), 5);
            // three 2000 ms intervals: sdnn 0, confidence (60 + 100) / 2
            let expected = HrvEstimate {
                sdnn: 0.0,
                confidence: 80.0,
            };
            assert_eq!(hrv, expected, "now {now}");
        }
    }

    #[test]
    fn confidence_stays_in_range_for_wild_intervals() {
        let hrv = hrv_from_rr_ms(&[260.0, 1990.0, 270.0, 1980.0], &band(), 5);
        assert!((0.0..=100.0).contains(&hrv.confidence));
        assert!(hrv.sdnn > 0.0);
    }

    #[test]
    fn time_domain_summary() {
        let m = hrv_time(&[800.0, 900.0, 850.0, 3000.0, 870.0], &band());
        assert_eq!(m.n, 4);
        assert_close(m.avnn, 855.0, 1e-9);
        let expected_rmssd = ((100.0f64.powi(2) + 50.0f64.powi(2) + 20.0f64.powi(2)) / 3.0).sqrt();
        assert_close(m.rmssd, expected_rmssd, 1e-9);
        assert_close(m.pnn50, 1.0 / 3.0, 1e-9);
    }
}
