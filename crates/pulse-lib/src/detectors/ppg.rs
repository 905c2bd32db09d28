use crate::config::{
    min_valley_distance, valley_window, PipelineConfig, ValleyDetectorKind, WindowMinimumConfig,
};
use crate::metrics::stats::{mean, population_std};
use crate::signal::{smooth, TimeSeries, Valley};

/// Trough finder over one buffer snapshot.
///
/// `now` is the instant the newest sample belongs to; valley timestamps are back-dated
/// from it using `ts.fs`.
pub trait ValleyDetector: Send {
    fn detect(&self, ts: &TimeSeries, now: f64) -> Vec<Valley>;
    fn name(&self) -> &'static str;
}

/// Build the detector selected by `cfg.valley_detector`.
pub fn detector_from_config(cfg: &PipelineConfig) -> Box<dyn ValleyDetector> {
    match cfg.valley_detector {
        ValleyDetectorKind::Adaptive => Box::new(AdaptiveThresholdDetector {
            smoothing_window: cfg.smoothing_window,
            min_samples: cfg.min_samples,
        }),
        ValleyDetectorKind::WindowMinimum => Box::new(WindowMinimumDetector {
            smoothing_window: cfg.smoothing_window,
            min_samples: cfg.min_samples,
            params: cfg.window_minimum,
        }),
    }
}

/// Local 3-point minima of the smoothed signal lying below `mean - std`.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveThresholdDetector {
    pub smoothing_window: usize,
    pub min_samples: usize,
}

impl Default for AdaptiveThresholdDetector {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            min_samples: 100,
        }
    }
}

impl ValleyDetector for AdaptiveThresholdDetector {
    fn detect(&self, ts: &TimeSeries, now: f64) -> Vec<Valley> {
        if ts.len() < self.min_samples.max(3) {
            return Vec::new();
        }
        let smoothed = smooth(&ts.data, self.smoothing_window);
        let threshold = mean(&smoothed) - population_std(&smoothed);
        let half = valley_window(ts.fs);
        let min_gap = min_valley_distance(ts.fs);

        let len = smoothed.len();
        let mut indices = Vec::new();
        let mut last: Option<usize> = None;
        for i in half..len.saturating_sub(half) {
            let v = smoothed[i];
            let is_trough = v < smoothed[i - 1] && v < smoothed[i + 1] && v < threshold;
            if !is_trough {
                continue;
            }
            if last.map_or(true, |prev| i - prev >= min_gap) {
                indices.push(i);
                last = Some(i);
            }
        }
        to_valleys(&indices, &smoothed, ts.fs, now)
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

/// Minimum over a symmetric window of the z-normalised smoothed signal.
///
/// The whole buffer is rejected when the variance of its first differences marks it as
/// noise rather than pulse.
#[derive(Debug, Clone, Copy)]
pub struct WindowMinimumDetector {
    pub smoothing_window: usize,
    pub min_samples: usize,
    pub params: WindowMinimumConfig,
}

impl Default for WindowMinimumDetector {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            min_samples: 100,
            params: WindowMinimumConfig::default(),
        }
    }
}

impl ValleyDetector for WindowMinimumDetector {
    fn detect(&self, ts: &TimeSeries, now: f64) -> Vec<Valley> {
        if ts.len() < self.min_samples.max(3) {
            return Vec::new();
        }
        let smoothed = smooth(&ts.data, self.smoothing_window);
        let mu = mean(&smoothed);
        let sd = population_std(&smoothed);
        if sd <= f64::EPSILON {
            return Vec::new();
        }
        let normalized: Vec<f64> = smoothed.iter().map(|x| (x - mu) / sd).collect();
        let diffs: Vec<f64> = normalized.windows(2).map(|w| w[1] - w[0]).collect();
        let noise = population_std(&diffs).powi(2);
        if noise > self.params.max_noise_variance {
            log::debug!(
                "window-minimum detector rejected buffer: noise variance {noise:.3} > {}",
                self.params.max_noise_variance
            );
            return Vec::new();
        }

        let half = valley_window(ts.fs);
        let min_gap = min_valley_distance(ts.fs);
        let len = normalized.len();
        let mut indices = Vec::new();
        let mut last: Option<usize> = None;
        for i in half..len.saturating_sub(half) {
            let v = normalized[i];
            if v >= -self.params.depth {
                continue;
            }
            let window = &normalized[i - half..=i + half];
            let is_min = window.iter().all(|&w| v <= w);
            if !is_min {
                continue;
            }
            if last.map_or(true, |prev| i - prev >= min_gap) {
                indices.push(i);
                last = Some(i);
            }
        }
        to_valleys(&indices, &smoothed, ts.fs, now)
    }

    fn name(&self) -> &'static str {
        "window-minimum"
    }
}

fn to_valleys(indices: &[usize], smoothed: &[f64], fs: f64, now: f64) -> Vec<Valley> {
    indices
        .iter()
        .map(|&i| Valley::at(i, smoothed[i], smoothed.len(), fs, now))
        .collect()
}
