use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Closed range of accepted interval lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalBand {
    pub min: f64,
    pub max: f64,
}

impl IntervalBand {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValleyDetectorKind {
    /// Local 3-point minimum below `mean - std` of the smoothed signal.
    Adaptive,
    /// Minimum over a symmetric window of the z-normalised signal, gated on noise variance.
    WindowMinimum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InferenceMode {
    /// Run the quality model on the ticking thread; results land in the same tick.
    Inline,
    /// Run the quality model on a background worker; results land on a later tick.
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowMinimumConfig {
    /// Variance of the first differences of the z-normalised signal above which the
    /// window is treated as noise.
    pub max_noise_variance: f64,
    /// Minimum trough depth below the mean, in standard deviations.
    pub depth: f64,
}

impl Default for WindowMinimumConfig {
    fn default() -> Self {
        Self {
            max_noise_variance: 0.5,
            depth: 0.5,
        }
    }
}

/// Tunables for the streaming pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Assumed sample rate (Hz) used for timestamps and spacing thresholds.
    pub fps: f64,
    /// Sliding window length in samples.
    pub capacity: usize,
    /// Samples required before valleys, HR/HRV and features are computed.
    pub min_samples: usize,
    /// Moving-average length applied before trough detection.
    pub smoothing_window: usize,
    pub valley_detector: ValleyDetectorKind,
    pub window_minimum: WindowMinimumConfig,
    /// Accepted beat-to-beat interval for heart rate (seconds).
    pub hr_interval_s: IntervalBand,
    /// Accepted RR interval for HRV (milliseconds).
    pub rr_interval_ms: IntervalBand,
    /// Number of valid RR intervals treated as a fully reliable HRV sample.
    pub hrv_full_confidence_intervals: usize,
    pub inference: InferenceMode,
    /// Pending feature vectors allowed in front of the worker before ticks skip submission.
    pub inference_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            capacity: 300,
            min_samples: 100,
            smoothing_window: 5,
            valley_detector: ValleyDetectorKind::Adaptive,
            window_minimum: WindowMinimumConfig::default(),
            hr_interval_s: IntervalBand::new(0.4, 2.0),
            rr_interval_ms: IntervalBand::new(250.0, 2000.0),
            hrv_full_confidence_intervals: 5,
            inference: InferenceMode::Worker,
            inference_queue: 32,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text).context("parsing pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            bail!("fps must be positive, got {}", self.fps);
        }
        if self.capacity == 0 {
            bail!("capacity must be at least 1");
        }
        if self.min_samples > self.capacity {
            bail!(
                "min_samples ({}) exceeds capacity ({})",
                self.min_samples,
                self.capacity
            );
        }
        if self.smoothing_window == 0 {
            bail!("smoothing_window must be at least 1");
        }
        if self.hr_interval_s.min > self.hr_interval_s.max {
            bail!("hr_interval_s.min is above hr_interval_s.max");
        }
        if self.rr_interval_ms.min > self.rr_interval_ms.max {
            bail!("rr_interval_ms.min is above rr_interval_ms.max");
        }
        if self.hrv_full_confidence_intervals == 0 {
            bail!("hrv_full_confidence_intervals must be at least 1");
        }
        Ok(())
    }

    /// Half-width of the neighbourhood a valley candidate must fit inside.
    pub fn valley_window(&self) -> usize {
        valley_window(self.fps)
    }

    /// Minimum spacing between accepted valleys, in samples.
    pub fn min_valley_distance(&self) -> usize {
        min_valley_distance(self.fps)
    }
}

pub fn valley_window(fps: f64) -> usize {
    ((fps * 0.5).floor() as usize).max(1)
}

pub fn min_valley_distance(fps: f64) -> usize {
    ((fps * 0.4).floor() as usize).max(1)
}
