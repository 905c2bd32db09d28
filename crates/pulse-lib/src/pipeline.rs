use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::detectors::ppg::{detector_from_config, ValleyDetector};
use crate::metrics::heart_rate::{estimate_heart_rate, HeartRateEstimate};
use crate::metrics::hrv::{estimate_hrv, HrvEstimate};
use crate::observe::{LogObserver, PipelineEvent, PipelineObserver};
use crate::quality::{QualityAssessment, QualityError, QualityGate, SharedModel};
use crate::record::PulseRecord;
use crate::signal::{SampleBuffer, Valley};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Fewer than `min_samples` buffered; no estimates yet.
    #[default]
    Warming,
    Active,
}

/// Everything a caller can observe after one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub tick: u64,
    pub phase: Phase,
    pub buffer: Vec<f64>,
    /// Indices refer to `buffer` of this snapshot, also while held under `Bad` quality.
    pub valleys: Vec<Valley>,
    pub heart_rate: HeartRateEstimate,
    pub hrv: HrvEstimate,
    pub quality: QualityAssessment,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Estimates {
    valleys: Vec<Valley>,
    heart_rate: HeartRateEstimate,
    hrv: HrvEstimate,
}

impl Estimates {
    /// Keep held valleys aligned with the buffer after `evicted` samples fell off its
    /// front. Valleys that left the buffer are dropped.
    fn shift_valleys(&mut self, evicted: usize) {
        self.valleys.retain(|v| v.index >= evicted);
        for valley in &mut self.valleys {
            valley.index -= evicted;
        }
    }
}

/// Streaming HR / HRV / signal-quality pipeline fed one sample per tick.
pub struct PulsePipeline {
    config: PipelineConfig,
    buffer: SampleBuffer,
    detector: Box<dyn ValleyDetector>,
    gate: QualityGate,
    clock: Box<dyn Clock>,
    observer: Box<dyn PipelineObserver>,
    phase: Phase,
    ticks: u64,
    estimates: Estimates,
    latest: PipelineSnapshot,
}

impl PulsePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let detector = detector_from_config(&config);
        let gate = QualityGate::new(config.inference, config.inference_queue);
        Self {
            buffer: SampleBuffer::with_capacity(config.capacity),
            detector,
            gate,
            clock: Box::new(SystemClock),
            observer: Box::new(LogObserver),
            phase: Phase::Warming,
            ticks: 0,
            estimates: Estimates::default(),
            latest: PipelineSnapshot::default(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn quality_gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Install a loaded model; an unsupported input width leaves quality `Unknown`.
    pub fn install_model(&mut self, model: SharedModel) {
        self.gate.install(model, self.observer.as_mut());
    }

    /// Start loading a model in the background. Ticks continue meanwhile.
    pub fn load_model<F>(&mut self, loader: F)
    where
        F: FnOnce() -> Result<SharedModel, QualityError> + Send + 'static,
    {
        self.gate.begin_load(loader);
    }

    /// Ingest one sample and publish the resulting snapshot.
    pub fn tick(&mut self, sample: f64) -> PipelineSnapshot {
        self.ticks += 1;
        let tick = self.ticks;
        self.observer.on_event(&PipelineEvent::TickStarted {
            tick,
            buffered: self.buffer.len(),
        });

        let mut evicted = 0;
        if sample.is_finite() {
            if self.buffer.len() == self.buffer.capacity() {
                evicted = 1;
            }
            self.buffer.append(sample);
        } else {
            self.observer.on_event(&PipelineEvent::SampleRejected {
                tick,
                value: sample,
            });
        }

        if self.buffer.len() < self.config.min_samples {
            self.phase = Phase::Warming;
            self.estimates = Estimates::default();
            self.gate.poll(self.observer.as_mut());
        } else {
            if self.phase == Phase::Warming {
                self.phase = Phase::Active;
                self.observer.on_event(&PipelineEvent::BecameActive { tick });
            }
            let series = self.buffer.to_time_series(self.config.fps);
            self.gate.refresh(tick, &series.data, self.observer.as_mut());
            if self.gate.allow_interval_recompute() {
                let now = self.clock.now();
                let valleys = self.detector.detect(&series, now);
                let heart_rate =
                    estimate_heart_rate(&valleys, series.fs, &self.config.hr_interval_s);
                let hrv = estimate_hrv(
                    &valleys,
                    series.fs,
                    &self.config.rr_interval_ms,
                    self.config.hrv_full_confidence_intervals,
                );
                self.estimates = Estimates {
                    valleys,
                    heart_rate,
                    hrv,
                };
            } else if evicted > 0 {
                self.estimates.shift_valleys(evicted);
            }
        }

        self.latest = PipelineSnapshot {
            tick,
            phase: self.phase,
            buffer: self.buffer.snapshot(),
            valleys: self.estimates.valleys.clone(),
            heart_rate: self.estimates.heart_rate,
            hrv: self.estimates.hrv,
            quality: self.gate.assessment(),
        };
        self.latest.clone()
    }

    /// The snapshot published by the most recent tick.
    pub fn snapshot(&self) -> &PipelineSnapshot {
        &self.latest
    }

    /// Persistable record of the current estimates.
    pub fn record(&self, subject_id: &str) -> PulseRecord {
        PulseRecord {
            subject_id: subject_id.to_string(),
            heart_rate: self.latest.heart_rate,
            hrv: self.latest.hrv,
            raw_samples: self.latest.buffer.clone(),
            timestamp: self.clock.now(),
        }
    }

    /// Drop buffered samples and return to `Warming`, as when a recording restarts.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Warming;
        self.estimates = Estimates::default();
        self.gate.reset();
        self.latest = PipelineSnapshot {
            tick: self.ticks,
            ..PipelineSnapshot::default()
        };
    }

    /// Block until a background model load finishes, so a replay starts with the model
    /// in place. Gives up after `timeout`.
    pub fn wait_for_model(&mut self, timeout: Duration) {
        self.gate.wait_loaded(timeout, self.observer.as_mut());
    }

    /// Wait for queued quality inference to finish (worker mode only).
    pub fn flush_quality(&mut self, timeout: Duration) {
        self.gate.wait_idle(timeout, self.observer.as_mut());
    }

    /// Stop background inference; results still in flight are ignored.
    pub fn shutdown(&mut self) {
        self.gate.shutdown();
    }
}
