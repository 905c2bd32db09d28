//! Structured events emitted at fixed points of the pipeline.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    TickStarted { tick: u64, buffered: usize },
    /// Warming → Active.
    BecameActive { tick: u64 },
    SampleRejected { tick: u64, value: f64 },
    ModelLoaded { arity: usize },
    ModelUnavailable { reason: String },
    InferenceFailed { seq: u64, reason: String },
    StaleResultDropped { seq: u64, held: u64 },
    InferenceQueueFull { tick: u64 },
}

pub trait PipelineObserver: Send {
    fn on_event(&mut self, event: &PipelineEvent);
}

/// Routes events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::TickStarted { tick, buffered } => {
                trace!("tick {tick} ({buffered} samples buffered)")
            }
            PipelineEvent::BecameActive { tick } => {
                info!("pipeline active at tick {tick}")
            }
            PipelineEvent::SampleRejected { tick, value } => {
                warn!("tick {tick}: dropped non-finite sample {value}")
            }
            PipelineEvent::ModelLoaded { arity } => {
                info!("quality model ready ({arity} features)")
            }
            PipelineEvent::ModelUnavailable { reason } => {
                warn!("quality model unavailable: {reason}")
            }
            PipelineEvent::InferenceFailed { seq, reason } => {
                warn!("quality inference #{seq} failed: {reason}")
            }
            PipelineEvent::StaleResultDropped { seq, held } => {
                debug!("dropped stale quality result #{seq} (holding #{held})")
            }
            PipelineEvent::InferenceQueueFull { tick } => {
                debug!("tick {tick}: quality worker busy, skipped submission")
            }
        }
    }
}

/// Per-kind event counters; clones share the same tallies.
#[derive(Debug, Default, Clone)]
pub struct EventCounters {
    inner: Arc<Tallies>,
}

#[derive(Debug, Default)]
struct Tallies {
    ticks: AtomicU64,
    activations: AtomicU64,
    rejected_samples: AtomicU64,
    models_loaded: AtomicU64,
    model_unavailable: AtomicU64,
    inference_failures: AtomicU64,
    stale_results: AtomicU64,
    queue_full: AtomicU64,
}

impl EventCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }
    pub fn activations(&self) -> u64 {
        self.inner.activations.load(Ordering::Relaxed)
    }
    pub fn rejected_samples(&self) -> u64 {
        self.inner.rejected_samples.load(Ordering::Relaxed)
    }
    pub fn models_loaded(&self) -> u64 {
        self.inner.models_loaded.load(Ordering::Relaxed)
    }
    pub fn model_unavailable(&self) -> u64 {
        self.inner.model_unavailable.load(Ordering::Relaxed)
    }
    pub fn inference_failures(&self) -> u64 {
        self.inner.inference_failures.load(Ordering::Relaxed)
    }
    pub fn stale_results(&self) -> u64 {
        self.inner.stale_results.load(Ordering::Relaxed)
    }
    pub fn queue_full(&self) -> u64 {
        self.inner.queue_full.load(Ordering::Relaxed)
    }
}

impl PipelineObserver for EventCounters {
    fn on_event(&mut self, event: &PipelineEvent) {
        let t = &self.inner;
        let counter = match event {
            PipelineEvent::TickStarted { .. } => &t.ticks,
            PipelineEvent::BecameActive { .. } => &t.activations,
            PipelineEvent::SampleRejected { .. } => &t.rejected_samples,
            PipelineEvent::ModelLoaded { .. } => &t.models_loaded,
            PipelineEvent::ModelUnavailable { .. } => &t.model_unavailable,
            PipelineEvent::InferenceFailed { .. } => &t.inference_failures,
            PipelineEvent::StaleResultDropped { .. } => &t.stale_results,
            PipelineEvent::InferenceQueueFull { .. } => &t.queue_full,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sends every event to each wrapped observer in order.
pub struct Fanout(pub Vec<Box<dyn PipelineObserver>>);

impl PipelineObserver for Fanout {
    fn on_event(&mut self, event: &PipelineEvent) {
        for observer in self.0.iter_mut() {
            observer.on_event(event);
        }
    }
}
