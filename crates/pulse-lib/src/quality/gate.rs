use super::{QualityAssessment, QualityClass, QualityError, SharedModel};
use crate::config::InferenceMode;
use crate::metrics::features::{extract_features, FeatureArity};
use crate::observe::{PipelineEvent, PipelineObserver};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::thread::JoinHandle;

struct InferenceJob {
    seq: u64,
    features: Vec<f64>,
}

struct InferenceOutcome {
    seq: u64,
    result: Result<[f64; 3], QualityError>,
}

enum ModelState {
    /// Nothing installed or load not yet requested.
    Absent,
    Loading(Receiver<Result<SharedModel, QualityError>>),
    Inline {
        model: SharedModel,
        arity: FeatureArity,
    },
    Worker(InferenceWorker),
    /// The last load attempt failed or the model's input shape is unsupported.
    Unavailable(String),
}

struct InferenceWorker {
    arity: FeatureArity,
    job_tx: Option<Sender<InferenceJob>>,
    result_rx: Receiver<InferenceOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    fn spawn(model: SharedModel, arity: FeatureArity, queue: usize) -> Self {
        let (job_tx, job_rx) = bounded::<InferenceJob>(queue.max(1));
        let (result_tx, result_rx) = bounded::<InferenceOutcome>(queue.max(1) * 2);
        let handle = std::thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let outcome = InferenceOutcome {
                    seq: job.seq,
                    result: model.predict(&job.features),
                };
                if result_tx.send(outcome).is_err() {
                    // gate torn down; nobody is listening any more
                    break;
                }
            }
        });
        Self {
            arity,
            job_tx: Some(job_tx),
            result_rx,
            handle: Some(handle),
        }
    }

    fn stop(mut self) {
        // Closing the job channel ends the worker loop; queued outcomes are discarded with
        // `result_rx`.
        self.job_tx.take();
        drop(self.result_rx);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Tracks the last-known quality assessment and drives model inference.
///
/// Results carry the sequence number of the feature vector they answer; anything not
/// newer than the held assessment is dropped.
pub struct QualityGate {
    mode: InferenceMode,
    queue: usize,
    state: ModelState,
    assessment: QualityAssessment,
    held_seq: u64,
    /// Highest sequence number answered, successfully or not.
    answered_seq: u64,
    next_seq: u64,
    unavailable_reported: bool,
}

impl QualityGate {
    pub fn new(mode: InferenceMode, queue: usize) -> Self {
        Self {
            mode,
            queue,
            state: ModelState::Absent,
            assessment: QualityAssessment::default(),
            held_seq: 0,
            answered_seq: 0,
            next_seq: 1,
            unavailable_reported: false,
        }
    }

    pub fn assessment(&self) -> QualityAssessment {
        self.assessment
    }

    /// False only while the held assessment says the signal is `Bad`.
    pub fn allow_interval_recompute(&self) -> bool {
        self.assessment.class != QualityClass::Bad
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ModelState::Inline { .. } | ModelState::Worker(_))
    }

    /// Feature width of the installed model.
    pub fn arity(&self) -> Option<FeatureArity> {
        match &self.state {
            ModelState::Inline { arity, .. } => Some(*arity),
            ModelState::Worker(worker) => Some(worker.arity),
            _ => None,
        }
    }

    /// Install an already-loaded model, replacing any previous one.
    pub fn install(&mut self, model: SharedModel, observer: &mut dyn PipelineObserver) {
        self.stop_worker();
        self.unavailable_reported = false;
        let declared = model.input_arity();
        let Some(arity) = FeatureArity::from_len(declared) else {
            let err = QualityError::ArityMismatch {
                expected: declared,
                supported: "8 or 10",
            };
            self.state = ModelState::Unavailable(err.to_string());
            self.report_unavailable(observer);
            return;
        };
        self.state = match self.mode {
            InferenceMode::Inline => ModelState::Inline { model, arity },
            InferenceMode::Worker => {
                ModelState::Worker(InferenceWorker::spawn(model, arity, self.queue))
            }
        };
        observer.on_event(&PipelineEvent::ModelLoaded {
            arity: arity.len(),
        });
    }

    /// Load a model on a background thread; it is installed on the first tick after the
    /// loader finishes.
    pub fn begin_load<F>(&mut self, loader: F)
    where
        F: FnOnce() -> Result<SharedModel, QualityError> + Send + 'static,
    {
        self.stop_worker();
        self.unavailable_reported = false;
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(loader());
        });
        self.state = ModelState::Loading(rx);
    }

    /// Block until a pending load resolves or `timeout` passes. A load that is still
    /// running afterwards keeps resolving on later polls.
    pub fn wait_loaded(
        &mut self,
        timeout: std::time::Duration,
        observer: &mut dyn PipelineObserver,
    ) {
        let received = match &self.state {
            ModelState::Loading(rx) => rx.recv_timeout(timeout),
            _ => return,
        };
        match received {
            Ok(loaded) => self.finish_load(loaded, observer),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.loader_lost(observer),
        }
    }

    /// Resolve a pending load and apply any finished inference results.
    pub fn poll(&mut self, observer: &mut dyn PipelineObserver) {
        self.poll_load(observer);
        let mut outcomes = Vec::new();
        let mut worker_lost = false;
        if let ModelState::Worker(worker) = &self.state {
            loop {
                match worker.result_rx.try_recv() {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        worker_lost = true;
                        break;
                    }
                }
            }
        }
        for outcome in outcomes {
            self.apply(outcome, observer);
        }
        if worker_lost {
            self.mark_unavailable("inference worker stopped".into(), observer);
        }
    }

    /// Submit the current window for classification.
    pub fn refresh(&mut self, tick: u64, data: &[f64], observer: &mut dyn PipelineObserver) {
        self.poll(observer);
        match &self.state {
            ModelState::Inline { model, arity } => {
                let result = model.predict(&extract_features(data, *arity));
                let seq = self.take_seq();
                self.apply(InferenceOutcome { seq, result }, observer);
            }
            ModelState::Worker(worker) => {
                let Some(job_tx) = worker.job_tx.as_ref() else {
                    return;
                };
                let job = InferenceJob {
                    seq: self.next_seq,
                    features: extract_features(data, worker.arity),
                };
                match job_tx.try_send(job) {
                    Ok(()) => {
                        self.next_seq += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        observer.on_event(&PipelineEvent::InferenceQueueFull { tick });
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        self.mark_unavailable("inference worker stopped".into(), observer);
                    }
                }
            }
            ModelState::Loading(_) => {}
            ModelState::Absent => {
                self.report_unavailable(observer);
            }
            ModelState::Unavailable(_) => {
                self.report_unavailable(observer);
            }
        }
    }

    /// Forget the held assessment; results already in flight become stale.
    pub fn reset(&mut self) {
        self.assessment = QualityAssessment::default();
        self.held_seq = self.next_seq.saturating_sub(1);
    }

    /// Stop the worker; results still in flight are ignored.
    pub fn shutdown(&mut self) {
        self.stop_worker();
        self.state = ModelState::Absent;
    }

    /// Block until every submitted job has been answered or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: std::time::Duration, observer: &mut dyn PipelineObserver) {
        let deadline = std::time::Instant::now() + timeout;
        while self.answered_seq + 1 < self.next_seq {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let outcome = match &self.state {
                ModelState::Worker(worker) => worker.result_rx.recv_timeout(remaining).ok(),
                _ => None,
            };
            match outcome {
                Some(outcome) => self.apply(outcome, observer),
                None => break,
            }
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn apply(&mut self, outcome: InferenceOutcome, observer: &mut dyn PipelineObserver) {
        self.answered_seq = self.answered_seq.max(outcome.seq);
        if outcome.seq <= self.held_seq {
            observer.on_event(&PipelineEvent::StaleResultDropped {
                seq: outcome.seq,
                held: self.held_seq,
            });
            return;
        }
        let assessment = outcome
            .result
            .and_then(|probs| QualityAssessment::from_probabilities(&probs));
        match assessment {
            Ok(assessment) => {
                self.assessment = assessment;
                self.held_seq = outcome.seq;
            }
            Err(err) => {
                observer.on_event(&PipelineEvent::InferenceFailed {
                    seq: outcome.seq,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn poll_load(&mut self, observer: &mut dyn PipelineObserver) {
        let ModelState::Loading(rx) = &self.state else {
            return;
        };
        match rx.try_recv() {
            Ok(loaded) => self.finish_load(loaded, observer),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.loader_lost(observer),
        }
    }

    fn finish_load(
        &mut self,
        loaded: Result<SharedModel, QualityError>,
        observer: &mut dyn PipelineObserver,
    ) {
        match loaded {
            Ok(model) => self.install(model, observer),
            Err(err) => self.mark_unavailable(err.to_string(), observer),
        }
    }

    fn loader_lost(&mut self, observer: &mut dyn PipelineObserver) {
        self.mark_unavailable("model loader exited without a result".into(), observer);
    }

    fn mark_unavailable(&mut self, reason: String, observer: &mut dyn PipelineObserver) {
        self.stop_worker();
        self.state = ModelState::Unavailable(reason);
        self.unavailable_reported = false;
        self.report_unavailable(observer);
    }

    /// Emits at most once per load attempt.
    fn report_unavailable(&mut self, observer: &mut dyn PipelineObserver) {
        if self.unavailable_reported {
            return;
        }
        self.unavailable_reported = true;
        let reason = match &self.state {
            ModelState::Unavailable(reason) => reason.clone(),
            _ => "no quality model loaded".to_string(),
        };
        observer.on_event(&PipelineEvent::ModelUnavailable { reason });
    }

    fn stop_worker(&mut self) {
        let state = std::mem::replace(&mut self.state, ModelState::Absent);
        match state {
            ModelState::Worker(worker) => {
                worker.stop();
                // in-flight jobs will never be answered
                self.held_seq = self.next_seq.saturating_sub(1);
                self.answered_seq = self.held_seq;
            }
            other => self.state = other,
        }
    }
}

impl Drop for QualityGate {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
