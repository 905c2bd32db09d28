//! Signal-quality classification: model contract, a loadable model, and the gate that
//! drives inference from the pipeline.

pub mod gate;
pub mod model;

pub use gate::QualityGate;
pub use model::LinearSoftmaxModel;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityClass {
    Bad,
    Acceptable,
    Excellent,
    #[default]
    Unknown,
}

impl QualityClass {
    /// Order of the model's probability outputs.
    pub const OUTPUT_ORDER: [QualityClass; 3] = [
        QualityClass::Bad,
        QualityClass::Acceptable,
        QualityClass::Excellent,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub class: QualityClass,
    /// 0..=100
    pub confidence: f64,
}

impl QualityAssessment {
    /// Argmax over `[Bad, Acceptable, Excellent]`; confidence is the winning probability
    /// as a percentage.
    pub fn from_probabilities(probs: &[f64; 3]) -> Result<Self, QualityError> {
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(QualityError::Inference(format!(
                "non-finite probabilities {probs:?}"
            )));
        }
        let mut best = 0;
        for (i, p) in probs.iter().enumerate().skip(1) {
            if *p > probs[best] {
                best = i;
            }
        }
        Ok(Self {
            class: QualityClass::OUTPUT_ORDER[best],
            confidence: (probs[best] * 100.0).clamp(0.0, 100.0),
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum QualityError {
    #[error("quality model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("model expects {expected} features, pipeline supports {supported}")]
    ArityMismatch { expected: usize, supported: &'static str },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to load model: {0}")]
    Load(String),
}

/// Pretrained classifier consumed as a pure inference function.
///
/// Implementations must be safe to call concurrently from several pipelines.
pub trait QualityModel: Send + Sync {
    /// Width of the feature vector the model was trained on.
    fn input_arity(&self) -> usize;

    /// Probabilities in `[Bad, Acceptable, Excellent]` order.
    fn predict(&self, features: &[f64]) -> Result<[f64; 3], QualityError>;
}

pub type SharedModel = Arc<dyn QualityModel>;
