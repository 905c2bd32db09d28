//! Statistical features of the raw pulse window, fed to the quality classifier.
//!
//! Order is fixed:
//! `[mean, std, skewness, kurtosis, range, zero_crossings, rms, snr, peak_count, mad]`.
//! Eight-input models take the first eight.

use serde::{Deserialize, Serialize};

/// Guards denominators built from the standard deviation.
pub const FEATURE_EPSILON: f64 = 1e-7;

/// Input width a quality model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureArity {
    Eight,
    Ten,
}

impl FeatureArity {
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            8 => Some(FeatureArity::Eight),
            10 => Some(FeatureArity::Ten),
            _ => None,
        }
    }

    pub fn len(self) -> usize {
        match self {
            FeatureArity::Eight => 8,
            FeatureArity::Ten => 10,
        }
    }
}

pub const FEATURE_NAMES: [&str; 10] = [
    "mean",
    "std",
    "skewness",
    "kurtosis",
    "range",
    "zero_crossings",
    "rms",
    "snr",
    "peak_count",
    "mad",
];

/// Build the feature vector for `data`; its length is always `arity.len()`.
pub fn extract_features(data: &[f64], arity: FeatureArity) -> Vec<f64> {
    let mut out = Vec::with_capacity(arity.len());
    if data.is_empty() {
        out.resize(arity.len(), 0.0);
        return out;
    }
    let n = data.len() as f64;
    let mean = data.iter().copied().sum::<f64>() / n;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m3 = data.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;
    let std = m2.sqrt();
    let guarded = std + FEATURE_EPSILON;
    let skewness = m3 / guarded.powi(3);
    let kurtosis = m4 / guarded.powi(4);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
    let snr = mean / guarded;

    out.extend_from_slice(&[
        mean,
        std,
        skewness,
        kurtosis,
        max - min,
        zero_crossings(data) as f64,
        rms,
        snr,
    ]);
    if arity == FeatureArity::Ten {
        let mad = data.iter().map(|x| (x - mean).abs()).sum::<f64>() / n;
        out.push(peak_count(data) as f64);
        out.push(mad);
    }
    out
}

fn zero_crossings(data: &[f64]) -> usize {
    data.windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count()
}

fn peak_count(data: &[f64]) -> usize {
    data.windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count()
}
