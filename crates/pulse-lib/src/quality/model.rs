use super::{QualityError, QualityModel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standardise → linear layer → softmax over `[Bad, Acceptable, Excellent]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSoftmaxModel {
    pub input_arity: usize,
    pub feature_mean: Vec<f64>,
    pub feature_scale: Vec<f64>,
    /// One row of `input_arity` weights per class.
    pub weights: [Vec<f64>; 3],
    pub bias: [f64; 3],
}

impl LinearSoftmaxModel {
    pub fn from_json_str(text: &str) -> Result<Self, QualityError> {
        let model: LinearSoftmaxModel =
            serde_json::from_str(text).map_err(|e| QualityError::Load(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, QualityError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| QualityError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), QualityError> {
        let n = self.input_arity;
        if n == 0 {
            return Err(QualityError::Load("input_arity must be positive".into()));
        }
        if self.feature_mean.len() != n || self.feature_scale.len() != n {
            return Err(QualityError::Load(format!(
                "normalisation vectors must have {n} entries"
            )));
        }
        if self.weights.iter().any(|row| row.len() != n) {
            return Err(QualityError::Load(format!(
                "every weight row must have {n} entries"
            )));
        }
        let all_finite = self
            .feature_mean
            .iter()
            .chain(&self.feature_scale)
            .chain(self.weights.iter().flatten())
            .chain(&self.bias)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(QualityError::Load("parameters must be finite".into()));
        }
        Ok(())
    }
}

impl QualityModel for LinearSoftmaxModel {
    fn input_arity(&self) -> usize {
        self.input_arity
    }

    fn predict(&self, features: &[f64]) -> Result<[f64; 3], QualityError> {
        if features.len() != self.input_arity {
            return Err(QualityError::Inference(format!(
                "expected {} features, got {}",
                self.input_arity,
                features.len()
            )));
        }
        let standardized: Vec<f64> = features
            .iter()
            .zip(self.feature_mean.iter().zip(&self.feature_scale))
            .map(|(x, (m, s))| {
                let scale = if s.abs() > f64::EPSILON { *s } else { 1.0 };
                (x - m) / scale
            })
            .collect();
        let mut logits = [0.0; 3];
        for (k, logit) in logits.iter_mut().enumerate() {
            *logit = self.bias[k]
                + self.weights[k]
                    .iter()
                    .zip(&standardized)
                    .map(|(w, x)| w * x)
                    .sum::<f64>();
        }
        Ok(softmax(logits))
    }
}

fn softmax(logits: [f64; 3]) -> [f64; 3] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = logits.map(|l| (l - max).exp());
    let total: f64 = exp.iter().sum();
    exp.map(|e| e / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bias_only(arity: usize, bias: [f64; 3]) -> LinearSoftmaxModel {
        LinearSoftmaxModel {
            input_arity: arity,
            feature_mean: vec![0.0; arity],
            feature_scale: vec![1.0; arity],
            weights: [vec![0.0; arity], vec![0.0; arity], vec![0.0; arity]],
            bias,
        }
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax([1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn bias_decides_when_weights_are_zero() {
        let model = bias_only(10, [0.0, 0.0, 2.0]);
        let p = model.predict(&[5.0; 10]).unwrap();
        assert!(p[2] > 0.7);
    }

    #[test]
    fn weights_follow_standardized_features() {
        let mut model = bias_only(8, [0.0; 3]);
        model.feature_mean[1] = 1.0;
        model.feature_scale[1] = 0.5;
        model.weights[0][1] = -3.0;
        model.weights[2][1] = 3.0;
        let mut features = vec![0.0; 8];
        features[1] = 2.0;
        let p = model.predict(&features).unwrap();
        assert!(p[2] > 0.99);
        features[1] = 0.0;
        let p = model.predict(&features).unwrap();
        assert!(p[0] > 0.99);
    }

    #[test]
    fn wrong_feature_count_is_inference_error() {
        let model = bias_only(10, [0.0; 3]);
        assert!(matches!(
            model.predict(&[0.0; 8]),
            Err(QualityError::Inference(_))
        ));
    }

    #[test]
    fn json_shape_is_validated() {
        let good = serde_json::to_string(&bias_only(8, [0.1, 0.2, 0.3])).unwrap();
        assert_eq!(LinearSoftmaxModel::from_json_str(&good).unwrap().input_arity, 8);

        let mut bad = bias_only(8, [0.0; 3]);
        bad.weights[1].pop();
        let bad = serde_json::to_string(&bad).unwrap();
        assert!(matches!(
            LinearSoftmaxModel::from_json_str(&bad),
            Err(QualityError::Load(_))
        ));
        assert!(LinearSoftmaxModel::from_json_str("{").is_err());
    }
}
