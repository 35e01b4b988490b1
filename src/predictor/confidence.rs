//! Confidence stage: how far to trust a predicted delay.
//!
//! [`LogisticConfidence`] is a logistic classifier for the event "the
//! regression error is within `tolerance_min` minutes". Its probability
//! is the reported confidence, kept inside `[0.05, 0.99]` so a prediction
//! is never presented as certain or worthless.
//!
//! # Reference
//! Bishop (2006), "Pattern Recognition and Machine Learning", Ch. 4.3.2

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::features::FEATURE_COUNT;
use super::regression::{FeatureRow, Standardizer};
use crate::error::{Error, Result};

/// Lowest reported confidence.
pub const MIN_CONFIDENCE: f64 = 0.05;
/// Highest reported confidence.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Strategy for the confidence stage.
///
/// Like [`DelayRegressor`](super::DelayRegressor), fitting returns a new
/// instance and leaves the receiver untouched.
pub trait ConfidenceEstimator: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Fits on rows, the regressor's predictions and its residuals.
    fn fit(
        &self,
        rows: &[FeatureRow],
        predictions: &[f64],
        residuals: &[f64],
        weights: &[f64],
    ) -> Result<Box<dyn ConfidenceEstimator>>;

    /// Confidence in `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
    fn confidence(&self, row: &FeatureRow, predicted: f64) -> f64;
}

const INPUTS: usize = FEATURE_COUNT + 1;

/// Logistic classifier trained by full-batch gradient descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfidence {
    tolerance_min: f64,
    epochs: usize,
    learning_rate: f64,
    l2: f64,
    standardizer: Standardizer,
    weights: [f64; INPUTS],
    bias: f64,
}

impl LogisticConfidence {
    /// Creates an unfitted estimator (confidence 0.5).
    pub fn new(tolerance_min: f64) -> Self {
        Self {
            tolerance_min,
            epochs: 300,
            learning_rate: 0.5,
            l2: 1e-3,
            standardizer: Standardizer::default(),
            weights: [0.0; INPUTS],
            bias: 0.0,
        }
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn tolerance_min(&self) -> f64 {
        self.tolerance_min
    }

    fn inputs(&self, row: &FeatureRow, predicted: f64) -> [f64; INPUTS] {
        let z = self.standardizer.transform(row);
        let mut x = [0.0; INPUTS];
        x[..FEATURE_COUNT].copy_from_slice(&z);
        // large predictions are harder to hit within a fixed tolerance
        x[FEATURE_COUNT] = predicted.abs() / 30.0;
        x
    }

    fn probability(&self, x: &[f64; INPUTS]) -> f64 {
        let logit = self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
        sigmoid(logit)
    }
}

impl Default for LogisticConfidence {
    fn default() -> Self {
        Self::new(5.0)
    }
}

impl ConfidenceEstimator for LogisticConfidence {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn fit(
        &self,
        rows: &[FeatureRow],
        predictions: &[f64],
        residuals: &[f64],
        weights: &[f64],
    ) -> Result<Box<dyn ConfidenceEstimator>> {
        let n = rows.len();
        if predictions.len() != n || residuals.len() != n || weights.len() != n {
            return Err(Error::InvalidInput(
                "confidence inputs have different lengths".into(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if n == 0 || total <= 0.0 {
            return Err(Error::InsufficientData {
                available: n,
                required: 1,
            });
        }

        let mut model = Self {
            standardizer: Standardizer::fit(rows, weights),
            weights: [0.0; INPUTS],
            bias: 0.0,
            ..self.clone()
        };
        let inputs: Vec<[f64; INPUTS]> = rows
            .iter()
            .zip(predictions)
            .map(|(row, &p)| model.inputs(row, p))
            .collect();
        let labels: Vec<f64> = residuals
            .iter()
            .map(|r| if r.abs() <= self.tolerance_min { 1.0 } else { 0.0 })
            .collect();

        for _ in 0..self.epochs {
            let mut grad = [0.0; INPUTS];
            let mut grad_bias = 0.0;
            for ((x, &y), &w) in inputs.iter().zip(&labels).zip(weights) {
                let err = model.probability(x) - y;
                grad_bias += w * err;
                for j in 0..INPUTS {
                    grad[j] += w * err * x[j];
                }
            }
            model.bias -= self.learning_rate * grad_bias / total;
            for j in 0..INPUTS {
                model.weights[j] -=
                    self.learning_rate * (grad[j] / total + self.l2 * model.weights[j]);
            }
        }

        Ok(Box::new(model))
    }

    fn confidence(&self, row: &FeatureRow, predicted: f64) -> f64 {
        let p = self.probability(&self.inputs(row, predicted));
        if p.is_finite() {
            p.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        } else {
            MIN_CONFIDENCE
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
