//! Trained delay model and its training corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceEstimator;
use super::features::{Features, FEATURE_COUNT};
use super::regression::{DelayRegressor, FeatureRow};
use crate::error::{Error, Result};

/// One feature/outcome pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: Features,
    /// Observed delay (minutes).
    pub actual_delay_min: f64,
    /// Sample weight (> 0).
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl TrainingSample {
    pub fn new(features: Features, actual_delay_min: f64) -> Self {
        Self {
            features,
            actual_delay_min,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Ordered collection of training samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingCorpus {
    samples: Vec<TrainingSample>,
}

impl TrainingCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: TrainingSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Deterministic split: every `every`-th sample (0, k, 2k, ...) is held out.
    pub fn split_holdout(&self, every: usize) -> (Vec<&TrainingSample>, Vec<&TrainingSample>) {
        let every = every.max(2);
        self.samples
            .iter()
            .enumerate()
            .fold((Vec::new(), Vec::new()), |(mut train, mut holdout), (i, s)| {
                if i % every == 0 {
                    holdout.push(s);
                } else {
                    train.push(s);
                }
                (train, holdout)
            })
    }

    /// Checks every sample's features and weight.
    pub fn validate(&self) -> Result<()> {
        for sample in &self.samples {
            sample.features.validate()?;
            if !(sample.weight.is_finite() && sample.weight > 0.0) {
                return Err(Error::InvalidInput(format!(
                    "sample weight {} must be positive",
                    sample.weight
                )));
            }
            if !sample.actual_delay_min.is_finite() {
                return Err(Error::InvalidInput("sample delay is not finite".into()));
            }
        }
        Ok(())
    }
}

impl From<Vec<TrainingSample>> for TrainingCorpus {
    fn from(samples: Vec<TrainingSample>) -> Self {
        Self { samples }
    }
}

impl Extend<TrainingSample> for TrainingCorpus {
    fn extend<I: IntoIterator<Item = TrainingSample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

/// Pointer to the active model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Monotonic version number, starting at 1 for the bootstrap model.
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    /// Training samples used (holdout excluded).
    pub samples: usize,
    /// Mean absolute error on the held-out split (minutes).
    pub holdout_mae: f64,
}

/// A fitted regression stage paired with a fitted confidence stage.
///
/// Immutable once built; the predictor swaps whole models.
#[derive(Debug)]
pub struct DelayModel {
    regressor: Box<dyn DelayRegressor>,
    confidence: Box<dyn ConfidenceEstimator>,
    version: ModelVersion,
}

/// Raw model output before clamping and advice.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub delay_min: f64,
    pub confidence: f64,
    pub contributions: FeatureRow,
}

impl DelayModel {
    /// Fits both stages on the training part of `corpus` and scores the
    /// result on the held-out part.
    ///
    /// The stage prototypes are left untouched; their hyperparameters are
    /// carried into the fitted stages.
    pub fn fit(
        regressor: &dyn DelayRegressor,
        confidence: &dyn ConfidenceEstimator,
        corpus: &TrainingCorpus,
        holdout_every: usize,
        version: u32,
    ) -> Result<Self> {
        let (train, holdout) = corpus.split_holdout(holdout_every);
        if train.is_empty() || holdout.is_empty() {
            return Err(Error::InsufficientData {
                available: corpus.len(),
                required: holdout_every.max(2),
            });
        }

        let rows: Vec<FeatureRow> = train.iter().map(|s| s.features.encode()).collect();
        let targets: Vec<f64> = train.iter().map(|s| s.actual_delay_min).collect();
        let weights: Vec<f64> = train.iter().map(|s| s.weight).collect();

        let regressor = regressor.fit(&rows, &targets, &weights)?;
        let predictions: Vec<f64> = rows.iter().map(|r| regressor.predict(r)).collect();
        let residuals: Vec<f64> = targets
            .iter()
            .zip(&predictions)
            .map(|(y, p)| y - p)
            .collect();
        let confidence = confidence.fit(&rows, &predictions, &residuals, &weights)?;

        let mut model = Self {
            regressor,
            confidence,
            version: ModelVersion {
                version,
                trained_at: Utc::now(),
                samples: train.len(),
                holdout_mae: 0.0,
            },
        };
        model.version.holdout_mae = model.mae(&holdout);
        Ok(model)
    }

    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version.version = version;
    }

    pub fn regressor(&self) -> &dyn DelayRegressor {
        self.regressor.as_ref()
    }

    pub fn confidence_estimator(&self) -> &dyn ConfidenceEstimator {
        self.confidence.as_ref()
    }

    /// Evaluates both stages.
    pub fn evaluate(&self, features: &Features) -> ModelOutput {
        let row = features.encode();
        let delay_min = self.regressor.predict(&row);
        ModelOutput {
            delay_min,
            confidence: self.confidence.confidence(&row, delay_min),
            contributions: self.regressor.contributions(&row),
        }
    }

    /// Weighted mean absolute error of the clamped prediction.
    pub fn mae(&self, samples: &[&TrainingSample]) -> f64 {
        let total: f64 = samples.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return f64::INFINITY;
        }
        let err: f64 = samples
            .iter()
            .map(|s| {
                let predicted = self.regressor.predict(&s.features.encode()).max(0.0);
                s.weight * (predicted - s.actual_delay_min).abs()
            })
            .sum();
        err / total
    }
}

/// Indices of the strongest positive contributions, strongest first.
pub fn top_contributions(contributions: &FeatureRow, threshold: f64, limit: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..FEATURE_COUNT)
        .filter(|&j| contributions[j] > threshold)
        .collect();
    idx.sort_by(|&a, &b| contributions[b].total_cmp(&contributions[a]));
    idx.truncate(limit);
    idx
}
