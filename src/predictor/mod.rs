//! Delay prediction.
//!
//! A two-stage learned estimator: a [`DelayRegressor`] turns features into
//! a predicted delay, a [`ConfidenceEstimator`] says how far to trust it.
//! The stages are independent strategy objects, so either can be replaced
//! or retrained without touching the other.
//!
//! The active [`DelayModel`] sits behind `RwLock<Arc<_>>`. `predict`
//! clones the `Arc` and releases the lock before computing, so it always
//! sees one complete model. `retrain` fits and validates a candidate
//! without holding any lock and only takes the write lock for the swap.
//!
//! # Usage
//!
//! ```
//! use u_rail::predictor::{DelayPredictor, PredictionRequest, PredictorConfig};
//! use u_rail::predictor::Features;
//!
//! let predictor = DelayPredictor::new(PredictorConfig::default()).unwrap();
//! let request = PredictionRequest::new(
//!     Features::default().with_weather(0.7).with_traffic(0.8),
//! );
//! let prediction = predictor.predict(&request).unwrap();
//! assert!(prediction.predicted_delay >= 0.0);
//! assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
//! ```

mod confidence;
mod features;
mod model;
mod regression;
pub mod synthetic;

pub use confidence::{ConfidenceEstimator, LogisticConfidence, MAX_CONFIDENCE, MIN_CONFIDENCE};
pub use features::{
    Features, TrainCategory, CURRENT_DELAY_RANGE, FEATURE_COUNT, FEATURE_LABELS,
    MAX_ROUTE_COMPLEXITY,
};
pub use model::{
    top_contributions, DelayModel, ModelOutput, ModelVersion, TrainingCorpus, TrainingSample,
};
pub use regression::{solve_linear, DelayRegressor, FeatureRow, RidgeRegressor, Standardizer};

use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::dispatching::DelayEstimate;
use crate::error::{Error, Result};

/// Contributions below this many minutes are not reported as factors.
pub const FACTOR_THRESHOLD_MIN: f64 = 0.5;
/// Number of factors reported per prediction.
pub const MAX_FACTORS: usize = 3;
/// Factor label when nothing stands out.
pub const NORMAL_CONDITIONS: &str = "Normal operating conditions";

/// Predictor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Smallest corpus `retrain` accepts.
    pub min_corpus: usize,
    /// Fraction of a corpus held out for validation.
    pub holdout_ratio: f64,
    /// Relative MAE slack a candidate may have over the active model.
    pub validation_tolerance: f64,
    pub ridge_lambda: f64,
    /// Residual (minutes) still counted as an accurate prediction.
    pub confidence_tolerance_min: f64,
    /// Synthetic samples for the initial model.
    pub bootstrap_samples: usize,
    pub bootstrap_seed: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_corpus: 50,
            holdout_ratio: 0.2,
            validation_tolerance: 0.10,
            ridge_lambda: 1.0,
            confidence_tolerance_min: 5.0,
            bootstrap_samples: 1000,
            bootstrap_seed: 42,
        }
    }
}

impl PredictorConfig {
    pub fn with_min_corpus(mut self, min_corpus: usize) -> Self {
        self.min_corpus = min_corpus;
        self
    }

    pub fn with_holdout_ratio(mut self, ratio: f64) -> Self {
        self.holdout_ratio = ratio;
        self
    }

    pub fn with_validation_tolerance(mut self, tolerance: f64) -> Self {
        self.validation_tolerance = tolerance;
        self
    }

    pub fn with_bootstrap(mut self, samples: usize, seed: u64) -> Self {
        self.bootstrap_samples = samples;
        self.bootstrap_seed = seed;
        self
    }

    /// Every `holdout_every()`-th sample is held out.
    pub fn holdout_every(&self) -> usize {
        ((1.0 / self.holdout_ratio).round() as usize).max(2)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.holdout_ratio > 0.0 && self.holdout_ratio <= 0.5) {
            return Err(Error::InvalidConfig(format!(
                "holdout_ratio {} outside (0, 0.5]",
                self.holdout_ratio
            )));
        }
        if !(self.validation_tolerance.is_finite() && self.validation_tolerance >= 0.0) {
            return Err(Error::InvalidConfig(
                "validation_tolerance must be non-negative".into(),
            ));
        }
        if !(self.ridge_lambda.is_finite() && self.ridge_lambda > 0.0) {
            return Err(Error::InvalidConfig("ridge_lambda must be positive".into()));
        }
        if !(self.confidence_tolerance_min.is_finite() && self.confidence_tolerance_min > 0.0) {
            return Err(Error::InvalidConfig(
                "confidence_tolerance_min must be positive".into(),
            ));
        }
        if self.min_corpus < self.holdout_every() {
            return Err(Error::InvalidConfig(format!(
                "min_corpus {} cannot fill a holdout split",
                self.min_corpus
            )));
        }
        if self.bootstrap_samples < self.holdout_every() {
            return Err(Error::InvalidConfig(format!(
                "bootstrap_samples {} cannot fill a holdout split",
                self.bootstrap_samples
            )));
        }
        Ok(())
    }
}

/// Prediction request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_id: Option<String>,
    #[serde(flatten)]
    pub features: Features,
    /// Candidate element ids for route advice, most preferred first.
    #[serde(default)]
    pub alternatives: Vec<String>,
}

impl PredictionRequest {
    pub fn new(features: Features) -> Self {
        Self {
            train_id: None,
            features,
            alternatives: Vec::new(),
        }
    }

    pub fn for_train(mut self, train_id: impl Into<String>) -> Self {
        self.train_id = Some(train_id.into());
        self
    }

    pub fn with_alternatives<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives = alternatives.into_iter().map(Into::into).collect();
        self
    }
}

/// Prediction response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_id: Option<String>,
    /// Predicted delay (minutes, >= 0).
    pub predicted_delay: f64,
    /// Confidence in (0, 1].
    pub confidence: f64,
    /// Recommended element id, if any.
    pub optimal_route: Option<String>,
    /// Contributing factors, strongest first.
    pub factors: Vec<String>,
    pub recommendation: String,
    /// Version of the model that produced this prediction.
    pub model_version: u32,
    /// Decision recorded for this prediction, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
}

impl Prediction {
    pub fn estimate(&self) -> DelayEstimate {
        DelayEstimate::new(self.predicted_delay, self.confidence)
    }
}

/// Picks an alternative element by delay band.
///
/// Under 5 minutes the current route is kept. Bands `< 10`, `< 20` and
/// beyond map to the first, second and third alternative, clamped to the
/// list length.
pub fn recommend_route(delay_min: f64, alternatives: &[String]) -> Option<String> {
    if delay_min < 5.0 || alternatives.is_empty() {
        return None;
    }
    let band = if delay_min < 10.0 {
        0
    } else if delay_min < 20.0 {
        1
    } else {
        2
    };
    alternatives
        .get(band.min(alternatives.len() - 1))
        .cloned()
}

/// Dispatcher advice text for a predicted delay.
pub fn recommendation_text(delay_min: f64, route: Option<&str>) -> String {
    let route = route.unwrap_or("alternative");
    if delay_min < 5.0 {
        "Maintain current schedule".to_string()
    } else if delay_min < 15.0 {
        format!("Consider route {route} to minimize delay")
    } else if delay_min < 30.0 {
        format!("Reroute via {route} - significant delay expected")
    } else {
        "Emergency action required - consider holding train".to_string()
    }
}

/// Serves predictions from the active model and retrains it.
#[derive(Debug)]
pub struct DelayPredictor {
    config: PredictorConfig,
    regressor: RidgeRegressor,
    confidence: LogisticConfidence,
    active: RwLock<Arc<DelayModel>>,
}

impl DelayPredictor {
    /// Creates a predictor with a model trained on the synthetic bootstrap
    /// corpus.
    pub fn new(config: PredictorConfig) -> Result<Self> {
        config.validate()?;
        let regressor = RidgeRegressor::new(config.ridge_lambda);
        let confidence = LogisticConfidence::new(config.confidence_tolerance_min);
        let corpus: TrainingCorpus =
            synthetic::generate(config.bootstrap_samples, config.bootstrap_seed)?.into();
        let model = DelayModel::fit(&regressor, &confidence, &corpus, config.holdout_every(), 1)?;
        info!(
            "bootstrap delay model v1: {} samples, holdout MAE {:.2} min",
            model.version().samples,
            model.version().holdout_mae
        );
        Ok(Self {
            config,
            regressor,
            confidence,
            active: RwLock::new(Arc::new(model)),
        })
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// The active model. The returned handle stays valid across swaps.
    pub fn model(&self) -> Arc<DelayModel> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn active_version(&self) -> ModelVersion {
        self.model().version().clone()
    }

    /// Predicts the delay for a request.
    ///
    /// # Errors
    /// [`Error::InvalidFeature`] if a feature is outside its domain.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        request.features.validate()?;
        let model = self.model();
        let output = model.evaluate(&request.features);

        let predicted_delay = output.delay_min.max(0.0);
        let factors = {
            let top = top_contributions(&output.contributions, FACTOR_THRESHOLD_MIN, MAX_FACTORS);
            if top.is_empty() {
                vec![NORMAL_CONDITIONS.to_string()]
            } else {
                top.into_iter().map(|j| FEATURE_LABELS[j].to_string()).collect()
            }
        };
        let optimal_route = recommend_route(predicted_delay, &request.alternatives);
        let recommendation = recommendation_text(predicted_delay, optimal_route.as_deref());

        Ok(Prediction {
            train_id: request.train_id.clone(),
            predicted_delay,
            confidence: output.confidence,
            optimal_route,
            factors,
            recommendation,
            model_version: model.version().version,
            decision_id: None,
        })
    }

    /// Retrains on `corpus` and swaps the model in if it validates.
    ///
    /// The candidate and the active model are both scored on the
    /// candidate's held-out split. On any failure the active model keeps
    /// serving.
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] below `min_corpus` samples
    /// - [`Error::ModelRejected`] if the candidate's holdout MAE exceeds the
    ///   active MAE by more than `validation_tolerance`
    pub fn retrain(&self, corpus: &TrainingCorpus) -> Result<ModelVersion> {
        if corpus.len() < self.config.min_corpus {
            return Err(Error::InsufficientData {
                available: corpus.len(),
                required: self.config.min_corpus,
            });
        }
        corpus.validate()?;

        let every = self.config.holdout_every();
        let mut candidate = DelayModel::fit(&self.regressor, &self.confidence, corpus, every, 0)?;

        let (_, holdout) = corpus.split_holdout(every);
        let active_mae = self.model().mae(&holdout);
        let candidate_mae = candidate.version().holdout_mae;
        if !candidate_mae.is_finite()
            || candidate_mae > active_mae * (1.0 + self.config.validation_tolerance)
        {
            warn!(
                "retrained delay model rejected: holdout MAE {candidate_mae:.2} vs active {active_mae:.2}"
            );
            return Err(Error::ModelRejected {
                candidate_mae,
                active_mae,
            });
        }

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        candidate.set_version(active.version().version + 1);
        let version = candidate.version().clone();
        *active = Arc::new(candidate);
        drop(active);

        info!(
            "delay model v{} active: {} samples, holdout MAE {:.2} (previous {:.2})",
            version.version, version.samples, version.holdout_mae, active_mae
        );
        Ok(version)
    }

    /// Runs [`retrain`](Self::retrain) on a background thread.
    pub fn spawn_retrain(
        self: &Arc<Self>,
        corpus: TrainingCorpus,
    ) -> JoinHandle<Result<ModelVersion>> {
        let predictor = Arc::clone(self);
        thread::spawn(move || predictor.retrain(&corpus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> PredictorConfig {
        PredictorConfig::default().with_bootstrap(400, 42)
    }

    fn shifted_corpus(n: usize, seed: u64, shift: f64) -> TrainingCorpus {
        synthetic::generate(n, seed)
            .unwrap()
            .into_iter()
            .map(|s| {
                let delay = s.actual_delay_min + shift;
                TrainingSample::new(s.features, delay)
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_prediction_example() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        let request = PredictionRequest::new(Features::default().with_weather(0.7).with_traffic(0.8));
        let p = predictor.predict(&request).unwrap();
        assert!(p.predicted_delay >= 0.0);
        assert!(p.confidence > 0.0 && p.confidence <= 1.0);
        assert!(!p.factors.is_empty() && p.factors.len() <= MAX_FACTORS);
        assert_eq!(p.model_version, 1);
    }

    #[test]
    fn test_bad_weather_is_a_factor() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        let request = PredictionRequest::new(Features::default().with_weather(1.0));
        let p = predictor.predict(&request).unwrap();
        assert!(p.factors.iter().any(|f| f == "Weather conditions"));
    }

    #[test]
    fn test_invalid_feature_rejected() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        let request = PredictionRequest::new(Features::default().with_weather(1.5));
        assert!(matches!(
            predictor.predict(&request).unwrap_err(),
            Error::InvalidFeature { feature: "weather", .. }
        ));
    }

    #[test]
    fn test_route_advice_bands() {
        let alts: Vec<String> = vec!["B1".into(), "B2".into(), "B3".into()];
        assert_eq!(recommend_route(3.0, &alts), None);
        assert_eq!(recommend_route(7.0, &alts).as_deref(), Some("B1"));
        assert_eq!(recommend_route(12.0, &alts).as_deref(), Some("B2"));
        assert_eq!(recommend_route(45.0, &alts).as_deref(), Some("B3"));
        assert_eq!(recommend_route(45.0, &alts[..1]).as_deref(), Some("B1"));
        assert_eq!(recommend_route(45.0, &[]), None);
    }

    #[test]
    fn test_recommendation_text() {
        assert_eq!(recommendation_text(2.0, None), "Maintain current schedule");
        assert_eq!(
            recommendation_text(8.0, Some("B2")),
            "Consider route B2 to minimize delay"
        );
        assert_eq!(
            recommendation_text(20.0, Some("B3")),
            "Reroute via B3 - significant delay expected"
        );
        assert!(recommendation_text(31.0, None).starts_with("Emergency"));
    }

    #[test]
    fn test_retrain_insufficient_data() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        let err = predictor.retrain(&shifted_corpus(10, 1, 0.0)).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientData {
                available: 10,
                required: 50
            }
        );
        assert_eq!(predictor.active_version().version, 1);
    }

    #[test]
    fn test_retrain_swaps_better_model() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        // a new regime the bootstrap model knows nothing about
        let version = predictor.retrain(&shifted_corpus(300, 9, 40.0)).unwrap();
        assert_eq!(version.version, 2);
        assert_eq!(predictor.active_version(), version);
    }

    #[test]
    fn test_retrain_rejects_worse_model() {
        let predictor = DelayPredictor::new(small_config()).unwrap();
        let every = predictor.config().holdout_every();
        // training rows are corrupted, held-out rows are not
        let samples: Vec<TrainingSample> = synthetic::generate(300, 11)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                if i % every == 0 {
                    s
                } else {
                    TrainingSample::new(s.features, 500.0)
                }
            })
            .collect();

        let err = predictor.retrain(&samples.into()).unwrap_err();
        assert!(matches!(err, Error::ModelRejected { .. }));
        assert_eq!(predictor.active_version().version, 1);
    }

    #[test]
    fn test_predict_during_background_retrain() {
        let predictor = Arc::new(DelayPredictor::new(small_config()).unwrap());
        let handle = predictor.spawn_retrain(shifted_corpus(300, 5, 40.0));

        let request = PredictionRequest::new(Features::default().with_weather(0.3));
        let mut versions = Vec::new();
        for _ in 0..20 {
            let p = predictor.predict(&request).unwrap();
            versions.push(p.model_version);
        }
        let version = handle.join().unwrap().unwrap();

        assert!(versions.iter().all(|v| *v == 1 || *v == 2));
        assert!(versions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(version.version, 2);
        assert_eq!(predictor.predict(&request).unwrap().model_version, 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(PredictorConfig::default().validate().is_ok());
        assert_eq!(PredictorConfig::default().holdout_every(), 5);
        assert!(PredictorConfig::default().with_holdout_ratio(0.0).validate().is_err());
        assert!(PredictorConfig::default().with_min_corpus(1).validate().is_err());
        assert!(DelayPredictor::new(PredictorConfig::default().with_bootstrap(1, 0)).is_err());
    }

    #[test]
    fn test_request_payload_shape() {
        let json = r#"{"train_id":"EXP-101","weather":0.7,"traffic_density":0.8,"alternatives":["B"]}"#;
        let request: PredictionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.train_id.as_deref(), Some("EXP-101"));
        assert!((request.features.weather - 0.7).abs() < 1e-10);
        assert_eq!(request.alternatives, vec!["B"]);
    }
}
