//! Append-only feedback records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{Action, DecisionCategory};
use crate::error::{Error, Result};
use crate::predictor::Features;

/// Controller input accompanying a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub controller_id: String,
    /// Satisfaction score in [0, 1].
    pub score: f64,
    #[serde(default)]
    pub context: String,
}

impl Feedback {
    pub fn new(controller_id: impl Into<String>, score: f64) -> Self {
        Self {
            controller_id: controller_id.into(),
            score,
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_score(self.score)
    }
}

pub(crate) fn validate_score(score: f64) -> Result<()> {
    if (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "feedback score {score} outside [0, 1]"
        )))
    }
}

/// One controller resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub decision_id: String,
    pub category: DecisionCategory,
    pub action: Action,
    pub controller_id: String,
    pub score: f64,
    pub context: String,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn is_accept(&self) -> bool {
        self.action == Action::Accept
    }
}

/// What actually happened after a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub decision_id: String,
    pub actual_delay_min: f64,
    pub predicted_delay_min: f64,
    pub time_saved_min: f64,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn prediction_error_min(&self) -> f64 {
        (self.actual_delay_min - self.predicted_delay_min).abs()
    }
}

/// Feedback on one model output, reusable as a training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFeedbackRecord {
    /// Model that produced the prediction (e.g. "delay").
    pub model_kind: String,
    pub features: Features,
    pub predicted_delay_min: f64,
    pub actual_delay_min: f64,
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ModelFeedbackRecord {
    pub fn abs_error(&self) -> f64 {
        (self.actual_delay_min - self.predicted_delay_min).abs()
    }
}

/// Error-rate analytics for one model kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model_kind: String,
    pub records: usize,
    /// Mean feedback score (0 with no records).
    pub mean_score: f64,
    /// Mean absolute prediction error in minutes (0 with no records).
    pub mean_abs_error_min: f64,
}

impl ModelPerformance {
    pub(crate) fn from_records<'a, I>(model_kind: &str, records: I) -> Self
    where
        I: IntoIterator<Item = &'a ModelFeedbackRecord>,
    {
        let (count, score, error) = records
            .into_iter()
            .filter(|r| r.model_kind == model_kind)
            .fold((0usize, 0.0, 0.0), |(n, s, e), r| {
                (n + 1, s + r.score, e + r.abs_error())
            });
        let mean = |total: f64| if count > 0 { total / count as f64 } else { 0.0 };
        Self {
            model_kind: model_kind.to_string(),
            records: count,
            mean_score: mean(score),
            mean_abs_error_min: mean(error),
        }
    }
}
