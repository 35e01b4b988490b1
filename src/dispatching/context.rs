//! Scheduling context for dispatching rule evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Predicted delay attached to a train for one scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayEstimate {
    /// Predicted delay (minutes).
    pub predicted_delay_min: f64,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

impl DelayEstimate {
    pub fn new(predicted_delay_min: f64, confidence: f64) -> Self {
        Self {
            predicted_delay_min,
            confidence,
        }
    }

    /// Expected lateness risk, capped at 2.
    ///
    /// One hour of fully trusted predicted delay counts as risk 1.
    pub fn risk(&self) -> f64 {
        let risk = self.predicted_delay_min.max(0.0) / 60.0 * self.confidence.clamp(0.0, 1.0);
        risk.min(2.0)
    }
}

/// Runtime state passed to dispatching rules.
///
/// Carries the scheduling clock and the per-train delay predictions the
/// predictor produced for this run. Trains without an estimate are treated
/// as risk-free.
///
/// All times are in minutes relative to the scheduling epoch (t=0).
#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    /// Current time (minutes).
    pub current_time_min: i64,
    /// Delay predictions per train (train_id → estimate).
    pub delay_estimates: HashMap<String, DelayEstimate>,
}

impl SchedulingContext {
    /// Creates a context at the given time.
    pub fn at_time(current_time_min: i64) -> Self {
        Self {
            current_time_min,
            ..Default::default()
        }
    }

    /// Attaches a delay prediction to a train.
    pub fn with_estimate(
        mut self,
        train_id: impl Into<String>,
        predicted_delay_min: f64,
        confidence: f64,
    ) -> Self {
        self.delay_estimates.insert(
            train_id.into(),
            DelayEstimate::new(predicted_delay_min, confidence),
        );
        self
    }

    pub fn estimate(&self, train_id: &str) -> Option<&DelayEstimate> {
        self.delay_estimates.get(train_id)
    }

    /// Risk of a train (0 when no prediction was supplied).
    pub fn risk(&self, train_id: &str) -> f64 {
        self.estimate(train_id).map_or(0.0, DelayEstimate::risk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_without_estimate() {
        let ctx = SchedulingContext::at_time(0);
        assert!(ctx.risk("EXP-101").abs() < 1e-10);
    }

    #[test]
    fn test_risk_scaled_by_confidence() {
        let ctx = SchedulingContext::at_time(0).with_estimate("T1", 30.0, 0.5);
        assert!((ctx.risk("T1") - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_risk_capped() {
        let est = DelayEstimate::new(600.0, 1.0);
        assert!((est.risk() - 2.0).abs() < 1e-10);
        assert!(DelayEstimate::new(-20.0, 0.9).risk().abs() < 1e-10);
    }
}
