//! Weighted-delay objective.
//!
//! # Formula
//!
//! ```text
//! objective = Σ_t w(t) · delay(t) + penalty · unresolved
//! w(t)      = class_weight(priority(t)) · (1 + risk_weight · risk(t))
//! ```
//!
//! `delay(t)` is the arrival delay of train `t` against its unconstrained
//! earliest times, and `risk(t)` comes from the delay predictor via the
//! [`SchedulingContext`]. Lower-class trains carry smaller weights, so
//! they absorb delay first.

use serde::{Deserialize, Serialize};

use crate::dispatching::SchedulingContext;
use crate::models::{Priority, Train};

/// Objective coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    /// Weight of a freight-class delay minute.
    pub low: f64,
    /// Weight of a local-class delay minute.
    pub medium: f64,
    /// Weight of an express-class delay minute.
    pub high: f64,
    /// Penalty per unresolved conflict.
    pub conflict_penalty: f64,
    /// Scale of the predicted-risk surcharge.
    pub risk_weight: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 2.0,
            high: 3.0,
            conflict_penalty: 100.0,
            risk_weight: 0.5,
        }
    }
}

impl ObjectiveWeights {
    /// Weight of a priority class.
    pub fn class_weight(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
        }
    }

    /// Delay weight of one train, including its predicted risk.
    pub fn train_weight(&self, train: &Train, context: &SchedulingContext) -> f64 {
        self.class_weight(train.priority) * (1.0 + self.risk_weight * context.risk(&train.id))
    }

    /// Evaluates the objective from per-train delays.
    ///
    /// `delays_min` yields one delay per entry of `weights`, in order.
    pub fn evaluate<I>(&self, delays_min: I, weights: &[f64], unresolved: usize) -> f64
    where
        I: IntoIterator<Item = i64>,
    {
        let weighted: f64 = delays_min
            .into_iter()
            .zip(weights)
            .map(|(d, &w)| w * d.max(0) as f64)
            .sum();
        weighted + self.conflict_penalty * unresolved as f64
    }

    pub fn with_class_weights(mut self, low: f64, medium: f64, high: f64) -> Self {
        self.low = low;
        self.medium = medium;
        self.high = high;
        self
    }

    pub fn with_conflict_penalty(mut self, penalty: f64) -> Self {
        self.conflict_penalty = penalty;
        self
    }

    pub fn with_risk_weight(mut self, risk_weight: f64) -> Self {
        self.risk_weight = risk_weight;
        self
    }
}
