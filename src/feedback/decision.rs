//! Dispatching decisions and their lifecycle.
//!
//! A decision is created `Pending` and moves to `Accepted` or `Rejected`
//! exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl DecisionStatus {
    pub fn is_terminal(self) -> bool {
        self != DecisionStatus::Pending
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Accepted => "accepted",
            DecisionStatus::Rejected => "rejected",
        })
    }
}

/// What a decision asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionCategory {
    /// Let a higher-priority train pass first.
    Priority,
    /// Send a train over an alternative element.
    Routing,
    /// Hold a train.
    Holding,
}

impl DecisionCategory {
    pub const ALL: [DecisionCategory; 3] = [
        DecisionCategory::Priority,
        DecisionCategory::Routing,
        DecisionCategory::Holding,
    ];
}

impl fmt::Display for DecisionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionCategory::Priority => "priority",
            DecisionCategory::Routing => "routing",
            DecisionCategory::Holding => "holding",
        })
    }
}

/// Controller verdict on a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Accept,
    Reject,
}

impl Action {
    /// Terminal status this action leads to.
    pub fn status(self) -> DecisionStatus {
        match self {
            Action::Accept => DecisionStatus::Accepted,
            Action::Reject => DecisionStatus::Rejected,
        }
    }
}

/// A recommendation put before a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub category: DecisionCategory,
    pub train_id: String,
    pub description: String,
    /// Expected delay saving if accepted (minutes).
    pub estimated_saving_min: f64,
    /// Recommender confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Controller that resolved the decision.
    #[serde(default)]
    pub resolved_by: Option<String>,
}

impl Decision {
    /// Creates a pending decision stamped now.
    pub fn new(
        id: impl Into<String>,
        category: DecisionCategory,
        train_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            train_id: train_id.into(),
            description: description.into(),
            estimated_saving_min: 0.0,
            confidence: 0.0,
            status: DecisionStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn with_saving(mut self, minutes: f64) -> Self {
        self.estimated_saving_min = minutes;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == DecisionStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_decision_is_pending() {
        let d = Decision::new("dec-1", DecisionCategory::Priority, "FRT-203", "Hold FRT-203 at A")
            .with_saving(3.0)
            .with_confidence(1.4);
        assert!(d.is_pending());
        assert!((d.confidence - 1.0).abs() < 1e-10);
        assert!(d.resolved_at.is_none());
    }

    #[test]
    fn test_action_status() {
        assert_eq!(Action::Accept.status(), DecisionStatus::Accepted);
        assert_eq!(Action::Reject.status(), DecisionStatus::Rejected);
        assert!(DecisionStatus::Rejected.is_terminal());
        assert!(!DecisionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Action::Accept).unwrap(), r#""accept""#);
        assert_eq!(
            serde_json::to_string(&DecisionCategory::Routing).unwrap(),
            r#""routing""#
        );
        assert_eq!(DecisionStatus::Accepted.to_string(), "accepted");
    }
}
