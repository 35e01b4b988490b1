//! Error taxonomy.
//!
//! Validation failures (unknown route element, out-of-domain feature,
//! unknown decision) carry the offending identifier and are never retried.
//! Budget exhaustion is not an error: solvers return their incumbent with
//! an explicit unresolved-conflict count instead.

use thiserror::Error;

use crate::feedback::DecisionStatus;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the dispatching core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A train's route names an element that is not in the network.
    #[error("route of train '{train_id}' references unknown element '{element_id}'")]
    InvalidRoute {
        train_id: String,
        element_id: String,
    },

    /// No entry time within the horizon satisfies the hard constraints.
    #[error(
        "no feasible schedule within {horizon_min} min: train '{train_id}' cannot enter '{element_id}'{}",
        blocking_suffix(.blocking_train_id)
    )]
    InfeasibleSchedule {
        element_id: String,
        train_id: String,
        blocking_train_id: Option<String>,
        horizon_min: i64,
    },

    /// A numeric prediction feature lies outside its declared domain.
    #[error("feature '{feature}' = {value} is outside [{min}, {max}]")]
    InvalidFeature {
        feature: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Retraining corpus below the minimum size.
    #[error("training corpus has {available} samples, at least {required} required")]
    InsufficientData { available: usize, required: usize },

    /// Retrained model did worse than the active one on the held-out split.
    #[error("retrained model rejected: holdout MAE {candidate_mae:.3} vs active {active_mae:.3}")]
    ModelRejected { candidate_mae: f64, active_mae: f64 },

    #[error("unknown decision '{0}'")]
    UnknownDecision(String),

    /// The decision already left the pending state.
    #[error("decision '{decision_id}' is already {status}")]
    AlreadyResolved {
        decision_id: String,
        status: DecisionStatus,
    },

    #[error("decision '{0}' is already recorded")]
    DuplicateDecision(String),

    /// Structural input problem (duplicate ids, empty route, zero capacity, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

fn blocking_suffix(blocking: &Option<String>) -> String {
    match blocking {
        Some(id) => format!(" (blocked by train '{id}')"),
        None => String::new(),
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infeasible_message_names_blocker() {
        let err = Error::InfeasibleSchedule {
            element_id: "A".into(),
            train_id: "FRT-203".into(),
            blocking_train_id: Some("EXP-101".into()),
            horizon_min: 120,
        };
        let msg = err.to_string();
        assert!(msg.contains("'A'"));
        assert!(msg.contains("FRT-203"));
        assert!(msg.contains("blocked by train 'EXP-101'"));
    }

    #[test]
    fn test_infeasible_message_without_blocker() {
        let err = Error::InfeasibleSchedule {
            element_id: "A".into(),
            train_id: "T1".into(),
            blocking_train_id: None,
            horizon_min: 10,
        };
        assert!(!err.to_string().contains("blocked"));
    }

    #[test]
    fn test_already_resolved_message() {
        let err = Error::AlreadyResolved {
            decision_id: "dec-1".into(),
            status: DecisionStatus::Accepted,
        };
        assert_eq!(err.to_string(), "decision 'dec-1' is already accepted");
    }
}
