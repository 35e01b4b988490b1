//! Shared decision and feedback state.
//!
//! Each decision lives in its own `Arc<Mutex<_>>` slot. The id map is only
//! write-locked to add slots, so resolutions of different decisions never
//! contend, and resolutions of one decision are serialized by its mutex:
//! the first caller moves it out of `Pending`, every later caller sees a
//! terminal status and fails with [`Error::AlreadyResolved`].
//!
//! Record logs are append-only. Poisoned locks are recovered: every
//! critical section leaves the data consistent before it can panic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::analytics::{aggregate, Analytics, Window};
use super::decision::{Action, Decision, DecisionCategory};
use super::record::{
    validate_score, Feedback, FeedbackRecord, ModelFeedbackRecord, ModelPerformance,
    OutcomeRecord,
};
use crate::error::{Error, Result};
use crate::predictor::{Features, ModelVersion, TrainingCorpus, TrainingSample};

/// Persisted layout of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub decisions: Vec<Decision>,
    pub feedback: Vec<FeedbackRecord>,
    pub outcomes: Vec<OutcomeRecord>,
    pub model_feedback: Vec<ModelFeedbackRecord>,
    pub model_version: Option<ModelVersion>,
}

type Slot = Arc<Mutex<Decision>>;

/// Decision feedback store.
#[derive(Debug, Default)]
pub struct FeedbackStore {
    decisions: RwLock<HashMap<String, Slot>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
    outcomes: RwLock<Vec<OutcomeRecord>>,
    model_feedback: RwLock<Vec<ModelFeedbackRecord>>,
    model_version: RwLock<Option<ModelVersion>>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending decision.
    ///
    /// # Errors
    /// - [`Error::DuplicateDecision`] if the id is taken
    /// - [`Error::InvalidInput`] if the decision is not pending
    pub fn record(&self, decision: Decision) -> Result<()> {
        if !decision.is_pending() {
            return Err(Error::InvalidInput(format!(
                "decision '{}' must be recorded as pending",
                decision.id
            )));
        }
        let mut decisions = self.decisions.write().unwrap_or_else(PoisonError::into_inner);
        if decisions.contains_key(&decision.id) {
            return Err(Error::DuplicateDecision(decision.id));
        }
        debug!(
            "recorded {} decision '{}' for train '{}'",
            decision.category, decision.id, decision.train_id
        );
        decisions.insert(decision.id.clone(), Arc::new(Mutex::new(decision)));
        Ok(())
    }

    /// Resolves a pending decision and appends the feedback record.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] for a score outside [0, 1]
    /// - [`Error::UnknownDecision`] if the id is absent
    /// - [`Error::AlreadyResolved`] if the decision is not pending
    pub fn resolve(
        &self,
        decision_id: &str,
        action: Action,
        feedback: Feedback,
    ) -> Result<FeedbackRecord> {
        feedback.validate()?;
        let slot = self
            .slot(decision_id)
            .ok_or_else(|| Error::UnknownDecision(decision_id.to_string()))?;

        let mut decision = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if decision.status.is_terminal() {
            warn!(
                "decision '{decision_id}' already {}; {} by '{}' ignored",
                decision.status, action_verb(action), feedback.controller_id
            );
            return Err(Error::AlreadyResolved {
                decision_id: decision_id.to_string(),
                status: decision.status,
            });
        }

        let now = Utc::now();
        decision.status = action.status();
        decision.resolved_at = Some(now);
        decision.resolved_by = Some(feedback.controller_id.clone());

        let record = FeedbackRecord {
            decision_id: decision_id.to_string(),
            category: decision.category,
            action,
            controller_id: feedback.controller_id,
            score: feedback.score,
            context: feedback.context,
            recorded_at: now,
        };
        // appended under the decision lock so the log order matches resolution order
        self.feedback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        debug!("decision '{decision_id}' {}", decision.status);
        Ok(record)
    }

    fn slot(&self, decision_id: &str) -> Option<Slot> {
        self.decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(decision_id)
            .cloned()
    }

    pub fn decision(&self, decision_id: &str) -> Option<Decision> {
        self.slot(decision_id)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// All decisions, oldest first.
    pub fn decisions(&self) -> Vec<Decision> {
        let slots: Vec<Slot> = self
            .decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut decisions: Vec<Decision> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        decisions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        decisions
    }

    pub fn pending(&self) -> Vec<Decision> {
        self.decisions().into_iter().filter(Decision::is_pending).collect()
    }

    pub fn pending_count(&self) -> usize {
        let slots: Vec<Slot> = self
            .decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_pending())
            .count()
    }

    pub fn feedback_records(&self) -> Vec<FeedbackRecord> {
        self.feedback.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Accepted share of resolved decisions in a category.
    ///
    /// `None` when the category has no feedback yet.
    pub fn category_acceptance(&self, category: DecisionCategory) -> Option<f64> {
        let feedback = self.feedback.read().unwrap_or_else(PoisonError::into_inner);
        let (total, accepted) = feedback
            .iter()
            .filter(|r| r.category == category)
            .fold((0usize, 0usize), |(t, a), r| {
                (t + 1, a + usize::from(r.is_accept()))
            });
        (total > 0).then(|| accepted as f64 / total as f64)
    }

    /// Aggregates feedback within `window`.
    pub fn aggregate(&self, window: Window) -> Analytics {
        let records = self.feedback_records();
        aggregate(&records, window, Utc::now(), self.pending_count())
    }

    /// Appends the observed outcome of a decision.
    ///
    /// # Errors
    /// [`Error::UnknownDecision`] if the id is absent.
    pub fn record_outcome(
        &self,
        decision_id: &str,
        actual_delay_min: f64,
        predicted_delay_min: f64,
        time_saved_min: f64,
    ) -> Result<OutcomeRecord> {
        if self.slot(decision_id).is_none() {
            return Err(Error::UnknownDecision(decision_id.to_string()));
        }
        let record = OutcomeRecord {
            decision_id: decision_id.to_string(),
            actual_delay_min,
            predicted_delay_min,
            time_saved_min,
            recorded_at: Utc::now(),
        };
        self.outcomes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    pub fn outcomes(&self) -> Vec<OutcomeRecord> {
        self.outcomes.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Appends feedback on one model output.
    ///
    /// # Errors
    /// [`Error::InvalidFeature`] or [`Error::InvalidInput`] for values
    /// outside their domains.
    pub fn record_model_feedback(
        &self,
        model_kind: impl Into<String>,
        features: Features,
        predicted_delay_min: f64,
        actual_delay_min: f64,
        score: f64,
    ) -> Result<ModelFeedbackRecord> {
        features.validate()?;
        validate_score(score)?;
        if !actual_delay_min.is_finite() || !predicted_delay_min.is_finite() {
            return Err(Error::InvalidInput("delays must be finite".into()));
        }
        let record = ModelFeedbackRecord {
            model_kind: model_kind.into(),
            features,
            predicted_delay_min,
            actual_delay_min,
            score,
            recorded_at: Utc::now(),
        };
        self.model_feedback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    pub fn model_performance(&self, model_kind: &str) -> ModelPerformance {
        let records = self.model_feedback.read().unwrap_or_else(PoisonError::into_inner);
        ModelPerformance::from_records(model_kind, records.iter())
    }

    /// Model feedback as a retraining corpus, weighted `0.5 + score`.
    pub fn training_corpus(&self) -> TrainingCorpus {
        let records = self.model_feedback.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .map(|r| {
                TrainingSample::new(r.features.clone(), r.actual_delay_min)
                    .with_weight(0.5 + r.score)
            })
            .collect::<Vec<_>>()
            .into()
    }

    pub fn model_version(&self) -> Option<ModelVersion> {
        self.model_version.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_model_version(&self, version: ModelVersion) {
        *self.model_version.write().unwrap_or_else(PoisonError::into_inner) = Some(version);
    }

    /// Copies the whole store state.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            decisions: self.decisions(),
            feedback: self.feedback_records(),
            outcomes: self.outcomes(),
            model_feedback: self
                .model_feedback
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            model_version: self.model_version(),
        }
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// # Errors
    /// [`Error::DuplicateDecision`] if two decisions share an id.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let mut decisions = HashMap::with_capacity(snapshot.decisions.len());
        for decision in snapshot.decisions {
            if decisions.contains_key(&decision.id) {
                return Err(Error::DuplicateDecision(decision.id));
            }
            decisions.insert(decision.id.clone(), Arc::new(Mutex::new(decision)));
        }
        Ok(Self {
            decisions: RwLock::new(decisions),
            feedback: RwLock::new(snapshot.feedback),
            outcomes: RwLock::new(snapshot.outcomes),
            model_feedback: RwLock::new(snapshot.model_feedback),
            model_version: RwLock::new(snapshot.model_version),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }
}

fn action_verb(action: Action) -> &'static str {
    match action {
        Action::Accept => "accept",
        Action::Reject => "reject",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::DecisionStatus;
    use std::thread;

    fn pending(id: &str, category: DecisionCategory) -> Decision {
        Decision::new(id, category, "FRT-203", "Hold FRT-203 at A")
    }

    #[test]
    fn test_aggregate_with_unbounded_day_window() {
        let store = FeedbackStore::new();
        store.record(pending("dec-1", DecisionCategory::Routing)).unwrap();
        store.resolve("dec-1", Action::Accept, Feedback::new("a", 0.8)).unwrap();

        let analytics = store.aggregate(Window::LastDays(u32::MAX));
        assert_eq!(analytics.total_feedback, 1);
        assert_eq!(analytics.accepted, 1);
    }

    #[test]
    fn test_record_and_resolve() {
        let store = FeedbackStore::new();
        store.record(pending("dec-1", DecisionCategory::Priority)).unwrap();

        let record = store
            .resolve("dec-1", Action::Accept, Feedback::new("ctl-7", 0.9).with_context("ok"))
            .unwrap();
        assert_eq!(record.category, DecisionCategory::Priority);
        assert_eq!(record.context, "ok");

        let decision = store.decision("dec-1").unwrap();
        assert_eq!(decision.status, DecisionStatus::Accepted);
        assert_eq!(decision.resolved_by.as_deref(), Some("ctl-7"));
        assert_eq!(store.feedback_records().len(), 1);
    }

    #[test]
    fn test_second_resolve_fails() {
        let store = FeedbackStore::new();
        store.record(pending("dec-1", DecisionCategory::Priority)).unwrap();
        store.resolve("dec-1", Action::Reject, Feedback::new("a", 0.1)).unwrap();

        let err = store
            .resolve("dec-1", Action::Accept, Feedback::new("b", 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AlreadyResolved {
                decision_id: "dec-1".into(),
                status: DecisionStatus::Rejected
            }
        );
        assert_eq!(store.feedback_records().len(), 1);
    }

    #[test]
    fn test_unknown_and_duplicate() {
        let store = FeedbackStore::new();
        assert_eq!(
            store
                .resolve("nope", Action::Accept, Feedback::new("a", 0.5))
                .unwrap_err(),
            Error::UnknownDecision("nope".into())
        );
        store.record(pending("dec-1", DecisionCategory::Routing)).unwrap();
        assert_eq!(
            store.record(pending("dec-1", DecisionCategory::Routing)).unwrap_err(),
            Error::DuplicateDecision("dec-1".into())
        );
    }

    #[test]
    fn test_invalid_score_leaves_decision_pending() {
        let store = FeedbackStore::new();
        store.record(pending("dec-1", DecisionCategory::Priority)).unwrap();
        assert!(store
            .resolve("dec-1", Action::Accept, Feedback::new("a", 2.0))
            .is_err());
        assert!(store.decision("dec-1").unwrap().is_pending());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_concurrent_resolve_single_winner() {
        let store = Arc::new(FeedbackStore::new());
        store.record(pending("dec-1", DecisionCategory::Holding)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.resolve("dec-1", Action::Accept, Feedback::new(format!("ctl-{i}"), 0.5))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::AlreadyResolved { .. })));
        assert_eq!(store.feedback_records().len(), 1);
    }

    #[test]
    fn test_category_acceptance() {
        let store = FeedbackStore::new();
        assert_eq!(store.category_acceptance(DecisionCategory::Priority), None);
        for (i, action) in [Action::Accept, Action::Accept, Action::Reject].into_iter().enumerate() {
            let id = format!("dec-{i}");
            store.record(pending(&id, DecisionCategory::Priority)).unwrap();
            store.resolve(&id, action, Feedback::new("a", 0.5)).unwrap();
        }
        let rate = store.category_acceptance(DecisionCategory::Priority).unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(store.category_acceptance(DecisionCategory::Routing), None);

        let analytics = store.aggregate(Window::All);
        assert_eq!(analytics.total_feedback, 3);
        assert_eq!(analytics.pending_decisions, 0);
    }

    #[test]
    fn test_outcomes_and_model_feedback() {
        let store = FeedbackStore::new();
        assert!(store.record_outcome("dec-9", 4.0, 6.0, 2.0).is_err());
        store.record(pending("dec-9", DecisionCategory::Routing)).unwrap();
        let outcome = store.record_outcome("dec-9", 4.0, 6.0, 2.0).unwrap();
        assert!((outcome.prediction_error_min() - 2.0).abs() < 1e-10);

        store
            .record_model_feedback("delay", Features::default(), 10.0, 12.0, 0.8)
            .unwrap();
        store
            .record_model_feedback("delay", Features::default(), 10.0, 6.0, 0.2)
            .unwrap();
        assert!(store
            .record_model_feedback("delay", Features::default(), 1.0, 1.0, 1.5)
            .is_err());

        let perf = store.model_performance("delay");
        assert_eq!(perf.records, 2);
        assert!((perf.mean_abs_error_min - 3.0).abs() < 1e-10);

        let corpus = store.training_corpus();
        assert_eq!(corpus.len(), 2);
        assert!((corpus.samples()[0].weight - 1.3).abs() < 1e-10);
        assert!((corpus.samples()[1].actual_delay_min - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = FeedbackStore::new();
        store.record(pending("dec-1", DecisionCategory::Priority)).unwrap();
        store.record(pending("dec-2", DecisionCategory::Routing)).unwrap();
        store.resolve("dec-1", Action::Accept, Feedback::new("a", 1.0)).unwrap();

        let json = store.to_json().unwrap();
        let restored = FeedbackStore::from_json(&json).unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());
        assert!(matches!(
            restored.resolve("dec-1", Action::Reject, Feedback::new("b", 0.0)),
            Err(Error::AlreadyResolved { .. })
        ));
        assert!(restored.resolve("dec-2", Action::Reject, Feedback::new("b", 0.0)).is_ok());
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let snapshot = StoreSnapshot {
            decisions: vec![
                pending("dec-1", DecisionCategory::Priority),
                pending("dec-1", DecisionCategory::Routing),
            ],
            ..StoreSnapshot::default()
        };
        assert!(FeedbackStore::from_snapshot(snapshot).is_err());
    }
}
