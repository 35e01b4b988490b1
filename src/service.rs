//! Dispatching service facade.
//!
//! Ties the components together over the request/response payloads the
//! API layer exchanges:
//!
//! | Operation | Payload | Components |
//! |-----------|---------|------------|
//! | [`optimize`](DispatchService::optimize) | [`ScheduleRequest`] | predictor, scheduler, refiner, store |
//! | [`predict`](DispatchService::predict) | [`PredictionRequest`] | predictor, store |
//! | [`resolve`](DispatchService::resolve) | [`DecisionResolution`] | store |
//! | [`analytics`](DispatchService::analytics) | [`AnalyticsQuery`] | store |
//! | [`retrain`](DispatchService::retrain) | - | store, predictor |
//!
//! Scheduling requests share no mutable state apart from the feedback
//! store, so one service can serve them from many threads at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::dispatching::{RuleEngine, SchedulingContext};
use crate::error::Result;
use crate::feedback::{
    Action, Analytics, Decision, DecisionCategory, Feedback, FeedbackRecord, FeedbackStore,
    Window,
};
use crate::models::{
    Conflict, ConflictKind, Network, NetworkElement, NetworkRegistry, Schedule, Train,
    TrainTimetable,
};
use crate::predictor::{
    DelayPredictor, Features, ModelVersion, Prediction, PredictionRequest, TrainingCorpus,
    CURRENT_DELAY_RANGE, MAX_ROUTE_COMPLEXITY,
};
use crate::refiner::LocalSearchRefiner;
use crate::scheduler::{ConstraintScheduler, Problem, ScheduleKpi, ON_TIME_TOLERANCE_MIN};

/// Method label of a run refined from the constructed schedule.
pub const METHOD_CONSTRAINT_LNS: &str = "constraint_lns";
/// Method label of a run refined from the caller's existing schedule.
pub const METHOD_WARM_START_LNS: &str = "warm_start_lns";

/// Predicted delay from which a routing decision is raised (minutes).
pub const ROUTING_THRESHOLD_MIN: f64 = 15.0;
/// Predicted delay from which a holding decision is raised (minutes).
pub const HOLDING_THRESHOLD_MIN: f64 = 30.0;

const RECOMMENDATION_CONFIDENCE: f64 = 0.9;
const BASELINE_HORIZON_MIN: i64 = i64::MAX / 4;

/// Scheduling request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub trains: Vec<Train>,
    /// Network elements; empty means the loaded network.
    #[serde(default)]
    pub tracks: Vec<NetworkElement>,
    /// Entry times per train id, in route order.
    #[serde(default)]
    pub existing_schedule: Option<HashMap<String, Vec<i64>>>,
    /// Operating conditions used for per-train delay predictions.
    #[serde(default)]
    pub conditions: Option<Features>,
}

impl ScheduleRequest {
    pub fn new(trains: Vec<Train>, tracks: Vec<NetworkElement>) -> Self {
        Self {
            trains,
            tracks,
            existing_schedule: None,
            conditions: None,
        }
    }

    pub fn with_existing_schedule(mut self, entries: HashMap<String, Vec<i64>>) -> Self {
        self.existing_schedule = Some(entries);
        self
    }

    pub fn with_conditions(mut self, conditions: Features) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

/// Scheduling response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub optimized_schedule: Vec<TrainTimetable>,
    /// Naive conflicts absent from the returned schedule.
    pub conflicts_resolved: usize,
    pub unresolved_conflicts: usize,
    /// FIFO baseline delay minus returned delay (minutes, may be negative).
    pub total_delay_reduction: i64,
    /// Wall-clock time (seconds).
    pub optimization_time: f64,
    pub method: String,
    pub objective: f64,
    pub kpi: ScheduleKpi,
    /// Pending decisions raised for the resolved conflicts.
    pub recommendations: Vec<Decision>,
}

/// Decision resolution payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResolution {
    pub decision_id: String,
    pub action: Action,
    pub controller_id: String,
    pub feedback_score: f64,
    #[serde(default)]
    pub context: String,
}

impl DecisionResolution {
    pub fn new(
        decision_id: impl Into<String>,
        action: Action,
        controller_id: impl Into<String>,
        feedback_score: f64,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            action,
            controller_id: controller_id.into(),
            feedback_score,
            context: String::new(),
        }
    }

    fn feedback(&self) -> Feedback {
        Feedback::new(&self.controller_id, self.feedback_score).with_context(&self.context)
    }
}

/// Analytics query payload. A record count takes precedence over days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsQuery {
    pub last_records: Option<usize>,
    pub last_days: Option<u32>,
}

impl AnalyticsQuery {
    pub fn window(&self) -> Window {
        match (self.last_records, self.last_days) {
            (Some(n), _) => Window::LastRecords(n),
            (None, Some(days)) => Window::LastDays(days),
            (None, None) => Window::All,
        }
    }
}

/// Entry point for dispatching operations.
#[derive(Debug)]
pub struct DispatchService {
    config: EngineConfig,
    scheduler: ConstraintScheduler,
    baseline: ConstraintScheduler,
    refiner: LocalSearchRefiner,
    predictor: Arc<DelayPredictor>,
    store: Arc<FeedbackStore>,
    network: NetworkRegistry,
    next_decision: AtomicU64,
}

impl DispatchService {
    /// Builds the service and trains the bootstrap delay model.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let predictor = Arc::new(DelayPredictor::new(config.predictor.clone())?);
        let store = Arc::new(FeedbackStore::new());
        store.set_model_version(predictor.active_version());

        let scheduler = ConstraintScheduler::with_config(config.scheduler.clone());
        let baseline =
            ConstraintScheduler::with_config(config.scheduler.clone().with_horizon(BASELINE_HORIZON_MIN))
                .with_rule_engine(RuleEngine::fifo());
        let refiner = LocalSearchRefiner::new(config.refiner.clone())
            .with_solver_config(config.scheduler.clone());

        Ok(Self {
            config,
            scheduler,
            baseline,
            refiner,
            predictor,
            store,
            network: NetworkRegistry::default(),
            next_decision: AtomicU64::new(1),
        })
    }

    /// Replaces the feedback store, e.g. with one restored from a snapshot.
    pub fn with_store(mut self, store: Arc<FeedbackStore>) -> Self {
        if store.model_version().is_none() {
            store.set_model_version(self.predictor.active_version());
        }
        self.store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<FeedbackStore> {
        &self.store
    }

    pub fn predictor(&self) -> &Arc<DelayPredictor> {
        &self.predictor
    }

    /// Loads the network used by requests without `tracks`.
    pub fn load_network(&self, network: Network) -> Arc<Network> {
        self.network.reload(network)
    }

    pub fn network(&self) -> Arc<Network> {
        self.network.current()
    }

    /// Schedules a request and refines the result.
    ///
    /// # Errors
    /// - [`Error::InvalidRoute`](crate::Error::InvalidRoute) and
    ///   [`Error::InvalidInput`](crate::Error::InvalidInput) for bad requests
    /// - [`Error::InvalidFeature`](crate::Error::InvalidFeature) for bad
    ///   conditions
    /// - [`Error::InfeasibleSchedule`](crate::Error::InfeasibleSchedule)
    pub fn optimize(&self, request: &ScheduleRequest) -> Result<ScheduleResponse> {
        let start = Instant::now();
        let network = if request.tracks.is_empty() {
            self.network.current()
        } else {
            Arc::new(Network::new(request.tracks.clone())?)
        };
        let context = self.scheduling_context(&request.trains, request.conditions.as_ref())?;

        let problem = self.scheduler.problem(&request.trains, &network, &context)?;
        let solution = self.scheduler.solve_problem(&problem)?;

        let (initial, method) = match self.warm_start(&problem, request, solution.objective) {
            Some(schedule) => (schedule, METHOD_WARM_START_LNS),
            None => (solution.schedule, METHOD_CONSTRAINT_LNS),
        };
        let refined = self.refiner.refine_problem(&problem, initial);

        let remaining = problem.detect_conflicts(&refined.schedule);
        let conflicts_resolved = problem.resolved_count(&remaining);

        let baseline =
            self.baseline
                .solve(&request.trains, &network, &SchedulingContext::default())?;
        let total_delay_reduction =
            problem.total_delay(&baseline.schedule) - problem.total_delay(&refined.schedule);

        let recommendations = self.raise_recommendations(&problem, &remaining)?;
        let kpi = ScheduleKpi::calculate(&problem, &refined.schedule);
        let optimization_time = start.elapsed().as_secs_f64();

        info!(
            "optimized {} trains via {method}: {conflicts_resolved}/{} conflicts resolved, \
             delay reduction {total_delay_reduction} min in {optimization_time:.3}s",
            request.trains.len(),
            problem.naive_conflicts().len()
        );

        Ok(ScheduleResponse {
            optimized_schedule: problem.timetable(&refined.schedule),
            conflicts_resolved,
            unresolved_conflicts: remaining.len(),
            total_delay_reduction,
            optimization_time,
            method: method.to_string(),
            objective: refined.objective,
            kpi,
            recommendations,
        })
    }

    /// Per-train delay estimates under the request's conditions.
    fn scheduling_context(
        &self,
        trains: &[Train],
        conditions: Option<&Features>,
    ) -> Result<SchedulingContext> {
        let mut context = SchedulingContext::at_time(0);
        for train in trains {
            let own = Features::for_train(train);
            let features = Features {
                route_complexity: own.route_complexity.min(MAX_ROUTE_COMPLEXITY),
                train_type: own.train_type,
                current_delay: own
                    .current_delay
                    .clamp(CURRENT_DELAY_RANGE.0, CURRENT_DELAY_RANGE.1),
                ..conditions.cloned().unwrap_or_default()
            };
            let prediction = self.predictor.predict(&PredictionRequest::new(features))?;
            context
                .delay_estimates
                .insert(train.id.clone(), prediction.estimate());
        }
        Ok(context)
    }

    /// The caller's schedule, if it is usable and no worse than `constructed`.
    fn warm_start(
        &self,
        problem: &Problem<'_>,
        request: &ScheduleRequest,
        constructed: f64,
    ) -> Option<Schedule> {
        let entries = request.existing_schedule.as_ref()?;
        let Some(schedule) = problem.schedule_from_entries(entries) else {
            debug!("existing schedule does not match the request; ignored");
            return None;
        };
        if !problem.is_feasible(&schedule) {
            debug!("existing schedule is infeasible; ignored");
            return None;
        }
        (problem.objective(&schedule, 0) <= constructed).then_some(schedule)
    }

    /// Records one pending priority decision per resolved capacity conflict.
    fn raise_recommendations(
        &self,
        problem: &Problem<'_>,
        remaining: &[Conflict],
    ) -> Result<Vec<Decision>> {
        let rate = self
            .store
            .category_acceptance(DecisionCategory::Priority)
            .unwrap_or(1.0);
        let confidence = RECOMMENDATION_CONFIDENCE * (0.5 + 0.5 * rate);
        let naive = problem.naive();

        let mut decisions = Vec::new();
        for conflict in problem.naive_conflicts() {
            if conflict.kind != ConflictKind::Capacity || remaining.contains(conflict) {
                continue;
            }
            let (higher, lower) =
                if problem.rank(conflict.first.train) < problem.rank(conflict.second.train) {
                    (conflict.first, conflict.second)
                } else {
                    (conflict.second, conflict.first)
                };
            let window = |v| {
                let entry = naive.entry(v);
                (entry, entry + problem.visit(v).duration_min)
            };
            let (h_entry, h_exit) = window(higher);
            let (l_entry, l_exit) = window(lower);
            let overlap = (h_exit.min(l_exit) - h_entry.max(l_entry)).max(0);

            let element = &problem.network().element(conflict.element).id;
            let higher_id = &problem.train(higher.train).id;
            let lower_id = &problem.train(lower.train).id;
            let decision = Decision::new(
                self.next_decision_id(),
                DecisionCategory::Priority,
                lower_id.clone(),
                format!("Hold {lower_id} at {element} to let {higher_id} pass"),
            )
            .with_saving(overlap as f64)
            .with_confidence(confidence);
            self.store.record(decision.clone())?;
            decisions.push(decision);
        }
        Ok(decisions)
    }

    fn next_decision_id(&self) -> String {
        loop {
            let seq = self.next_decision.fetch_add(1, Ordering::Relaxed);
            let id = format!("dec-{seq:06}");
            if self.store.decision(&id).is_none() {
                return id;
            }
        }
    }

    /// Predicts a delay; large delays also raise a pending decision.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let mut prediction = self.predictor.predict(request)?;
        if prediction.predicted_delay >= ROUTING_THRESHOLD_MIN {
            let category = if prediction.predicted_delay >= HOLDING_THRESHOLD_MIN {
                DecisionCategory::Holding
            } else {
                DecisionCategory::Routing
            };
            let train_id = request
                .train_id
                .clone()
                .unwrap_or_else(|| "unassigned".to_string());
            let saving = (prediction.predicted_delay - ON_TIME_TOLERANCE_MIN as f64).max(0.0);
            let decision = Decision::new(
                self.next_decision_id(),
                category,
                train_id,
                prediction.recommendation.clone(),
            )
            .with_saving(saving)
            .with_confidence(prediction.confidence);
            prediction.decision_id = Some(decision.id.clone());
            self.store.record(decision)?;
        }
        Ok(prediction)
    }

    /// Resolves a decision.
    ///
    /// # Errors
    /// [`Error::UnknownDecision`](crate::Error::UnknownDecision) or
    /// [`Error::AlreadyResolved`](crate::Error::AlreadyResolved); the latter
    /// is a benign race when controllers act concurrently.
    pub fn resolve(&self, resolution: &DecisionResolution) -> Result<FeedbackRecord> {
        self.store
            .resolve(&resolution.decision_id, resolution.action, resolution.feedback())
    }

    pub fn analytics(&self, query: &AnalyticsQuery) -> Analytics {
        self.store.aggregate(query.window())
    }

    /// Retrains on the store's model feedback and updates the model pointer.
    pub fn retrain(&self) -> Result<ModelVersion> {
        self.retrain_on(&self.store.training_corpus())
    }

    pub fn retrain_on(&self, corpus: &TrainingCorpus) -> Result<ModelVersion> {
        let version = self.predictor.retrain(corpus)?;
        self.store.set_model_version(version.clone());
        Ok(version)
    }

    /// [`retrain`](Self::retrain) on a background thread.
    pub fn spawn_retrain(&self) -> JoinHandle<Result<ModelVersion>> {
        let corpus = self.store.training_corpus();
        let predictor = Arc::clone(&self.predictor);
        let store = Arc::clone(&self.store);
        thread::spawn(move || {
            let version = predictor.retrain(&corpus)?;
            store.set_model_version(version.clone());
            Ok(version)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feedback::DecisionStatus;
    use crate::models::Priority;
    use crate::predictor::PredictorConfig;

    fn service() -> DispatchService {
        let config = EngineConfig::default()
            .with_predictor(PredictorConfig::default().with_bootstrap(300, 42));
        DispatchService::new(config).unwrap()
    }

    fn tracks() -> Vec<NetworkElement> {
        vec![
            NetworkElement::track("A"),
            NetworkElement::platform("B").with_capacity(2),
            NetworkElement::track("C"),
        ]
    }

    fn trains() -> Vec<Train> {
        vec![
            Train::new("EXP-101").with_route(["A", "B", "C"]).with_priority(Priority::High),
            Train::new("LOC-78").with_route(["A", "B", "C"]).with_priority(Priority::Medium),
            Train::new("FRT-203").with_route(["A", "B", "C"]).with_priority(Priority::Low),
        ]
    }

    #[test]
    fn test_optimize_scenario() {
        let service = service();
        let response = service
            .optimize(&ScheduleRequest::new(trains(), tracks()))
            .unwrap();

        assert_eq!(response.conflicts_resolved, 9);
        assert_eq!(response.unresolved_conflicts, 0);
        assert_eq!(response.method, METHOD_CONSTRAINT_LNS);
        assert_eq!(response.total_delay_reduction, 0);
        assert_eq!(response.optimized_schedule[0].entry_on("A"), Some(0));
        assert_eq!(response.optimized_schedule[1].entry_on("A"), Some(3));
        assert_eq!(response.optimized_schedule[2].entry_on("A"), Some(6));
        assert_eq!(response.kpi.total_delay_min, 9);

        assert_eq!(response.recommendations.len(), 9);
        assert!(response
            .recommendations
            .iter()
            .any(|d| d.description == "Hold FRT-203 at A to let EXP-101 pass"));
        assert!(response
            .recommendations
            .iter()
            .all(|d| (d.confidence - 0.9).abs() < 1e-10));
        assert_eq!(service.store().pending_count(), 9);
    }

    #[test]
    fn test_recommendation_confidence_follows_feedback() {
        let service = service();
        let first = service
            .optimize(&ScheduleRequest::new(trains(), tracks()))
            .unwrap();
        for decision in &first.recommendations {
            service
                .resolve(&DecisionResolution::new(&decision.id, Action::Reject, "ctl-1", 0.0))
                .unwrap();
        }

        let second = service
            .optimize(&ScheduleRequest::new(trains(), tracks()))
            .unwrap();
        assert!(second
            .recommendations
            .iter()
            .all(|d| (d.confidence - 0.45).abs() < 1e-10));
    }

    #[test]
    fn test_warm_start() {
        let service = service();
        let existing: HashMap<String, Vec<i64>> = [
            ("EXP-101".to_string(), vec![0, 3, 5]),
            ("LOC-78".to_string(), vec![3, 6, 8]),
            ("FRT-203".to_string(), vec![6, 9, 11]),
        ]
        .into_iter()
        .collect();
        let response = service
            .optimize(&ScheduleRequest::new(trains(), tracks()).with_existing_schedule(existing))
            .unwrap();
        assert_eq!(response.method, METHOD_WARM_START_LNS);

        let clashing: HashMap<String, Vec<i64>> = [
            ("EXP-101".to_string(), vec![0, 3, 5]),
            ("LOC-78".to_string(), vec![0, 3, 5]),
            ("FRT-203".to_string(), vec![6, 9, 11]),
        ]
        .into_iter()
        .collect();
        let response = service
            .optimize(&ScheduleRequest::new(trains(), tracks()).with_existing_schedule(clashing))
            .unwrap();
        assert_eq!(response.method, METHOD_CONSTRAINT_LNS);

        let past_horizon: HashMap<String, Vec<i64>> = [
            ("EXP-101".to_string(), vec![0, 3, 5]),
            ("LOC-78".to_string(), vec![3, 6, 8]),
            ("FRT-203".to_string(), vec![6, 9, i64::MAX]),
        ]
        .into_iter()
        .collect();
        let response = service
            .optimize(
                &ScheduleRequest::new(trains(), tracks()).with_existing_schedule(past_horizon),
            )
            .unwrap();
        assert_eq!(response.method, METHOD_CONSTRAINT_LNS);
    }

    #[test]
    fn test_out_of_range_delay_rejected() {
        let service = service();
        let mut trains = trains();
        trains[1] = trains[1].clone().with_current_delay(i64::MAX - 1);
        assert!(matches!(
            service.optimize(&ScheduleRequest::new(trains, tracks())),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_optimize_uses_loaded_network() {
        let service = service();
        assert!(matches!(
            service.optimize(&ScheduleRequest::new(trains(), Vec::new())),
            Err(Error::InvalidRoute { .. })
        ));
        service.load_network(Network::new(tracks()).unwrap());
        let response = service
            .optimize(&ScheduleRequest::new(trains(), Vec::new()))
            .unwrap();
        assert_eq!(response.conflicts_resolved, 9);
    }

    #[test]
    fn test_bad_conditions_rejected() {
        let service = service();
        let request = ScheduleRequest::new(trains(), tracks())
            .with_conditions(Features::default().with_weather(3.0));
        assert!(matches!(
            service.optimize(&request),
            Err(Error::InvalidFeature { feature: "weather", .. })
        ));
    }

    #[test]
    fn test_large_delay_raises_decision() {
        let service = service();
        let features = Features {
            weather: 1.0,
            traffic_density: 1.0,
            hour: 8,
            track_condition: 0.0,
            signal_delay: 1.0,
            platform_availability: 0.0,
            route_complexity: 8,
            ..Features::default()
        };
        let prediction = service
            .predict(&PredictionRequest::new(features).for_train("FRT-203"))
            .unwrap();
        assert!(prediction.predicted_delay >= HOLDING_THRESHOLD_MIN);

        let id = prediction.decision_id.unwrap();
        let decision = service.store().decision(&id).unwrap();
        assert_eq!(decision.category, DecisionCategory::Holding);
        assert_eq!(decision.train_id, "FRT-203");

        let calm = service
            .predict(&PredictionRequest::new(Features::default()))
            .unwrap();
        assert!(calm.predicted_delay < ROUTING_THRESHOLD_MIN);
        assert!(calm.decision_id.is_none());
    }

    #[test]
    fn test_resolve_and_analytics() {
        let service = service();
        let response = service
            .optimize(&ScheduleRequest::new(trains(), tracks()))
            .unwrap();
        let id = &response.recommendations[0].id;

        service
            .resolve(&DecisionResolution::new(id, Action::Accept, "ctl-1", 0.8))
            .unwrap();
        let again = service.resolve(&DecisionResolution::new(id, Action::Reject, "ctl-2", 0.1));
        assert!(matches!(
            again,
            Err(Error::AlreadyResolved {
                status: DecisionStatus::Accepted,
                ..
            })
        ));

        let analytics = service.analytics(&AnalyticsQuery::default());
        assert_eq!(analytics.total_feedback, 1);
        assert_eq!(analytics.pending_decisions, 8);
        assert!((analytics.acceptance_rate - 1.0).abs() < 1e-10);
        assert_eq!(
            AnalyticsQuery {
                last_records: None,
                last_days: Some(7)
            }
            .window(),
            Window::LastDays(7)
        );
    }

    #[test]
    fn test_retrain_updates_pointer() {
        let service = service();
        assert_eq!(service.store().model_version().unwrap().version, 1);
        assert!(matches!(
            service.retrain(),
            Err(Error::InsufficientData { available: 0, .. })
        ));

        for i in 0..60 {
            let features = Features::default().with_weather(f64::from(i % 4) / 4.0);
            service
                .store()
                .record_model_feedback("delay", features, 5.0, 45.0, 0.5)
                .unwrap();
        }
        let version = service.spawn_retrain().join().unwrap().unwrap();
        assert_eq!(version.version, 2);
        assert_eq!(service.store().model_version(), Some(version));
    }
}
