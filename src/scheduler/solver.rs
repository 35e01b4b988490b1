//! Constraint scheduler.
//!
//! # Algorithm
//!
//! Serial schedule generation over the ordering-arc graph:
//!
//! 1. Build the [`Problem`] (naive times, rank, ordering arcs).
//! 2. Visit trains in dispatching order; place each route element at the
//!    earliest entry that respects release, route order, incoming arcs and
//!    the element's cumulative occupancy profile.
//! 3. A visit whose earliest entry lies beyond the horizon makes the whole
//!    request infeasible.
//! 4. The wall-clock budget is checked after every placement. Once it is
//!    spent, remaining visits take their lower bounds without capacity
//!    checks and the resulting conflicts are reported as unresolved. The
//!    horizon still holds for those visits.
//!
//! Steps 1-3 are deterministic: identical inputs give identical schedules
//! whenever the budget is not hit.
//!
//! # Complexity
//! O(V · (A + S²)) where V = visits, A = arcs per visit, S = slots per element.
//!
//! # Reference
//! Kolisch (1996), "Serial and parallel resource-constrained project
//! scheduling methods revisited"

use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{ObjectiveWeights, Occupancy, Problem, TraversalTimes};
use crate::dispatching::{RuleEngine, SchedulingContext};
use crate::error::{Error, Result};
use crate::models::{Network, Schedule, Train, VisitRef};

/// Rule set that ranks contending trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// Priority, then current delay, then id.
    #[default]
    Standard,
    /// Priority, then predicted delay, then current delay, then id.
    RiskAware,
}

impl DispatchOrder {
    pub fn rule_engine(self) -> RuleEngine {
        match self {
            DispatchOrder::Standard => RuleEngine::rail_default(),
            DispatchOrder::RiskAware => RuleEngine::risk_aware(),
        }
    }
}

/// Constraint scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Latest admissible entry time (minutes).
    pub horizon_min: i64,
    /// Wall-clock budget (milliseconds).
    pub time_budget_ms: u64,
    /// Traversal duration per element kind.
    pub traversal: TraversalTimes,
    /// Objective coefficients.
    pub weights: ObjectiveWeights,
    /// Ranking of contending trains.
    pub ordering: DispatchOrder,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            horizon_min: 120,
            time_budget_ms: 2000,
            traversal: TraversalTimes::default(),
            weights: ObjectiveWeights::default(),
            ordering: DispatchOrder::default(),
        }
    }
}

impl SolverConfig {
    pub fn with_horizon(mut self, horizon_min: i64) -> Self {
        self.horizon_min = horizon_min;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalTimes) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_ordering(mut self, ordering: DispatchOrder) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Checks horizon, traversal times and objective weights.
    pub fn validate(&self) -> Result<()> {
        if self.horizon_min < 0 {
            return Err(Error::InvalidConfig(format!(
                "horizon {} min is negative",
                self.horizon_min
            )));
        }
        if !self.traversal.is_positive() {
            return Err(Error::InvalidConfig(
                "traversal times must be positive".into(),
            ));
        }
        let w = &self.weights;
        let coefficients = [w.low, w.medium, w.high, w.conflict_penalty, w.risk_weight];
        if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::InvalidConfig(
                "objective weights must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleSolution {
    /// Entry times for every visit.
    pub schedule: Schedule,
    /// Conflicts in the naive assignment.
    pub naive_conflicts: usize,
    /// Naive conflicts absent from `schedule`.
    pub conflicts_resolved: usize,
    /// Conflicts still present in `schedule`.
    pub unresolved_conflicts: usize,
    /// Objective value of `schedule`.
    pub objective: f64,
    /// Wall-clock time spent.
    pub elapsed: Duration,
    /// Whether the budget ran out before every visit was checked.
    pub budget_exhausted: bool,
}

impl ScheduleSolution {
    /// Whether every hard constraint holds.
    pub fn is_conflict_free(&self) -> bool {
        self.unresolved_conflicts == 0
    }
}

/// Builds feasible schedules by serial generation over ordering arcs.
///
/// # Example
///
/// ```
/// use u_rail::dispatching::SchedulingContext;
/// use u_rail::models::{Network, NetworkElement, Priority, Train};
/// use u_rail::scheduler::ConstraintScheduler;
///
/// let network = Network::new(vec![NetworkElement::track("A")]).unwrap();
/// let trains = vec![
///     Train::new("FRT-203").with_route(["A"]).with_priority(Priority::Low),
///     Train::new("EXP-101").with_route(["A"]).with_priority(Priority::High),
/// ];
///
/// let solution = ConstraintScheduler::new()
///     .solve(&trains, &network, &SchedulingContext::at_time(0))
///     .unwrap();
/// assert_eq!(solution.conflicts_resolved, 1);
/// assert_eq!(solution.schedule.entries(1), &[0]);
/// assert_eq!(solution.schedule.entries(0), &[3]);
/// ```
#[derive(Debug, Clone)]
pub struct ConstraintScheduler {
    config: SolverConfig,
    rule_engine: RuleEngine,
}

impl ConstraintScheduler {
    /// Creates a scheduler with default settings and dispatching order.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Creates a scheduler ranking trains by `config.ordering`.
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            rule_engine: config.ordering.rule_engine(),
            config,
        }
    }

    /// Sets the rule engine that ranks contending trains.
    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.rule_engine = engine;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rule_engine
    }

    /// Builds the problem for a request with this scheduler's settings.
    pub fn problem<'a>(
        &self,
        trains: &'a [Train],
        network: &'a Network,
        context: &SchedulingContext,
    ) -> Result<Problem<'a>> {
        Problem::build(trains, network, &self.config, &self.rule_engine, context)
    }

    /// Solves a request.
    ///
    /// # Errors
    /// - [`Error::InvalidRoute`](crate::Error::InvalidRoute) for unknown route elements
    /// - [`Error::InfeasibleSchedule`](crate::Error::InfeasibleSchedule) when a
    ///   visit cannot enter its element within the horizon
    pub fn solve(
        &self,
        trains: &[Train],
        network: &Network,
        context: &SchedulingContext,
    ) -> Result<ScheduleSolution> {
        let problem = self.problem(trains, network, context)?;
        self.solve_problem(&problem)
    }

    /// Solves an already built problem.
    pub fn solve_problem(&self, problem: &Problem<'_>) -> Result<ScheduleSolution> {
        let start = Instant::now();
        let budget = self.config.time_budget();
        let mut schedule = problem.empty_schedule();
        let mut occupancy = Occupancy::new(problem.network().len());
        let mut budget_exhausted = false;

        for &t in problem.order() {
            for k in 0..problem.route_len(t) {
                let v = VisitRef::new(t, k);
                if budget_exhausted {
                    problem
                        .place_unchecked(&mut schedule, v)
                        .map_err(|blocked| problem.infeasible(blocked))?;
                    continue;
                }
                problem
                    .insert_visit(&mut schedule, &mut occupancy, v)
                    .map_err(|blocked| problem.infeasible(blocked))?;

                if start.elapsed() >= budget {
                    budget_exhausted = true;
                    warn!(
                        "time budget of {} ms spent at train '{}'; remaining visits unchecked",
                        self.config.time_budget_ms,
                        problem.train(t).id
                    );
                }
            }
            schedule.assign(t);
        }

        let remaining = problem.detect_conflicts(&schedule);
        let conflicts_resolved = problem.resolved_count(&remaining);
        let objective = problem.objective(&schedule, remaining.len());
        let elapsed = start.elapsed();

        info!(
            "solved {} trains: objective {:.1}, {}/{} conflicts resolved in {:?}",
            problem.train_count(),
            objective,
            conflicts_resolved,
            problem.naive_conflicts().len(),
            elapsed
        );

        Ok(ScheduleSolution {
            schedule,
            naive_conflicts: problem.naive_conflicts().len(),
            conflicts_resolved,
            unresolved_conflicts: remaining.len(),
            objective,
            elapsed,
            budget_exhausted,
        })
    }
}

impl Default for ConstraintScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{NetworkElement, Priority};

    fn sample_network() -> Network {
        Network::new(vec![
            NetworkElement::track("A"),
            NetworkElement::platform("B").with_capacity(2),
            NetworkElement::track("C"),
        ])
        .unwrap()
    }

    fn three_trains() -> Vec<Train> {
        vec![
            Train::new("EXP-101")
                .with_route(["A", "B", "C"])
                .with_priority(Priority::High),
            Train::new("LOC-78")
                .with_route(["A", "B", "C"])
                .with_priority(Priority::Medium),
            Train::new("FRT-203")
                .with_route(["A", "B", "C"])
                .with_priority(Priority::Low),
        ]
    }

    #[test]
    fn test_three_trains() {
        let network = sample_network();
        let trains = three_trains();
        let solution = ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();

        assert_eq!(solution.schedule.entries(0), &[0, 3, 5]);
        assert_eq!(solution.schedule.entries(1), &[3, 6, 8]);
        assert_eq!(solution.schedule.entries(2), &[6, 9, 11]);
        assert_eq!(solution.naive_conflicts, 9);
        assert_eq!(solution.conflicts_resolved, 9);
        assert!(solution.is_conflict_free());
        assert!(!solution.budget_exhausted);
        // LOC 3 min * 2 + FRT 6 min * 1
        assert!((solution.objective - 12.0).abs() < 1e-10);
    }

    #[test]
    fn test_no_conflicts_keeps_naive_times() {
        let network = sample_network();
        let trains = vec![
            Train::new("T1").with_route(["A"]),
            Train::new("T2").with_route(["C"]),
        ];
        let solution = ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();
        assert_eq!(solution.naive_conflicts, 0);
        assert_eq!(solution.schedule.entries(0), &[0]);
        assert_eq!(solution.schedule.entries(1), &[0]);
        assert!(solution.objective.abs() < 1e-10);
    }

    #[test]
    fn test_release_respected() {
        let network = sample_network();
        let trains = vec![Train::new("T1").with_route(["A", "C"]).with_current_delay(7)];
        let solution = ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();
        assert_eq!(solution.schedule.entries(0), &[7, 10]);
    }

    #[test]
    fn test_equal_priority_more_delayed_first() {
        let network = sample_network();
        let trains = vec![
            Train::new("L1").with_route(["A"]).with_priority(Priority::Medium),
            Train::new("L2")
                .with_route(["A"])
                .with_priority(Priority::Medium)
                .with_current_delay(1),
        ];
        let solution = ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();
        // L2 enters at 1, L1 waits for it to clear
        assert_eq!(solution.schedule.entries(1), &[1]);
        assert_eq!(solution.schedule.entries(0), &[4]);
    }

    #[test]
    fn test_infeasible_within_horizon() {
        let network = sample_network();
        let trains = vec![
            Train::new("EXP-101").with_route(["A"]).with_priority(Priority::High),
            Train::new("LOC-78").with_route(["A"]).with_priority(Priority::Medium),
        ];
        let scheduler = ConstraintScheduler::with_config(SolverConfig::default().with_horizon(2));
        let err = scheduler
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap_err();
        match err {
            Error::InfeasibleSchedule {
                train_id,
                blocking_train_id,
                ..
            } => {
                assert_eq!(train_id, "LOC-78");
                assert_eq!(blocking_train_id.as_deref(), Some("EXP-101"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_late_release_beyond_horizon() {
        let network = sample_network();
        let trains = vec![Train::new("T1").with_route(["A"]).with_current_delay(200)];
        let err = ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InfeasibleSchedule {
                blocking_train_id: None,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_budget_is_partial_success() {
        let network = sample_network();
        let trains = three_trains();
        let scheduler =
            ConstraintScheduler::with_config(SolverConfig::default().with_time_budget(Duration::ZERO));
        let solution = scheduler
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();

        assert!(solution.budget_exhausted);
        assert!(solution.schedule.is_complete());
        // arcs still order the trains, so the placement matches the full solve
        assert_eq!(solution.schedule.entries(2), &[6, 9, 11]);
        assert_eq!(solution.conflicts_resolved, 9);
        assert_eq!(solution.unresolved_conflicts, 0);
    }

    #[test]
    fn test_zero_budget_keeps_horizon_verdict() {
        let network = sample_network();
        let trains = vec![
            Train::new("EXP-101").with_route(["A"]).with_priority(Priority::High),
            Train::new("LOC-78").with_route(["A"]).with_priority(Priority::Medium),
        ];
        let ctx = SchedulingContext::at_time(0);
        let tight = SolverConfig::default().with_horizon(2);

        let full = ConstraintScheduler::with_config(tight.clone())
            .solve(&trains, &network, &ctx)
            .unwrap_err();
        let exhausted =
            ConstraintScheduler::with_config(tight.with_time_budget(Duration::ZERO))
                .solve(&trains, &network, &ctx)
                .unwrap_err();

        assert_eq!(full, exhausted);
        assert!(matches!(
            exhausted,
            Error::InfeasibleSchedule { ref train_id, .. } if train_id == "LOC-78"
        ));
    }

    #[test]
    fn test_risk_aware_ordering() {
        let network = sample_network();
        let trains = vec![
            Train::new("L1").with_route(["A"]).with_priority(Priority::Medium),
            Train::new("L2").with_route(["A"]).with_priority(Priority::Medium),
        ];
        let ctx = SchedulingContext::at_time(0).with_estimate("L2", 40.0, 0.9);

        let standard = ConstraintScheduler::new().solve(&trains, &network, &ctx).unwrap();
        assert_eq!(standard.schedule.entries(0), &[0]);
        assert_eq!(standard.schedule.entries(1), &[3]);

        let config = SolverConfig::default().with_ordering(DispatchOrder::RiskAware);
        let risk_aware = ConstraintScheduler::with_config(config)
            .solve(&trains, &network, &ctx)
            .unwrap();
        assert_eq!(risk_aware.schedule.entries(1), &[0]);
        assert_eq!(risk_aware.schedule.entries(0), &[3]);
    }

    #[test]
    fn test_dispatch_order_serde() {
        let config: SolverConfig = serde_json::from_str(r#"{"ordering": "risk_aware"}"#).unwrap();
        assert_eq!(config.ordering, DispatchOrder::RiskAware);
        assert_eq!(SolverConfig::default().ordering, DispatchOrder::Standard);
    }

    #[test]
    fn test_deterministic() {
        let network = sample_network();
        let trains = three_trains();
        let scheduler = ConstraintScheduler::new();
        let ctx = SchedulingContext::at_time(0);
        let a = scheduler.solve(&trains, &network, &ctx).unwrap();
        let b = scheduler.solve(&trains, &network, &ctx).unwrap();
        assert_eq!(a.schedule, b.schedule);
        assert!((a.objective - b.objective).abs() < 1e-10);
    }

    #[test]
    fn test_inputs_untouched() {
        let network = sample_network();
        let trains = three_trains();
        let before = trains.clone();
        ConstraintScheduler::new()
            .solve(&trains, &network, &SchedulingContext::at_time(0))
            .unwrap();
        assert_eq!(trains, before);
        assert_eq!(network.capacity_of("B"), Some(2));
    }
}
