//! Local-search refiner.

use std::time::{Duration, Instant};

use log::{debug, info, trace};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dispatching::{RuleEngine, SchedulingContext};
use crate::error::{Error, Result};
use crate::models::{Network, Schedule, Train, TrainIdx};
use crate::scheduler::{ConflictScratch, Occupancy, Problem, SolverConfig};

const EPS: f64 = 1e-9;

/// Refiner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Maximum destroy/repair iterations.
    pub iterations: usize,
    /// Wall-clock budget (milliseconds).
    pub time_budget_ms: u64,
    /// Neighbourhood size as a fraction of the element count.
    pub neighborhood_ratio: f64,
    /// RNG seed; `None` seeds from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            time_budget_ms: 1000,
            neighborhood_ratio: 0.2,
            seed: None,
        }
    }
}

impl RefinerConfig {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_neighborhood_ratio(mut self, ratio: f64) -> Self {
        self.neighborhood_ratio = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Trains destroyed per iteration.
    ///
    /// `ceil(ratio × elements)`, at least one, at most every train.
    pub fn neighborhood_size(&self, element_count: usize, train_count: usize) -> usize {
        if train_count == 0 {
            return 0;
        }
        let raw = (self.neighborhood_ratio * element_count as f64).ceil();
        (raw.max(1.0) as usize).min(train_count)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.neighborhood_ratio > 0.0 && self.neighborhood_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "neighborhood_ratio {} outside (0, 1]",
                self.neighborhood_ratio
            )));
        }
        Ok(())
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Best schedule found (the incumbent).
    pub schedule: Schedule,
    /// Objective of `schedule`.
    pub objective: f64,
    /// Objective of the input schedule.
    pub initial_objective: f64,
    /// Conflicts left in `schedule`.
    pub unresolved_conflicts: usize,
    /// Iterations run.
    pub iterations: usize,
    /// Candidates accepted (including sideways moves).
    pub accepted: usize,
    /// Candidates that strictly lowered the objective.
    pub improvements: usize,
    pub elapsed: Duration,
}

impl Refinement {
    /// Objective reduction achieved.
    pub fn gain(&self) -> f64 {
        self.initial_objective - self.objective
    }
}

/// Destroy-and-repair hill climber over schedules.
///
/// # Example
///
/// ```
/// use u_rail::dispatching::SchedulingContext;
/// use u_rail::models::{Network, NetworkElement, Train};
/// use u_rail::refiner::{LocalSearchRefiner, RefinerConfig};
/// use u_rail::scheduler::ConstraintScheduler;
///
/// let network = Network::new(vec![NetworkElement::track("A")]).unwrap();
/// let trains = vec![Train::new("T1").with_route(["A"])];
/// let solution = ConstraintScheduler::new()
///     .solve(&trains, &network, &SchedulingContext::at_time(0))
///     .unwrap();
///
/// let refiner = LocalSearchRefiner::new(RefinerConfig::default().with_seed(7));
/// let refined = refiner.refine(solution.schedule, &trains, &network, 10).unwrap();
/// assert!(refined.objective <= refined.initial_objective);
/// ```
#[derive(Debug, Clone)]
pub struct LocalSearchRefiner {
    config: RefinerConfig,
    solver: SolverConfig,
    rule_engine: RuleEngine,
}

impl LocalSearchRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        Self {
            config,
            solver: SolverConfig::default(),
            rule_engine: RuleEngine::rail_default(),
        }
    }

    /// Sets the problem settings used by [`refine`](Self::refine), including
    /// the repair order named by `solver.ordering`.
    pub fn with_solver_config(mut self, solver: SolverConfig) -> Self {
        self.rule_engine = solver.ordering.rule_engine();
        self.solver = solver;
        self
    }

    /// Sets the repair order used by [`refine`](Self::refine).
    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.rule_engine = engine;
        self
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refines a schedule for the given trains and network.
    ///
    /// Runs at most `iterations` iterations (and at most the configured
    /// wall-clock budget).
    ///
    /// # Errors
    /// [`Error::InvalidInput`] if the schedule's train count or route
    /// lengths differ from `trains`, or an assigned entry lies outside the
    /// horizon; otherwise the errors of [`Problem::build`].
    pub fn refine(
        &self,
        schedule: Schedule,
        trains: &[Train],
        network: &Network,
        iterations: usize,
    ) -> Result<Refinement> {
        let problem = Problem::build(
            trains,
            network,
            &self.solver,
            &self.rule_engine,
            &SchedulingContext::default(),
        )?;
        problem.check_schedule(&schedule)?;
        Ok(self.run(&problem, schedule, iterations))
    }

    /// Refines a schedule of an already built problem.
    ///
    /// The schedule must be laid out by `problem` (see
    /// [`Problem::check_schedule`]).
    pub fn refine_problem(&self, problem: &Problem<'_>, schedule: Schedule) -> Refinement {
        self.run(problem, schedule, self.config.iterations)
    }

    fn run(&self, problem: &Problem<'_>, schedule: Schedule, iterations: usize) -> Refinement {
        let start = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        let mut rng = match self.config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };

        let mut scratch = ConflictScratch::default();
        let mut incumbent = schedule;
        let mut incumbent_conflicts = problem
            .detect_conflicts_with(&incumbent, &mut scratch)
            .len();
        let mut incumbent_objective = problem.objective(&incumbent, incumbent_conflicts);
        let initial_objective = incumbent_objective;

        let k = self
            .config
            .neighborhood_size(problem.network().len(), problem.train_count());
        let mut candidate = incumbent.clone();
        let mut occupancy = Occupancy::new(problem.network().len());
        let mut pool: Vec<TrainIdx> = (0..problem.train_count()).collect();
        let mut destroyed: Vec<TrainIdx> = Vec::with_capacity(k);

        let mut run = 0;
        let mut accepted = 0;
        let mut improvements = 0;

        while run < iterations && k > 0 && start.elapsed() < budget {
            run += 1;
            candidate.copy_from(&incumbent);

            let (chosen, _) = pool.partial_shuffle(&mut rng, k);
            destroyed.clear();
            destroyed.extend_from_slice(chosen);
            destroyed.sort_unstable_by_key(|&t| problem.rank(t));

            for &t in &destroyed {
                candidate.unassign(t);
            }
            problem.fill_occupancy(&candidate, &mut occupancy);

            let repaired = destroyed
                .iter()
                .all(|&t| problem.insert_train(&mut candidate, &mut occupancy, t).is_ok());
            if !repaired {
                trace!("iteration {run}: repair failed for {destroyed:?}");
                continue;
            }

            let conflicts = problem.detect_conflicts_with(&candidate, &mut scratch).len();
            let objective = problem.objective(&candidate, conflicts);
            trace!("iteration {run}: candidate {objective:.1} ({conflicts} conflicts)");

            if objective <= incumbent_objective + EPS && conflicts <= incumbent_conflicts {
                accepted += 1;
                if objective < incumbent_objective - EPS {
                    improvements += 1;
                    debug!(
                        "iteration {run}: objective {incumbent_objective:.1} -> {objective:.1}"
                    );
                }
                std::mem::swap(&mut incumbent, &mut candidate);
                incumbent_objective = objective;
                incumbent_conflicts = conflicts;
            }
        }

        let elapsed = start.elapsed();
        info!(
            "refined in {run} iterations ({accepted} accepted, {improvements} improving): \
             objective {initial_objective:.1} -> {incumbent_objective:.1} in {elapsed:?}"
        );

        Refinement {
            schedule: incumbent,
            objective: incumbent_objective,
            initial_objective,
            unresolved_conflicts: incumbent_conflicts,
            iterations: run,
            accepted,
            improvements,
            elapsed,
        }
    }
}

impl Default for LocalSearchRefiner {
    fn default() -> Self {
        Self::new(RefinerConfig::default())
    }
}
