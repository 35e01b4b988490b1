//! Constraint scheduling and KPI evaluation.
//!
//! Builds conflict-free track occupancy for a set of trains sharing a
//! network and measures the result.
//!
//! # Algorithm
//!
//! [`ConstraintScheduler`] turns the conflicts of the unconstrained
//! earliest-time assignment into fixed ordering arcs (higher-ranked train
//! first) and places every visit at its earliest feasible slot in
//! dispatching order. Capacity-1 elements are disjunctive; elements with
//! higher capacity use a cumulative occupancy profile.
//!
//! # KPI
//!
//! [`ScheduleKpi`] computes makespan, delay, on-time rate and element
//! utilization.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3-4
//! - D'Ariano, Pacciarelli & Pranzo (2007), "A branch and bound algorithm
//!   for scheduling trains in a railway network"

mod kpi;
mod objective;
mod occupancy;
mod problem;
mod solver;

pub use kpi::{ScheduleKpi, ON_TIME_TOLERANCE_MIN};
pub use objective::ObjectiveWeights;
pub use occupancy::Occupancy;
pub use problem::{Blocked, ConflictScratch, OrderingArc, Problem, TraversalTimes, Visit};
pub use solver::{ConstraintScheduler, DispatchOrder, ScheduleSolution, SolverConfig};
