//! Destroy-and-repair refinement of feasible schedules.
//!
//! # Algorithm
//!
//! Large neighbourhood search with hill-climbing acceptance:
//!
//! 1. Pick a random neighbourhood of trains.
//! 2. Destroy: unassign their entry times.
//! 3. Repair: re-insert them one at a time in dispatching order at the
//!    earliest slot that respects capacity, route order, release, the
//!    horizon and the ordering arcs towards the trains still in place.
//! 4. Keep the candidate iff its objective is no worse than the incumbent
//!    and it has no more conflicts.
//!
//! The candidate buffer and occupancy profiles are reused across
//! iterations, so an iteration allocates nothing.
//!
//! # References
//!
//! - Shaw (1998), "Using Constraint Programming and Local Search Methods
//!   to Solve Vehicle Routing Problems"
//! - Pisinger & Ropke (2019), "Large Neighborhood Search", Handbook of
//!   Metaheuristics

mod lns;

pub use lns::{LocalSearchRefiner, Refinement, RefinerConfig};
