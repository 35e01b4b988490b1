//! Dispatching rules and rule engine for train ordering.
//!
//! When two trains contend for the same element, the rule engine decides
//! which one goes first. The scheduler ranks every train once per request
//! and turns that rank into fixed ordering arcs.
//!
//! # Usage
//!
//! ```
//! use u_rail::dispatching::{RuleEngine, SchedulingContext};
//! use u_rail::dispatching::rules;
//! use u_rail::models::{Priority, Train};
//!
//! let engine = RuleEngine::new()
//!     .with_rule(rules::Priority)
//!     .with_tie_breaker(rules::CurrentDelay);
//!
//! let trains = vec![
//!     Train::new("FRT-203").with_priority(Priority::Low),
//!     Train::new("EXP-101").with_priority(Priority::High),
//! ];
//! let order = engine.sort_indices(&trains, &SchedulingContext::at_time(0));
//! assert_eq!(trains[order[0]].id, "EXP-101");
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Törnquist (2006), "Computer-based decision support for railway traffic scheduling and dispatching"

mod context;
mod engine;
pub mod rules;

pub use context::{DelayEstimate, SchedulingContext};
pub use engine::{EvaluationMode, RuleEngine, TieBreaker};

use crate::models::Train;
use std::fmt::Debug;

/// Score returned by a dispatching rule.
///
/// Lower scores = higher priority (dispatched first).
pub type RuleScore = f64;

/// A dispatching rule that evaluates train precedence.
///
/// # Score Convention
/// **Lower score = higher priority.** Rules should return smaller values
/// for trains that should pass first.
pub trait DispatchingRule: Send + Sync + Debug {
    /// Rule name (e.g., "PRIORITY", "FIFO").
    fn name(&self) -> &'static str;

    /// Evaluates the precedence of a train given the current context.
    ///
    /// Returns a score where lower = higher priority.
    fn evaluate(&self, train: &Train, context: &SchedulingContext) -> RuleScore;

    /// Rule description.
    fn description(&self) -> &'static str {
        self.name()
    }
}
