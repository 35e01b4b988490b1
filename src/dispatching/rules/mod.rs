//! Built-in dispatching rules.
//!
//! # Categories
//!
//! - **Class**: PRIORITY
//! - **Lateness**: CURRENT_DELAY, PREDICTED_DELAY
//! - **Arrival**: FIFO
//!
//! # Score Convention
//! All rules return lower scores for trains that should pass first.

use super::{DispatchingRule, RuleScore, SchedulingContext};
use crate::models::Train;

// ======================== Class rule ========================

/// Train priority class.
///
/// Express before local before freight.
/// (Negated because lower score = higher priority in convention.)
#[derive(Debug, Clone, Copy)]
pub struct Priority;

impl DispatchingRule for Priority {
    fn name(&self) -> &'static str {
        "PRIORITY"
    }

    fn evaluate(&self, train: &Train, _context: &SchedulingContext) -> RuleScore {
        -(train.priority.level() as f64)
    }

    fn description(&self) -> &'static str {
        "Train Priority Class"
    }
}

// ======================== Lateness rules ========================

/// Largest observed delay first.
///
/// Keeps a train that is already late from compounding its lateness.
#[derive(Debug, Clone, Copy)]
pub struct CurrentDelay;

impl DispatchingRule for CurrentDelay {
    fn name(&self) -> &'static str {
        "CURRENT_DELAY"
    }

    fn evaluate(&self, train: &Train, _context: &SchedulingContext) -> RuleScore {
        -(train.current_delay_min as f64)
    }

    fn description(&self) -> &'static str {
        "Largest Current Delay"
    }
}

/// Largest predicted delay first.
///
/// Uses `context.delay_estimates`; the prediction is discounted by its
/// confidence. Trains without a prediction score 0.
#[derive(Debug, Clone, Copy)]
pub struct PredictedDelay;

impl DispatchingRule for PredictedDelay {
    fn name(&self) -> &'static str {
        "PREDICTED_DELAY"
    }

    fn evaluate(&self, train: &Train, context: &SchedulingContext) -> RuleScore {
        context
            .estimate(&train.id)
            .map_or(0.0, |e| -(e.predicted_delay_min * e.confidence))
    }

    fn description(&self) -> &'static str {
        "Largest Predicted Delay"
    }
}

// ======================== Arrival rule ========================

/// First In First Out.
///
/// Orders trains by their release on the first route element.
#[derive(Debug, Clone, Copy)]
pub struct Fifo;

impl DispatchingRule for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn evaluate(&self, train: &Train, _context: &SchedulingContext) -> RuleScore {
        train.release_min() as f64
    }

    fn description(&self) -> &'static str {
        "First In First Out"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority as Class;

    fn make_train(id: &str, class: Class, delay: i64) -> Train {
        Train::new(id)
            .with_route(["A", "B"])
            .with_priority(class)
            .with_current_delay(delay)
    }

    #[test]
    fn test_priority() {
        let ctx = SchedulingContext::at_time(0);
        let express = make_train("E", Class::High, 0);
        let freight = make_train("F", Class::Low, 0);
        assert!(Priority.evaluate(&express, &ctx) < Priority.evaluate(&freight, &ctx));
    }

    #[test]
    fn test_current_delay() {
        let ctx = SchedulingContext::at_time(0);
        let late = make_train("L", Class::Low, 12);
        let early = make_train("E", Class::Low, -3);
        assert!((CurrentDelay.evaluate(&late, &ctx) + 12.0).abs() < 1e-10);
        assert!(CurrentDelay.evaluate(&late, &ctx) < CurrentDelay.evaluate(&early, &ctx));
    }

    #[test]
    fn test_predicted_delay() {
        let ctx = SchedulingContext::at_time(0).with_estimate("L", 20.0, 0.5);
        let train = make_train("L", Class::Low, 0);
        assert!((PredictedDelay.evaluate(&train, &ctx) + 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_predicted_delay_fallback() {
        let ctx = SchedulingContext::at_time(0);
        let train = make_train("L", Class::Low, 0);
        assert!(PredictedDelay.evaluate(&train, &ctx).abs() < 1e-10);
    }

    #[test]
    fn test_fifo() {
        let ctx = SchedulingContext::at_time(0);
        let late = make_train("L", Class::High, 7);
        let early = make_train("E", Class::Low, -5);
        assert!((Fifo.evaluate(&late, &ctx) - 7.0).abs() < 1e-10);
        assert!(Fifo.evaluate(&early, &ctx).abs() < 1e-10);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(Priority.description(), "Train Priority Class");
        assert_eq!(Fifo.name(), "FIFO");
    }
}
