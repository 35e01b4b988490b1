//! Precedence engine that ranks contending trains.
//!
//! Rules are scored once per train, then compared lexicographically or as
//! a weighted sum. A final tie-breaker makes the order total.
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::cmp::Ordering;
use std::sync::Arc;

use super::{rules, DispatchingRule, RuleScore, SchedulingContext};
use crate::models::Train;

/// How multiple rules are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Lexicographic: a later rule only decides when all earlier rules tie.
    #[default]
    Sequential,
    /// A single weighted sum over all rule scores.
    Weighted,
}

/// Final ordering once every rule ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreaker {
    /// Keep input order (the sort is stable).
    #[default]
    NextRule,
    /// Lexicographic train id.
    ById,
}

/// A composable rule engine for train precedence.
///
/// Rules added with [`with_tie_breaker`](Self::with_tie_breaker) carry
/// weight 0, so they only matter in [`EvaluationMode::Sequential`].
///
/// # Example
/// ```
/// use u_rail::dispatching::{RuleEngine, TieBreaker};
/// use u_rail::dispatching::rules;
///
/// let engine = RuleEngine::new()
///     .with_rule(rules::Priority)
///     .with_tie_breaker(rules::CurrentDelay)
///     .with_final_tie_breaker(TieBreaker::ById);
/// ```
#[derive(Clone)]
pub struct RuleEngine {
    rules: Vec<(Arc<dyn DispatchingRule>, f64)>,
    mode: EvaluationMode,
    tie_breaker: TieBreaker,
    epsilon: f64,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: EvaluationMode::Sequential,
            tie_breaker: TieBreaker::NextRule,
            epsilon: 1e-9,
        }
    }

    /// Dispatching order used by the scheduler.
    ///
    /// Higher priority first; equal priorities go by larger current delay,
    /// then by train id.
    pub fn rail_default() -> Self {
        Self::new()
            .with_rule(rules::Priority)
            .with_tie_breaker(rules::CurrentDelay)
            .with_final_tie_breaker(TieBreaker::ById)
    }

    /// First-come-first-served order, ignoring priority.
    pub fn fifo() -> Self {
        Self::new()
            .with_rule(rules::Fifo)
            .with_final_tie_breaker(TieBreaker::ById)
    }

    /// Risk-aware order: priority class, then confidence-weighted predicted
    /// delay, then current delay.
    pub fn risk_aware() -> Self {
        Self::new()
            .with_rule(rules::Priority)
            .with_tie_breaker(rules::PredictedDelay)
            .with_tie_breaker(rules::CurrentDelay)
            .with_final_tie_breaker(TieBreaker::ById)
    }

    pub fn with_rule<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.with_weighted_rule(rule, 1.0)
    }

    pub fn with_weighted_rule<R: DispatchingRule + 'static>(
        mut self,
        rule: R,
        weight: f64,
    ) -> Self {
        self.rules.push((Arc::new(rule), weight));
        self
    }

    pub fn with_tie_breaker<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.with_weighted_rule(rule, 0.0)
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_final_tie_breaker(mut self, tie_breaker: TieBreaker) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    /// Indices into `trains`, highest precedence first.
    pub fn sort_indices(&self, trains: &[Train], context: &SchedulingContext) -> Vec<usize> {
        // One score row per train; sequential mode compares rows column by column.
        let rows: Vec<Vec<RuleScore>> = trains
            .iter()
            .map(|train| match self.mode {
                EvaluationMode::Sequential => self
                    .rules
                    .iter()
                    .map(|(rule, _)| rule.evaluate(train, context))
                    .collect(),
                EvaluationMode::Weighted => vec![self.evaluate(train, context).iter().sum()],
            })
            .collect();

        let mut indices: Vec<usize> = (0..trains.len()).collect();
        indices.sort_by(|&a, &b| {
            self.compare_rows(&rows[a], &rows[b])
                .then_with(|| self.final_tie(&trains[a], &trains[b]))
        });
        indices
    }

    /// Weighted score of each rule for one train.
    pub fn evaluate(&self, train: &Train, context: &SchedulingContext) -> Vec<RuleScore> {
        self.rules
            .iter()
            .map(|(rule, weight)| rule.evaluate(train, context) * weight)
            .collect()
    }

    fn compare_rows(&self, a: &[RuleScore], b: &[RuleScore]) -> Ordering {
        a.iter()
            .zip(b)
            .find(|(x, y)| (*x - *y).abs() > self.epsilon)
            .map_or(Ordering::Equal, |(x, y)| x.total_cmp(y))
    }

    fn final_tie(&self, a: &Train, b: &Train) -> Ordering {
        match self.tie_breaker {
            TieBreaker::NextRule => Ordering::Equal,
            TieBreaker::ById => a.id.cmp(&b.id),
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules: Vec<String> = self
            .rules
            .iter()
            .map(|(rule, weight)| format!("{}(w={weight})", rule.name()))
            .collect();
        f.debug_struct("RuleEngine")
            .field("rules", &rules)
            .field("mode", &self.mode)
            .field("tie_breaker", &self.tie_breaker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn make_train(id: &str, priority: Priority, delay: i64) -> Train {
        Train::new(id)
            .with_route(["A"])
            .with_priority(priority)
            .with_current_delay(delay)
    }

    #[test]
    fn test_priority_ordering() {
        let trains = vec![
            make_train("FRT-203", Priority::Low, 0),
            make_train("EXP-101", Priority::High, 0),
            make_train("LOC-78", Priority::Medium, 0),
        ];
        let ctx = SchedulingContext::at_time(0);
        let engine = RuleEngine::new().with_rule(rules::Priority);

        let indices = engine.sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "EXP-101");
        assert_eq!(trains[indices[1]].id, "LOC-78");
        assert_eq!(trains[indices[2]].id, "FRT-203");
    }

    #[test]
    fn test_equal_priority_more_delayed_first() {
        let trains = vec![
            make_train("L1", Priority::Medium, 2),
            make_train("L2", Priority::Medium, 9),
        ];
        let ctx = SchedulingContext::at_time(0);

        let indices = RuleEngine::rail_default().sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "L2");
    }

    #[test]
    fn test_by_id_tie_breaker() {
        let trains = vec![
            make_train("B", Priority::Low, 0),
            make_train("A", Priority::Low, 0),
        ];
        let ctx = SchedulingContext::at_time(0);

        let indices = RuleEngine::rail_default().sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "A");
    }

    #[test]
    fn test_fifo_ignores_priority() {
        let trains = vec![
            make_train("EXP", Priority::High, 6),
            make_train("FRT", Priority::Low, 0),
        ];
        let ctx = SchedulingContext::at_time(0);

        let indices = RuleEngine::fifo().sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "FRT");
    }

    #[test]
    fn test_weighted_mode() {
        let trains = vec![
            make_train("A", Priority::Low, 0).with_route(["X"]),
            make_train("B", Priority::Low, 0),
        ];
        let ctx = SchedulingContext::at_time(0).with_estimate("B", 60.0, 1.0);
        let engine = RuleEngine::new()
            .with_mode(EvaluationMode::Weighted)
            .with_weighted_rule(rules::Priority, 1.0)
            .with_weighted_rule(rules::PredictedDelay, 0.5);

        let indices = engine.sort_indices(&trains, &ctx);
        // A: 0 + 0 = 0, B: 0 + 0.5 * -60 = -30
        assert_eq!(trains[indices[0]].id, "B");
    }

    #[test]
    fn test_risk_aware_prefers_predicted_lateness() {
        let trains = vec![
            make_train("A", Priority::Medium, 10),
            make_train("B", Priority::Medium, 0),
        ];
        let ctx = SchedulingContext::at_time(0).with_estimate("B", 40.0, 0.9);

        assert_eq!(RuleEngine::rail_default().sort_indices(&trains, &ctx), vec![0, 1]);
        assert_eq!(RuleEngine::risk_aware().sort_indices(&trains, &ctx), vec![1, 0]);
    }

    #[test]
    fn test_empty_trains() {
        let ctx = SchedulingContext::at_time(0);
        let engine = RuleEngine::rail_default();
        assert!(engine.sort_indices(&[], &ctx).is_empty());
    }

    #[test]
    fn test_evaluate_scores() {
        let train = make_train("T1", Priority::Medium, 4);
        let ctx = SchedulingContext::at_time(0);
        let engine = RuleEngine::new()
            .with_rule(rules::Priority)
            .with_rule(rules::CurrentDelay);

        let scores = engine.evaluate(&train, &ctx);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] + 1.0).abs() < 1e-10);
        assert!((scores[1] + 4.0).abs() < 1e-10);
    }
}
