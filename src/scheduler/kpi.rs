//! Schedule quality metrics (KPIs).
//!
//! Computes dispatching performance indicators from a solved schedule.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Makespan | Latest exit time |
//! | Total Delay | Sum of arrival delays against naive times |
//! | Maximum Delay | Largest single arrival delay |
//! | On-Time Rate | Fraction of trains delayed at most 5 min |
//! | Avg Utilization | Mean element busyness |
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Problem;
use crate::models::{Schedule, VisitRef};

/// Delay up to which a train still counts as on time (minutes).
pub const ON_TIME_TOLERANCE_MIN: i64 = 5;

/// Schedule performance indicators.
///
/// All time values are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleKpi {
    /// Latest exit time (min).
    pub makespan_min: i64,
    /// Sum of arrival delays (min).
    pub total_delay_min: i64,
    /// Largest arrival delay of any single train (min).
    pub max_delay_min: i64,
    /// Fraction of trains on time (0.0..1.0).
    pub on_time_rate: f64,
    /// Average element utilization (0.0..1.0).
    pub avg_utilization: f64,
    /// Per-element utilization, for elements that are used.
    pub utilization_by_element: HashMap<String, f64>,
}

impl ScheduleKpi {
    /// Computes KPIs for a schedule of a problem.
    ///
    /// Utilization is busy time over makespan, divided by capacity.
    pub fn calculate(problem: &Problem<'_>, schedule: &Schedule) -> Self {
        let delays = problem.delays(schedule);
        let network = problem.network();

        let mut makespan = 0;
        let mut busy = vec![0i64; network.len()];
        for t in 0..problem.train_count() {
            for k in 0..problem.route_len(t) {
                let v = VisitRef::new(t, k);
                let visit = problem.visit(v);
                busy[visit.element] += visit.duration_min;
                makespan = makespan.max(schedule.entry(v) + visit.duration_min);
            }
        }

        let utilization_by_element: HashMap<String, f64> = busy
            .iter()
            .enumerate()
            .filter(|(_, b)| **b > 0)
            .map(|(e, &b)| {
                let capacity = network.capacity(e) as f64;
                let util = if makespan > 0 {
                    b as f64 / (makespan as f64 * capacity)
                } else {
                    0.0
                };
                (network.element(e).id.clone(), util)
            })
            .collect();

        let avg_utilization = if utilization_by_element.is_empty() {
            0.0
        } else {
            let sum: f64 = utilization_by_element.values().sum();
            sum / utilization_by_element.len() as f64
        };

        let on_time_rate = if delays.is_empty() {
            1.0
        } else {
            let on_time = delays.iter().filter(|&&d| d <= ON_TIME_TOLERANCE_MIN).count();
            on_time as f64 / delays.len() as f64
        };

        Self {
            makespan_min: makespan,
            total_delay_min: delays.iter().sum(),
            max_delay_min: delays.iter().copied().max().unwrap_or(0),
            on_time_rate,
            avg_utilization,
            utilization_by_element,
        }
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_delay_min: i64, min_utilization: f64) -> bool {
        self.max_delay_min <= max_delay_min && self.avg_utilization >= min_utilization
    }
}
