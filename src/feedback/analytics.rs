//! Feedback analytics.
//!
//! [`aggregate`] is a pure function over a slice of feedback records, so
//! the store can compute analytics from a snapshot without holding locks.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DecisionCategory;
use super::record::FeedbackRecord;

/// Which feedback records an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    #[default]
    All,
    /// The most recent `n` records.
    LastRecords(usize),
    /// Records from the last `n` days.
    LastDays(u32),
}

/// Counts for one decision category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted over resolved, `None` with no records.
    pub acceptance_rate: Option<f64>,
}

/// Aggregate view of controller feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub window: Window,
    pub total_feedback: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// 0 with no records.
    pub acceptance_rate: f64,
    /// 0 with no records.
    pub mean_score: f64,
    pub by_category: BTreeMap<DecisionCategory, CategoryStats>,
    /// Feedback count per UTC hour of day.
    pub hourly_activity: [usize; 24],
    /// Decisions still awaiting a controller.
    pub pending_decisions: usize,
}

/// Aggregates the records inside `window`.
///
/// `records` must be in append order; `now` anchors day windows.
pub fn aggregate(
    records: &[FeedbackRecord],
    window: Window,
    now: DateTime<Utc>,
    pending_decisions: usize,
) -> Analytics {
    let selected: Vec<&FeedbackRecord> = match window {
        Window::All => records.iter().collect(),
        Window::LastRecords(n) => records[records.len().saturating_sub(n)..].iter().collect(),
        // A span reaching past the calendar's range covers every record.
        Window::LastDays(days) => match Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
        {
            Some(since) => records.iter().filter(|r| r.recorded_at >= since).collect(),
            None => records.iter().collect(),
        },
    };

    let mut by_category: BTreeMap<DecisionCategory, CategoryStats> = BTreeMap::new();
    let mut hourly_activity = [0usize; 24];
    let mut accepted = 0;
    let mut score_sum = 0.0;

    for record in &selected {
        let stats = by_category.entry(record.category).or_default();
        stats.count += 1;
        if record.is_accept() {
            stats.accepted += 1;
            accepted += 1;
        } else {
            stats.rejected += 1;
        }
        hourly_activity[record.recorded_at.hour() as usize] += 1;
        score_sum += record.score;
    }
    for stats in by_category.values_mut() {
        stats.acceptance_rate = Some(stats.accepted as f64 / stats.count as f64);
    }

    let total = selected.len();
    let ratio = |x: f64| if total > 0 { x / total as f64 } else { 0.0 };
    Analytics {
        window,
        total_feedback: total,
        accepted,
        rejected: total - accepted,
        acceptance_rate: ratio(accepted as f64),
        mean_score: ratio(score_sum),
        by_category,
        hourly_activity,
        pending_decisions,
    }
}
