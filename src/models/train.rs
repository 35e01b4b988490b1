//! Train (itinerary) model.
//!
//! A train is the unit being scheduled: an ordered route over network
//! elements, a priority class, and the delay observed at request time.
//!
//! # Time Representation
//! All times are whole minutes relative to a scheduling epoch (t=0).
//! A negative current delay means the train is running early.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Priority class, ordered low < medium < high.
///
/// Serialized as its level (0 = freight, 1 = local, 2 = express).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    /// Freight.
    #[default]
    Low = 0,
    /// Local passenger service.
    Medium = 1,
    /// Express passenger service.
    High = 2,
}

impl Priority {
    /// Numeric level (0..=2).
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Service label for the class.
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "freight",
            Priority::Medium => "local",
            Priority::High => "express",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            other => Err(Error::InvalidInput(format!(
                "priority level {other} outside 0..=2"
            ))),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A train to be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Unique train identifier (e.g. "EXP-101").
    pub id: String,
    /// Ordered element ids the train traverses.
    pub route: Vec<String>,
    /// Priority class.
    #[serde(default)]
    pub priority: Priority,
    /// Observed delay at request time (minutes, negative = early).
    #[serde(rename = "current_delay", default)]
    pub current_delay_min: i64,
}

impl Train {
    /// Creates a train with an empty route.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            route: Vec::new(),
            priority: Priority::Low,
            current_delay_min: 0,
        }
    }

    /// Sets the route.
    pub fn with_route<I, S>(mut self, route: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route = route.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the priority class.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the observed delay (minutes).
    pub fn with_current_delay(mut self, delay_min: i64) -> Self {
        self.current_delay_min = delay_min;
        self
    }

    /// Earliest entry on the first route element.
    ///
    /// A late train cannot be scheduled as if it were on time; an early
    /// train is still bounded by the epoch.
    #[inline]
    pub fn release_min(&self) -> i64 {
        self.current_delay_min.max(0)
    }

    /// Number of route elements.
    pub fn route_len(&self) -> usize {
        self.route.len()
    }
}
