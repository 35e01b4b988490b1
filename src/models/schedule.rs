//! Schedule (solution) model.
//!
//! A schedule assigns an entry time to every (train, route element) visit.
//! Entries live in one flat arena addressed by index, so the refiner can
//! destroy and repair trains without reallocating.

use serde::{Deserialize, Serialize};

/// Index of a train inside a scheduling problem.
pub type TrainIdx = usize;

/// Address of one visit: the `visit`-th route element of `train`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisitRef {
    pub train: TrainIdx,
    pub visit: usize,
}

impl VisitRef {
    #[inline]
    pub fn new(train: TrainIdx, visit: usize) -> Self {
        Self { train, visit }
    }
}

/// Entry-time arena for a set of trains.
///
/// `offsets[t]..offsets[t + 1]` is the slice of `entries` holding train
/// `t`'s route entries in route order. A train whose entries were
/// destroyed is marked unassigned until it is repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    offsets: Vec<usize>,
    entries: Vec<i64>,
    assigned: Vec<bool>,
}

impl Schedule {
    /// Creates an all-unassigned schedule for the given route lengths.
    pub fn with_layout<I>(route_lengths: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut offsets = vec![0];
        for len in route_lengths {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + len);
        }
        let visit_count = offsets[offsets.len() - 1];
        let train_count = offsets.len() - 1;
        Self {
            offsets,
            entries: vec![0; visit_count],
            assigned: vec![false; train_count],
        }
    }

    #[inline]
    pub fn train_count(&self) -> usize {
        self.assigned.len()
    }

    #[inline]
    pub fn visit_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn route_len(&self, train: TrainIdx) -> usize {
        self.offsets[train + 1] - self.offsets[train]
    }

    /// Position of a visit in the flat arena.
    #[inline]
    pub fn flat_index(&self, visit: VisitRef) -> usize {
        self.offsets[visit.train] + visit.visit
    }

    #[inline]
    pub fn entry(&self, visit: VisitRef) -> i64 {
        self.entries[self.flat_index(visit)]
    }

    #[inline]
    pub fn set_entry(&mut self, visit: VisitRef, entry_min: i64) {
        let idx = self.flat_index(visit);
        self.entries[idx] = entry_min;
    }

    /// Entries of one train in route order.
    pub fn entries(&self, train: TrainIdx) -> &[i64] {
        &self.entries[self.offsets[train]..self.offsets[train + 1]]
    }

    pub fn entries_mut(&mut self, train: TrainIdx) -> &mut [i64] {
        let (start, end) = (self.offsets[train], self.offsets[train + 1]);
        &mut self.entries[start..end]
    }

    /// Visits of one train in route order.
    pub fn visits(&self, train: TrainIdx) -> impl Iterator<Item = VisitRef> {
        (0..self.route_len(train)).map(move |v| VisitRef::new(train, v))
    }

    #[inline]
    pub fn is_assigned(&self, train: TrainIdx) -> bool {
        self.assigned[train]
    }

    pub fn assign(&mut self, train: TrainIdx) {
        self.assigned[train] = true;
    }

    /// Destroys a train's assignment (entries are kept but ignored).
    pub fn unassign(&mut self, train: TrainIdx) {
        self.assigned[train] = false;
    }

    /// Whether every train has entries.
    pub fn is_complete(&self) -> bool {
        self.assigned.iter().all(|&a| a)
    }

    /// Overwrites `self` with `other`, reusing existing allocations.
    pub fn copy_from(&mut self, other: &Schedule) {
        self.offsets.clone_from(&other.offsets);
        self.entries.clone_from(&other.entries);
        self.assigned.clone_from(&other.assigned);
    }
}

/// Timing of one route element in a published timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Element id.
    pub element_id: String,
    /// Entry offset from the epoch (minutes).
    pub entry_min: i64,
    /// Exit offset from the epoch (minutes).
    pub exit_min: i64,
}

impl Assignment {
    pub fn new(element_id: impl Into<String>, entry_min: i64, exit_min: i64) -> Self {
        Self {
            element_id: element_id.into(),
            entry_min,
            exit_min,
        }
    }

    /// Occupancy duration (minutes).
    #[inline]
    pub fn duration_min(&self) -> i64 {
        self.exit_min - self.entry_min
    }
}

/// Published per-train timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTimetable {
    pub train_id: String,
    /// Route element ids in travel order.
    pub route: Vec<String>,
    /// Per-element timing, parallel to `route`.
    pub timing: Vec<Assignment>,
    /// Arrival delay against the unconstrained earliest times (minutes).
    pub delay_min: i64,
}

impl TrainTimetable {
    /// Entry time on the first visit of an element.
    pub fn entry_on(&self, element_id: &str) -> Option<i64> {
        self.timing
            .iter()
            .find(|a| a.element_id == element_id)
            .map(|a| a.entry_min)
    }

    /// Exit time from the last element.
    pub fn completion_min(&self) -> Option<i64> {
        self.timing.last().map(|a| a.exit_min)
    }
}
