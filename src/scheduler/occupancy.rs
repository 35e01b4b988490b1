//! Per-element occupancy profiles.
//!
//! Each element keeps the half-open windows `[entry, exit)` of the visits
//! placed on it. A new window fits iff the number of simultaneous
//! occupants stays within the element's capacity at every instant of the
//! window (cumulative resource constraint). Touching windows
//! (`exit == entry`) never overlap.
//!
//! # Reference
//! Baptiste, Le Pape & Nuijten (2001), "Constraint-Based Scheduling", Ch. 2.1

use crate::models::{ElementIdx, VisitRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    entry_min: i64,
    exit_min: i64,
    visit: VisitRef,
}

impl Slot {
    #[inline]
    fn covers(&self, t: i64) -> bool {
        self.entry_min <= t && t < self.exit_min
    }

    #[inline]
    fn overlaps(&self, entry_min: i64, exit_min: i64) -> bool {
        self.entry_min < exit_min && entry_min < self.exit_min
    }
}

/// Occupancy profiles for every element of a network.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    slots: Vec<Vec<Slot>>,
}

impl Occupancy {
    /// Creates empty profiles for `element_count` elements.
    pub fn new(element_count: usize) -> Self {
        Self {
            slots: vec![Vec::new(); element_count],
        }
    }

    /// Removes every slot, keeping allocations.
    pub fn clear(&mut self) {
        for slots in &mut self.slots {
            slots.clear();
        }
    }

    /// Records a window on an element.
    pub fn insert(&mut self, element: ElementIdx, entry_min: i64, exit_min: i64, visit: VisitRef) {
        let slots = &mut self.slots[element];
        let pos = slots.partition_point(|s| s.entry_min <= entry_min);
        slots.insert(
            pos,
            Slot {
                entry_min,
                exit_min,
                visit,
            },
        );
    }

    /// Number of windows recorded on an element.
    pub fn len(&self, element: ElementIdx) -> usize {
        self.slots[element].len()
    }

    /// Occupants of an element at instant `t`.
    pub fn load_at(&self, element: ElementIdx, t: i64) -> usize {
        self.slots[element].iter().filter(|s| s.covers(t)).count()
    }

    /// Whether `[entry, entry + duration)` fits within `capacity`.
    ///
    /// Load inside the window can only rise at its start or at the entry of
    /// another slot, so only those instants are checked.
    pub fn fits(&self, element: ElementIdx, entry_min: i64, duration_min: i64, capacity: u32) -> bool {
        let exit_min = entry_min + duration_min;
        let capacity = capacity as usize;
        let slots = &self.slots[element];

        if self.load_at(element, entry_min) >= capacity {
            return false;
        }
        slots
            .iter()
            .filter(|s| s.entry_min > entry_min && s.entry_min < exit_min)
            .all(|s| self.load_at(element, s.entry_min) < capacity)
    }

    /// Earliest entry `>= from` whose window fits.
    ///
    /// The load only drops at slot exits, so candidates are `from` and every
    /// exit after it, tried in ascending order. Once past the last exit the
    /// element is empty, so the scan always ends.
    pub fn earliest_fit(&self, element: ElementIdx, from: i64, duration_min: i64, capacity: u32) -> i64 {
        let mut candidate = from;
        while !self.fits(element, candidate, duration_min, capacity) {
            match self.next_exit_after(element, candidate) {
                Some(exit) => candidate = exit,
                None => break,
            }
        }
        candidate
    }

    fn next_exit_after(&self, element: ElementIdx, t: i64) -> Option<i64> {
        self.slots[element]
            .iter()
            .map(|s| s.exit_min)
            .filter(|&exit| exit > t)
            .min()
    }

    /// An occupant whose window overlaps `[entry, entry + duration)`.
    ///
    /// Picks the one leaving last, which is the train holding the slot the
    /// longest.
    pub fn blocker(&self, element: ElementIdx, entry_min: i64, duration_min: i64) -> Option<VisitRef> {
        self.slots[element]
            .iter()
            .filter(|s| s.overlaps(entry_min, entry_min + duration_min))
            .max_by_key(|s| (s.exit_min, s.visit))
            .map(|s| s.visit)
    }

    /// Total busy time of an element (sum of window lengths).
    pub fn busy_min(&self, element: ElementIdx) -> i64 {
        self.slots[element]
            .iter()
            .map(|s| s.exit_min - s.entry_min)
            .sum()
    }
}
