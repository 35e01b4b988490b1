//! Conflicts detected while solving.
//!
//! Conflicts are transient: they exist only between construction and
//! refinement and are reported as counts, never persisted.

use serde::Serialize;

use super::{ElementIdx, VisitRef};

/// What kind of hard constraint a conflict breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConflictKind {
    /// Two trains on one element beyond its capacity.
    Capacity,
    /// A train enters its next element before leaving the current one.
    Order,
}

/// A pairwise constraint violation.
///
/// For capacity conflicts `first < second` and both visits use `element`.
/// For order conflicts both visits belong to one train and `element` is
/// the element of `second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub element: ElementIdx,
    pub first: VisitRef,
    pub second: VisitRef,
}

impl Conflict {
    /// Capacity conflict with the visit pair normalized.
    pub fn capacity(element: ElementIdx, a: VisitRef, b: VisitRef) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            kind: ConflictKind::Capacity,
            element,
            first,
            second,
        }
    }

    pub fn order(element: ElementIdx, earlier: VisitRef, later: VisitRef) -> Self {
        Self {
            kind: ConflictKind::Order,
            element,
            first: earlier,
            second: later,
        }
    }

    /// Whether the conflict involves a given train.
    pub fn involves(&self, train: usize) -> bool {
        self.first.train == train || self.second.train == train
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_pair_normalized() {
        let a = VisitRef::new(2, 0);
        let b = VisitRef::new(0, 1);
        let c1 = Conflict::capacity(4, a, b);
        let c2 = Conflict::capacity(4, b, a);
        assert_eq!(c1, c2);
        assert_eq!(c1.first, b);
        assert!(c1.involves(2));
        assert!(!c1.involves(1));
    }

    #[test]
    fn test_order_conflict() {
        let c = Conflict::order(1, VisitRef::new(0, 0), VisitRef::new(0, 1));
        assert_eq!(c.kind, ConflictKind::Order);
        assert!(c.involves(0));
    }
}
