//! Scheduling problem built from one request.
//!
//! Turns trains and a network into an indexed problem: one visit per
//! (train, route element) pair, each with a traversal duration; the
//! unconstrained earliest ("naive") entry times; the dispatching rank of
//! every train; and the fixed ordering arcs derived from the conflicts of
//! the naive assignment.
//!
//! # Ordering Arcs
//!
//! Every pair of visits that conflicts in the naive assignment is ordered
//! once and for all: the higher-ranked train goes first.
//!
//! | Capacity | Arc |
//! |----------|-----|
//! | 1 | `entry(after) >= entry(before) + traversal(before)` |
//! | > 1 | `entry(after) >= entry(before)`, plus the cumulative profile |
//!
//! Arcs always point from a higher-ranked train to a lower-ranked one, so
//! together with the route chains they form an acyclic precedence graph.
//!
//! # Reference
//! D'Ariano, Pacciarelli & Pranzo (2007), "A branch and bound algorithm for
//! scheduling trains in a railway network"

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{ObjectiveWeights, Occupancy, SolverConfig};
use crate::dispatching::{RuleEngine, SchedulingContext};
use crate::error::{Error, Result};
use crate::models::{
    Assignment, Conflict, ElementIdx, ElementKind, Network, Schedule, Train, TrainIdx,
    TrainTimetable, VisitRef,
};
use crate::validation::ensure_valid;

/// Minimum traversal duration per element kind (minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalTimes {
    pub track_min: i64,
    pub junction_min: i64,
    pub platform_min: i64,
}

impl Default for TraversalTimes {
    fn default() -> Self {
        Self {
            track_min: 3,
            junction_min: 1,
            platform_min: 2,
        }
    }
}

impl TraversalTimes {
    /// Duration for an element kind.
    pub fn for_kind(&self, kind: ElementKind) -> i64 {
        match kind {
            ElementKind::Track => self.track_min,
            ElementKind::Junction => self.junction_min,
            ElementKind::Platform => self.platform_min,
        }
    }

    /// Whether every duration is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.track_min > 0 && self.junction_min > 0 && self.platform_min > 0
    }
}

/// One (train, route element) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub element: ElementIdx,
    pub duration_min: i64,
}

/// Fixed precedence between two visits of different trains on one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingArc {
    pub before: VisitRef,
    pub after: VisitRef,
    /// Minimum gap between the two entries.
    pub lag_min: i64,
}

/// A visit that could not be placed within its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocked {
    pub visit: VisitRef,
    /// Train occupying the element, or forcing the visit late.
    pub blocker: Option<VisitRef>,
}

/// Reusable buffers for [`Problem::detect_conflicts_with`].
#[derive(Debug, Clone, Default)]
pub struct ConflictScratch {
    windows: Vec<Vec<(i64, i64, VisitRef)>>,
    conflicts: Vec<Conflict>,
}

/// Indexed scheduling problem for one request.
#[derive(Debug, Clone)]
pub struct Problem<'a> {
    trains: &'a [Train],
    network: &'a Network,
    visits: Vec<Visit>,
    naive: Schedule,
    order: Vec<TrainIdx>,
    rank: Vec<usize>,
    weights: Vec<f64>,
    objective: ObjectiveWeights,
    horizon_min: i64,
    naive_conflicts: Vec<Conflict>,
    arcs_in: Vec<Vec<OrderingArc>>,
    arcs_out: Vec<Vec<OrderingArc>>,
}

impl<'a> Problem<'a> {
    /// Builds the problem.
    ///
    /// # Errors
    /// - [`Error::InvalidRoute`] if a route names an unknown element
    /// - [`Error::InvalidInput`] for duplicate train ids or empty routes
    /// - [`Error::InvalidConfig`] for a negative horizon or a non-positive
    ///   traversal time
    pub fn build(
        trains: &'a [Train],
        network: &'a Network,
        config: &SolverConfig,
        engine: &RuleEngine,
        context: &SchedulingContext,
    ) -> Result<Self> {
        ensure_valid(trains, network)?;
        config.validate()?;

        let mut naive = Schedule::with_layout(trains.iter().map(Train::route_len));
        let mut visits = Vec::with_capacity(naive.visit_count());
        for (t, train) in trains.iter().enumerate() {
            let route = network.resolve_route(train)?;
            let mut entry = train.release_min();
            for (k, &element) in route.iter().enumerate() {
                let duration_min = config.traversal.for_kind(network.element(element).kind);
                visits.push(Visit {
                    element,
                    duration_min,
                });
                naive.set_entry(VisitRef::new(t, k), entry);
                entry += duration_min;
            }
            naive.assign(t);
        }

        let order = engine.sort_indices(trains, context);
        let mut rank = vec![0; trains.len()];
        for (pos, &t) in order.iter().enumerate() {
            rank[t] = pos;
        }
        let weights = trains
            .iter()
            .map(|train| config.weights.train_weight(train, context))
            .collect();

        let mut problem = Self {
            trains,
            network,
            visits,
            naive,
            order,
            rank,
            weights,
            objective: config.weights.clone(),
            horizon_min: config.horizon_min,
            naive_conflicts: Vec::new(),
            arcs_in: Vec::new(),
            arcs_out: Vec::new(),
        };

        problem.naive_conflicts = problem.detect_conflicts(&problem.naive);
        problem.build_arcs();

        debug!(
            "problem built: {} trains, {} visits, {} naive conflicts",
            problem.train_count(),
            problem.visits.len(),
            problem.naive_conflicts.len()
        );
        Ok(problem)
    }

    fn build_arcs(&mut self) {
        let n = self.visits.len();
        let mut arcs_in = vec![Vec::new(); n];
        let mut arcs_out = vec![Vec::new(); n];

        for conflict in &self.naive_conflicts {
            let (before, after) = if self.rank[conflict.first.train] < self.rank[conflict.second.train] {
                (conflict.first, conflict.second)
            } else {
                (conflict.second, conflict.first)
            };
            let lag_min = if self.network.capacity(conflict.element) == 1 {
                self.visit(before).duration_min
            } else {
                0
            };
            let arc = OrderingArc {
                before,
                after,
                lag_min,
            };
            arcs_in[self.naive.flat_index(after)].push(arc);
            arcs_out[self.naive.flat_index(before)].push(arc);
        }

        debug!("ordering arcs: {}", self.naive_conflicts.len());
        self.arcs_in = arcs_in;
        self.arcs_out = arcs_out;
    }

    // ======================== Accessors ========================

    pub fn trains(&self) -> &'a [Train] {
        self.trains
    }

    pub fn network(&self) -> &'a Network {
        self.network
    }

    pub fn train(&self, t: TrainIdx) -> &'a Train {
        &self.trains[t]
    }

    pub fn train_count(&self) -> usize {
        self.trains.len()
    }

    pub fn route_len(&self, t: TrainIdx) -> usize {
        self.naive.route_len(t)
    }

    #[inline]
    pub fn visit(&self, v: VisitRef) -> &Visit {
        &self.visits[self.naive.flat_index(v)]
    }

    pub fn horizon_min(&self) -> i64 {
        self.horizon_min
    }

    /// Trains in dispatching order (highest precedence first).
    pub fn order(&self) -> &[TrainIdx] {
        &self.order
    }

    /// Dispatching position of a train (0 = first).
    pub fn rank(&self, t: TrainIdx) -> usize {
        self.rank[t]
    }

    /// Objective weight of a train.
    pub fn weight(&self, t: TrainIdx) -> f64 {
        self.weights[t]
    }

    pub fn objective_weights(&self) -> &ObjectiveWeights {
        &self.objective
    }

    /// Unconstrained earliest entry times.
    pub fn naive(&self) -> &Schedule {
        &self.naive
    }

    pub fn naive_conflicts(&self) -> &[Conflict] {
        &self.naive_conflicts
    }

    pub fn arcs_into(&self, v: VisitRef) -> &[OrderingArc] {
        &self.arcs_in[self.naive.flat_index(v)]
    }

    pub fn arcs_from(&self, v: VisitRef) -> &[OrderingArc] {
        &self.arcs_out[self.naive.flat_index(v)]
    }

    /// Iterates over all ordering arcs.
    pub fn arcs(&self) -> impl Iterator<Item = &OrderingArc> {
        self.arcs_in.iter().flatten()
    }

    /// An all-unassigned schedule with this problem's layout.
    pub fn empty_schedule(&self) -> Schedule {
        let mut schedule = self.naive.clone();
        for t in 0..self.train_count() {
            schedule.unassign(t);
        }
        schedule
    }

    // ======================== Placement ========================

    /// Earliest entry allowed by route order, release and arcs from placed
    /// trains, with the arc source that set it (if any).
    pub fn lower_bound(&self, schedule: &Schedule, v: VisitRef) -> (i64, Option<VisitRef>) {
        let mut bound = if v.visit == 0 {
            self.trains[v.train].release_min()
        } else {
            let prev = VisitRef::new(v.train, v.visit - 1);
            schedule.entry(prev) + self.visit(prev).duration_min
        };
        let mut source = None;
        for arc in self.arcs_into(v) {
            if !schedule.is_assigned(arc.before.train) {
                continue;
            }
            let candidate = schedule.entry(arc.before) + arc.lag_min;
            if candidate > bound {
                bound = candidate;
                source = Some(arc.before);
            }
        }
        (bound, source)
    }

    /// Latest entry allowed by the horizon and arcs into placed trains.
    pub fn upper_bound(&self, schedule: &Schedule, v: VisitRef) -> i64 {
        self.arcs_from(v)
            .iter()
            .filter(|arc| schedule.is_assigned(arc.after.train))
            .map(|arc| schedule.entry(arc.after) - arc.lag_min)
            .fold(self.horizon_min, i64::min)
    }

    /// Places a visit at its earliest feasible entry.
    ///
    /// On success the visit is recorded in `occupancy`; the train is not
    /// marked assigned.
    pub fn insert_visit(
        &self,
        schedule: &mut Schedule,
        occupancy: &mut Occupancy,
        v: VisitRef,
    ) -> std::result::Result<i64, Blocked> {
        let visit = *self.visit(v);
        let (lower, source) = self.lower_bound(schedule, v);
        let upper = self.upper_bound(schedule, v);
        let capacity = self.network.capacity(visit.element);

        let entry = occupancy.earliest_fit(visit.element, lower, visit.duration_min, capacity);
        if entry > upper {
            let blocker = occupancy
                .blocker(visit.element, lower, visit.duration_min)
                .or(source);
            return Err(Blocked { visit: v, blocker });
        }

        schedule.set_entry(v, entry);
        occupancy.insert(visit.element, entry, entry + visit.duration_min, v);
        Ok(entry)
    }

    /// Places every visit of a train and marks it assigned.
    pub fn insert_train(
        &self,
        schedule: &mut Schedule,
        occupancy: &mut Occupancy,
        t: TrainIdx,
    ) -> std::result::Result<(), Blocked> {
        for k in 0..self.route_len(t) {
            self.insert_visit(schedule, occupancy, VisitRef::new(t, k))?;
        }
        schedule.assign(t);
        Ok(())
    }

    /// Places a visit at its lower bound, ignoring capacity.
    ///
    /// The horizon still applies: a lower bound past it fails with the arc
    /// source as blocker.
    pub fn place_unchecked(
        &self,
        schedule: &mut Schedule,
        v: VisitRef,
    ) -> std::result::Result<i64, Blocked> {
        let (lower, source) = self.lower_bound(schedule, v);
        if lower > self.horizon_min {
            return Err(Blocked {
                visit: v,
                blocker: source,
            });
        }
        schedule.set_entry(v, lower);
        Ok(lower)
    }

    /// Rebuilds occupancy profiles from the assigned trains of a schedule.
    pub fn fill_occupancy(&self, schedule: &Schedule, occupancy: &mut Occupancy) {
        occupancy.clear();
        for t in (0..self.train_count()).filter(|&t| schedule.is_assigned(t)) {
            for v in schedule.visits(t) {
                let visit = self.visit(v);
                let entry = schedule.entry(v);
                occupancy.insert(visit.element, entry, entry + visit.duration_min, v);
            }
        }
    }

    /// Converts a failed placement into a diagnostic error.
    pub fn infeasible(&self, blocked: Blocked) -> Error {
        Error::InfeasibleSchedule {
            element_id: self
                .network
                .element(self.visit(blocked.visit).element)
                .id
                .clone(),
            train_id: self.trains[blocked.visit.train].id.clone(),
            blocking_train_id: blocked.blocker.map(|b| self.trains[b.train].id.clone()),
            horizon_min: self.horizon_min,
        }
    }

    // ======================== Evaluation ========================

    /// Detects every conflict among the assigned trains.
    ///
    /// Capacity conflicts are reported once per visit pair; a pair on an
    /// element with capacity > 1 conflicts only if the load exceeds the
    /// capacity somewhere inside its common window.
    pub fn detect_conflicts(&self, schedule: &Schedule) -> Vec<Conflict> {
        let mut scratch = ConflictScratch::default();
        self.detect_conflicts_with(schedule, &mut scratch);
        scratch.conflicts
    }

    /// [`detect_conflicts`](Self::detect_conflicts) into reused buffers.
    pub fn detect_conflicts_with<'s>(
        &self,
        schedule: &Schedule,
        scratch: &'s mut ConflictScratch,
    ) -> &'s [Conflict] {
        let ConflictScratch { windows, conflicts } = scratch;
        windows.resize_with(self.network.len(), Vec::new);
        windows.iter_mut().for_each(Vec::clear);
        conflicts.clear();

        for t in (0..self.train_count()).filter(|&t| schedule.is_assigned(t)) {
            for v in schedule.visits(t) {
                let visit = self.visit(v);
                let entry = schedule.entry(v);
                windows[visit.element].push((entry, entry + visit.duration_min, v));

                if v.visit + 1 < schedule.route_len(t) {
                    let next = VisitRef::new(t, v.visit + 1);
                    if schedule.entry(next) < entry + visit.duration_min {
                        conflicts.push(Conflict::order(self.visit(next).element, v, next));
                    }
                }
            }
        }

        for (element, list) in windows.iter_mut().enumerate() {
            list.sort_unstable();
            let list = &*list;
            let capacity = self.network.capacity(element) as usize;
            for i in 0..list.len() {
                let (si, ei, vi) = list[i];
                for &(sj, ej, vj) in &list[i + 1..] {
                    if sj >= ei {
                        break;
                    }
                    if vi.train == vj.train {
                        continue;
                    }
                    let (lo, hi) = (si.max(sj), ei.min(ej));
                    if capacity == 1 || Self::overloaded(list, lo, hi, capacity) {
                        conflicts.push(Conflict::capacity(element, vi, vj));
                    }
                }
            }
        }

        conflicts
    }

    fn overloaded(list: &[(i64, i64, VisitRef)], lo: i64, hi: i64, capacity: usize) -> bool {
        let load = |t: i64| list.iter().filter(|&&(s, e, _)| s <= t && t < e).count();
        load(lo) > capacity
            || list
                .iter()
                .filter(|&&(s, _, _)| s > lo && s < hi)
                .any(|&(s, _, _)| load(s) > capacity)
    }

    /// Number of naive conflicts absent from `remaining`.
    pub fn resolved_count(&self, remaining: &[Conflict]) -> usize {
        let remaining: HashSet<&Conflict> = remaining.iter().collect();
        self.naive_conflicts
            .iter()
            .filter(|c| !remaining.contains(c))
            .count()
    }

    /// Arrival delay of a train against its naive times (minutes).
    pub fn arrival_delay(&self, schedule: &Schedule, t: TrainIdx) -> i64 {
        let last = self.route_len(t).saturating_sub(1);
        let v = VisitRef::new(t, last);
        (schedule.entry(v) - self.naive.entry(v)).max(0)
    }

    /// Per-train arrival delays.
    pub fn delays(&self, schedule: &Schedule) -> Vec<i64> {
        (0..self.train_count())
            .map(|t| self.arrival_delay(schedule, t))
            .collect()
    }

    /// Unweighted sum of arrival delays (minutes).
    pub fn total_delay(&self, schedule: &Schedule) -> i64 {
        self.delays(schedule).iter().sum()
    }

    /// Objective value given the number of unresolved conflicts.
    pub fn objective(&self, schedule: &Schedule, unresolved: usize) -> f64 {
        let delays = (0..self.train_count()).map(|t| self.arrival_delay(schedule, t));
        self.objective.evaluate(delays, &self.weights, unresolved)
    }

    /// Checks that a schedule was laid out for this problem and that every
    /// assigned entry lies in `[0, horizon]`.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] naming the first mismatching train.
    pub fn check_schedule(&self, schedule: &Schedule) -> Result<()> {
        if schedule.train_count() != self.train_count() {
            return Err(Error::InvalidInput(format!(
                "schedule covers {} trains, request has {}",
                schedule.train_count(),
                self.train_count()
            )));
        }
        for (t, train) in self.trains.iter().enumerate() {
            if schedule.route_len(t) != self.route_len(t) {
                return Err(Error::InvalidInput(format!(
                    "schedule has {} entries for train '{}', route has {}",
                    schedule.route_len(t),
                    train.id,
                    self.route_len(t)
                )));
            }
            if schedule.is_assigned(t)
                && schedule
                    .entries(t)
                    .iter()
                    .any(|&e| e < 0 || e > self.horizon_min)
            {
                return Err(Error::InvalidInput(format!(
                    "train '{}' has an entry outside [0, {}]",
                    train.id, self.horizon_min
                )));
            }
        }
        Ok(())
    }

    /// Whether a schedule satisfies every hard constraint and ordering arc.
    pub fn is_feasible(&self, schedule: &Schedule) -> bool {
        if !schedule.is_complete() || schedule.visit_count() != self.visits.len() {
            return false;
        }
        for t in 0..self.train_count() {
            let entries = schedule.entries(t);
            if entries.first().is_some_and(|&e| e < self.trains[t].release_min()) {
                return false;
            }
            if entries.iter().any(|&e| e < 0 || e > self.horizon_min) {
                return false;
            }
        }
        self.arcs()
            .all(|arc| schedule.entry(arc.after) >= schedule.entry(arc.before) + arc.lag_min)
            && self.detect_conflicts(schedule).is_empty()
    }

    // ======================== Conversion ========================

    /// Per-train timetables of a schedule.
    pub fn timetable(&self, schedule: &Schedule) -> Vec<TrainTimetable> {
        self.trains
            .iter()
            .enumerate()
            .map(|(t, train)| {
                let timing = schedule
                    .visits(t)
                    .map(|v| {
                        let visit = self.visit(v);
                        let entry = schedule.entry(v);
                        Assignment::new(
                            &self.network.element(visit.element).id,
                            entry,
                            entry + visit.duration_min,
                        )
                    })
                    .collect();
                TrainTimetable {
                    train_id: train.id.clone(),
                    route: train.route.clone(),
                    timing,
                    delay_min: self.arrival_delay(schedule, t),
                }
            })
            .collect()
    }

    /// Builds a complete schedule from per-train entry lists.
    ///
    /// Returns `None` if a train is missing, its entry count does not
    /// match its route, or an entry lies outside `[0, horizon]`.
    pub fn schedule_from_entries(&self, entries: &HashMap<String, Vec<i64>>) -> Option<Schedule> {
        let mut schedule = self.empty_schedule();
        for (t, train) in self.trains.iter().enumerate() {
            let list = entries.get(&train.id)?;
            if list.len() != self.route_len(t)
                || list.iter().any(|&e| e < 0 || e > self.horizon_min)
            {
                return None;
            }
            schedule.entries_mut(t).copy_from_slice(list);
            schedule.assign(t);
        }
        Some(schedule)
    }
}
