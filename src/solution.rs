//! Solution representation and manipulation.
//!
//! A solution maps every vehicle to a [`Route`], an ordered list of
//! depot-to-depot [`Trip`]s. Trips store their computed schedule so that
//! callers can read arrival times without re-evaluating.

use crate::evaluation::{self, Rejection};
use crate::instance::{Instance, DEPOT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One depot-to-depot excursion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Requests in visiting order; the depot is implicit at both ends
    pub requests: Vec<usize>,
    /// Departure time from the depot
    pub departure: f64,
    /// Service start time at each request
    pub service_starts: Vec<f64>,
    /// Arrival time back at the depot
    pub return_time: f64,
    /// Travelled distance, depot edges included
    pub distance: f64,
}

impl Trip {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.return_time - self.departure
    }

    /// The full node sequence `0, r1, .., rk, 0`
    pub fn path(&self) -> Vec<usize> {
        let mut path = Vec::with_capacity(self.requests.len() + 2);
        path.push(DEPOT);
        path.extend(self.requests.iter().copied());
        path.push(DEPOT);
        path
    }
}

/// The trips of one vehicle, in time order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle: usize,
    pub trips: Vec<Trip>,
}

impl Route {
    pub fn new(vehicle: usize) -> Self {
        Route { vehicle, trips: Vec::new() }
    }

    pub fn distance(&self) -> f64 {
        self.trips.iter().map(|t| t.distance).sum()
    }

    pub fn num_requests(&self) -> usize {
        self.trips.iter().map(Trip::len).sum()
    }

    /// Request lists of every trip
    pub fn sequences(&self) -> Vec<Vec<usize>> {
        self.trips.iter().map(|t| t.requests.clone()).collect()
    }
}

/// A broken constraint found by full evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Violation {
    /// Request appears in more than one stop
    Duplicate { request: usize },
    /// Stop refers to a request that does not exist
    UnknownRequest { request: usize },
    /// Constraint broken inside a vehicle's schedule
    Route { vehicle: usize, trip: Option<usize>, cause: Rejection },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Duplicate { request } => write!(f, "request {} is served more than once", request),
            Violation::UnknownRequest { request } => write!(f, "unknown request {}", request),
            Violation::Route { vehicle, trip: Some(trip), cause } => {
                write!(f, "vehicle {} trip {}: {}", vehicle, trip, cause)
            }
            Violation::Route { vehicle, trip: None, cause } => write!(f, "vehicle {}: {}", vehicle, cause),
        }
    }
}

/// Why a driver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    IterationLimit,
    /// Wall-clock budget exhausted
    TimeLimit,
    /// Too many outer iterations without improvement
    Stagnation,
}

/// Counters collected by the drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    pub solutions_explored: usize,
    pub feasible_solutions: usize,
    pub improvements: usize,
    pub moves_applied: usize,
}

impl SearchStats {
    pub fn absorb(&mut self, other: &SearchStats) {
        self.solutions_explored += other.solutions_explored;
        self.feasible_solutions += other.feasible_solutions;
        self.improvements += other.improvements;
        self.moves_applied += other.moves_applied;
    }
}

/// Final pheromone values of an ACS run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PheromoneSnapshot {
    /// Indexed `[request][vehicle]`, row 0 unused
    pub assignment: Vec<Vec<f64>>,
    /// Indexed `[node][node]`
    pub routing: Vec<Vec<f64>>,
}

/// Represents a solution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// One route per vehicle, `routes[k].vehicle == k`
    pub routes: Vec<Route>,
    /// Total travelled distance
    pub cost: f64,
    /// Every request served and no violation
    pub feasible: bool,
    /// Requests not served by any trip
    pub unassigned: Vec<usize>,
    pub violations: Vec<Violation>,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of outer iterations (if applicable)
    pub iterations: Option<usize>,
    pub termination: Option<Termination>,
    pub stats: SearchStats,
    /// Final pheromone matrices (ACS only)
    pub pheromone: Option<PheromoneSnapshot>,
    /// Reference cost from an exact method
    pub reference_cost: Option<f64>,
}

impl Solution {
    /// Create an empty solution for `num_vehicles` vehicles
    pub fn new(num_vehicles: usize) -> Self {
        Solution {
            routes: (0..num_vehicles).map(Route::new).collect(),
            cost: 0.0,
            feasible: false,
            unassigned: Vec::new(),
            violations: Vec::new(),
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
            termination: None,
            stats: SearchStats::default(),
            pheromone: None,
            reference_cost: None,
        }
    }

    /// Create a solution from per-vehicle trip sequences and evaluate it.
    ///
    /// Requests missing from `sequences` end up in `unassigned`. There must
    /// be at most one entry per vehicle.
    pub fn from_sequences(instance: &Instance, sequences: &[Vec<Vec<usize>>], algorithm: &str) -> Self {
        debug_assert!(
            sequences.len() <= instance.num_vehicles,
            "{} vehicle sequences for a fleet of {}",
            sequences.len(),
            instance.num_vehicles
        );
        let mut solution = Solution::new(instance.num_vehicles);
        for (route, trips) in solution.routes.iter_mut().zip(sequences) {
            route.trips = trips
                .iter()
                .filter(|t| !t.is_empty())
                .map(|t| Trip {
                    requests: t.clone(),
                    departure: 0.0,
                    service_starts: Vec::new(),
                    return_time: 0.0,
                    distance: 0.0,
                })
                .collect();
        }
        solution.algorithm = algorithm.to_string();
        solution.validate(instance);
        solution
    }

    /// Recompute schedules, cost, coverage and feasibility from scratch
    pub fn validate(&mut self, instance: &Instance) {
        evaluation::evaluate(instance, self);
    }

    /// Recomputed cost, without touching the cached value
    pub fn recomputed_cost(&self, instance: &Instance) -> f64 {
        self.routes
            .iter()
            .flat_map(|r| r.trips.iter())
            .map(|t| instance.path_distance(&t.path()))
            .sum()
    }

    /// Number of requests served
    pub fn num_served(&self) -> usize {
        self.routes.iter().map(Route::num_requests).sum()
    }

    pub fn num_trips(&self) -> usize {
        self.routes.iter().map(|r| r.trips.len()).sum()
    }

    /// Per-vehicle request sequences
    pub fn sequences(&self) -> Vec<Vec<Vec<usize>>> {
        self.routes.iter().map(Route::sequences).collect()
    }

    /// Location of a request
    pub fn position(&self, request: usize) -> Option<Position> {
        for route in &self.routes {
            for (t, trip) in route.trips.iter().enumerate() {
                if let Some(index) = trip.requests.iter().position(|&r| r == request) {
                    return Some(Position { vehicle: route.vehicle, trip: t, index });
                }
            }
        }
        None
    }

    /// Request at a position
    #[inline]
    pub fn request_at(&self, pos: Position) -> usize {
        self.routes[pos.vehicle].trips[pos.trip].requests[pos.index]
    }

    /// Whether every request appears exactly once
    pub fn is_complete(&self, instance: &Instance) -> bool {
        let mut seen = HashSet::new();
        for route in &self.routes {
            for trip in &route.trips {
                for &r in &trip.requests {
                    if r == DEPOT || r > instance.num_requests() || !seen.insert(r) {
                        return false;
                    }
                }
            }
        }
        seen.len() == instance.num_requests()
    }

    /// Strict comparison: feasible beats infeasible, then fewer unserved
    /// requests, then lower cost.
    pub fn is_better_than(&self, other: &Solution) -> bool {
        const EPS: f64 = 1e-9;
        match (self.feasible, other.feasible) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => self.cost < other.cost - EPS,
            (false, false) => {
                let mine = self.unassigned.len() + self.violations.len();
                let theirs = other.unassigned.len() + other.violations.len();
                mine < theirs || (mine == theirs && self.cost < other.cost - EPS)
            }
        }
    }

    /// Relative gap to the reference cost, if one was supplied
    pub fn optimality_gap(&self) -> Option<f64> {
        match self.reference_cost {
            Some(reference) if self.feasible && reference > 0.0 => Some((self.cost - reference) / reference),
            _ => None,
        }
    }

    /// Requests of every trip of every vehicle, flattened
    pub fn served_requests(&self) -> impl Iterator<Item = usize> + '_ {
        self.routes
            .iter()
            .flat_map(|r| r.trips.iter())
            .flat_map(|t| t.requests.iter().copied())
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.2}", self.cost)?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        if let Some(termination) = self.termination {
            writeln!(f, "  Stopped by: {:?}", termination)?;
        }
        if let Some(gap) = self.optimality_gap() {
            writeln!(f, "  Gap to reference: {:.2}%", gap * 100.0)?;
        }
        if !self.unassigned.is_empty() {
            writeln!(f, "  Unserved requests: {:?}", self.unassigned)?;
        }
        for violation in &self.violations {
            writeln!(f, "  Violation: {}", violation)?;
        }
        for route in &self.routes {
            if route.trips.is_empty() {
                writeln!(f, "  Vehicle {}: unused", route.vehicle)?;
                continue;
            }
            for (t, trip) in route.trips.iter().enumerate() {
                writeln!(
                    f,
                    "  Vehicle {} trip {}: {:?} (dist {:.2}, {:.1} -> {:.1})",
                    route.vehicle,
                    t,
                    trip.path(),
                    trip.distance,
                    trip.departure,
                    trip.return_time
                )?;
            }
        }
        Ok(())
    }
}

/// Location of a stop in a solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub vehicle: usize,
    pub trip: usize,
    pub index: usize,
}

impl Position {
    pub fn new(vehicle: usize, trip: usize, index: usize) -> Self {
        Position { vehicle, trip, index }
    }

    fn same_trip(&self, other: &Position) -> bool {
        self.vehicle == other.vehicle && self.trip == other.trip
    }
}

/// Represents a move in local search.
///
/// All indices refer to the solution before the move is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Move {
    /// Reverse `requests[i..=j]` of one trip
    TwoOpt { vehicle: usize, trip: usize, i: usize, j: usize },
    /// Swap `requests[i]` and `requests[j]` of one trip, `i < j`
    Exchange { vehicle: usize, trip: usize, i: usize, j: usize },
    /// Remove the request at `from` and insert it before `to.index` of trip
    /// `to.trip`. With `new_trip`, a fresh single-request trip is placed at
    /// trip slot `to.trip` of vehicle `to.vehicle` instead.
    Relocate { from: Position, to: Position, new_trip: bool },
    /// Swap the requests at two positions lying in different trips
    Swap { a: Position, b: Position },
}

#[inline]
fn prev_node(seq: &[usize], p: usize) -> usize {
    if p == 0 {
        DEPOT
    } else {
        seq[p - 1]
    }
}

#[inline]
fn next_node(seq: &[usize], p: usize) -> usize {
    if p + 1 >= seq.len() {
        DEPOT
    } else {
        seq[p + 1]
    }
}

/// New distance of a trip touched by a move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripDistance {
    pub vehicle: usize,
    /// `None` for a trip the move creates
    pub trip: Option<usize>,
    pub distance: f64,
}

/// Constant-time distance effect of a move
#[derive(Debug, Clone, Copy)]
pub struct DistanceDelta {
    pub delta: f64,
    pub trips: [Option<TripDistance>; 2],
}

impl Move {
    /// Vehicles whose routes the move rewrites
    pub fn vehicles(&self) -> (usize, Option<usize>) {
        match *self {
            Move::TwoOpt { vehicle, .. } | Move::Exchange { vehicle, .. } => (vehicle, None),
            Move::Relocate { from, to, .. } => (from.vehicle, (to.vehicle != from.vehicle).then_some(to.vehicle)),
            Move::Swap { a, b } => (a.vehicle, (b.vehicle != a.vehicle).then_some(b.vehicle)),
        }
    }

    /// Distance delta and new trip distances, from the edges around the
    /// touched positions only.
    pub fn distance_delta(&self, instance: &Instance, solution: &Solution) -> DistanceDelta {
        let d = |i: usize, j: usize| instance.distance(i, j);
        let trip_of = |v: usize, t: usize| &solution.routes[v].trips[t];

        match *self {
            Move::TwoOpt { vehicle, trip, i, j } => {
                let t = trip_of(vehicle, trip);
                let r = &t.requests;
                let a = prev_node(r, i);
                let b = next_node(r, j);
                let mut delta = d(a, r[j]) + d(r[i], b) - d(a, r[i]) - d(r[j], b);
                // inner edges change direction
                for k in i..j {
                    delta += d(r[k + 1], r[k]) - d(r[k], r[k + 1]);
                }
                DistanceDelta {
                    delta,
                    trips: [Some(TripDistance { vehicle, trip: Some(trip), distance: t.distance + delta }), None],
                }
            }
            Move::Exchange { vehicle, trip, i, j } => {
                let t = trip_of(vehicle, trip);
                let r = &t.requests;
                let (x, y) = (r[i], r[j]);
                let delta = if j == i + 1 {
                    let a = prev_node(r, i);
                    let b = next_node(r, j);
                    d(a, y) + d(y, x) + d(x, b) - d(a, x) - d(x, y) - d(y, b)
                } else {
                    let (pi, ni) = (prev_node(r, i), next_node(r, i));
                    let (pj, nj) = (prev_node(r, j), next_node(r, j));
                    d(pi, y) + d(y, ni) + d(pj, x) + d(x, nj) - d(pi, x) - d(x, ni) - d(pj, y) - d(y, nj)
                };
                DistanceDelta {
                    delta,
                    trips: [Some(TripDistance { vehicle, trip: Some(trip), distance: t.distance + delta }), None],
                }
            }
            Move::Relocate { from, to, new_trip } => {
                let source = trip_of(from.vehicle, from.trip);
                let r = &source.requests;
                let x = r[from.index];
                let (a, c) = (prev_node(r, from.index), next_node(r, from.index));
                let removal = d(a, c) - d(a, x) - d(x, c);

                if new_trip {
                    let fresh = d(DEPOT, x) + d(x, DEPOT);
                    let source_distance = if r.len() == 1 { 0.0 } else { source.distance + removal };
                    DistanceDelta {
                        delta: source_distance - source.distance + fresh,
                        trips: [
                            Some(TripDistance { vehicle: from.vehicle, trip: Some(from.trip), distance: source_distance }),
                            Some(TripDistance { vehicle: to.vehicle, trip: None, distance: fresh }),
                        ],
                    }
                } else {
                    let target = trip_of(to.vehicle, to.trip);
                    let s = &target.requests;
                    let u = if to.index == 0 { DEPOT } else { s[to.index - 1] };
                    let w = if to.index >= s.len() { DEPOT } else { s[to.index] };
                    let insertion = d(u, x) + d(x, w) - d(u, w);

                    if from.same_trip(&to) {
                        let distance = source.distance + removal + insertion;
                        DistanceDelta {
                            delta: removal + insertion,
                            trips: [Some(TripDistance { vehicle: from.vehicle, trip: Some(from.trip), distance }), None],
                        }
                    } else {
                        let source_distance = if r.len() == 1 { 0.0 } else { source.distance + removal };
                        DistanceDelta {
                            delta: source_distance - source.distance + insertion,
                            trips: [
                                Some(TripDistance { vehicle: from.vehicle, trip: Some(from.trip), distance: source_distance }),
                                Some(TripDistance { vehicle: to.vehicle, trip: Some(to.trip), distance: target.distance + insertion }),
                            ],
                        }
                    }
                }
            }
            Move::Swap { a, b } => {
                let ta = trip_of(a.vehicle, a.trip);
                let tb = trip_of(b.vehicle, b.trip);
                let (x, y) = (ta.requests[a.index], tb.requests[b.index]);
                let (pa, na) = (prev_node(&ta.requests, a.index), next_node(&ta.requests, a.index));
                let (pb, nb) = (prev_node(&tb.requests, b.index), next_node(&tb.requests, b.index));
                let delta_a = d(pa, y) + d(y, na) - d(pa, x) - d(x, na);
                let delta_b = d(pb, x) + d(x, nb) - d(pb, y) - d(y, nb);
                DistanceDelta {
                    delta: delta_a + delta_b,
                    trips: [
                        Some(TripDistance { vehicle: a.vehicle, trip: Some(a.trip), distance: ta.distance + delta_a }),
                        Some(TripDistance { vehicle: b.vehicle, trip: Some(b.trip), distance: tb.distance + delta_b }),
                    ],
                }
            }
        }
    }

    /// Request sequences of the vehicles the move touches, after the move.
    /// Trips left empty are dropped.
    pub fn rewrite(&self, solution: &Solution) -> Vec<(usize, Vec<Vec<usize>>)> {
        let (first, second) = self.vehicles();
        let mut first_seq = solution.routes[first].sequences();
        let mut second_seq = second.map(|v| solution.routes[v].sequences());

        match *self {
            Move::TwoOpt { trip, i, j, .. } => {
                first_seq[trip][i..=j].reverse();
            }
            Move::Exchange { trip, i, j, .. } => {
                first_seq[trip].swap(i, j);
            }
            Move::Relocate { from, to, new_trip } => {
                let x = first_seq[from.trip].remove(from.index);
                let target = second_seq.as_mut().unwrap_or(&mut first_seq);
                if new_trip {
                    target.insert(to.trip, vec![x]);
                } else if from.same_trip(&to) {
                    let index = if to.index > from.index { to.index - 1 } else { to.index };
                    target[to.trip].insert(index, x);
                } else {
                    target[to.trip].insert(to.index, x);
                }
            }
            Move::Swap { a, b } => {
                let x = first_seq[a.trip][a.index];
                match second_seq.as_mut() {
                    Some(other) => {
                        let y = std::mem::replace(&mut other[b.trip][b.index], x);
                        first_seq[a.trip][a.index] = y;
                    }
                    None => {
                        let y = std::mem::replace(&mut first_seq[b.trip][b.index], x);
                        first_seq[a.trip][a.index] = y;
                    }
                }
            }
        }

        first_seq.retain(|t| !t.is_empty());
        let mut rewritten = vec![(first, first_seq)];
        if let (Some(v), Some(mut seq)) = (second, second_seq) {
            seq.retain(|t| !t.is_empty());
            rewritten.push((v, seq));
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;

    fn line_instance() -> Instance {
        // requests on the x axis at 1, 2, 3, 4
        InstanceBuilder::new("line")
            .request(1.0, 0.0, 0.0, 1000.0, 0.0)
            .request(2.0, 0.0, 0.0, 1000.0, 0.0)
            .request(3.0, 0.0, 0.0, 1000.0, 0.0)
            .request(4.0, 0.0, 0.0, 1000.0, 0.0)
            .vehicles(2)
            .max_trips(3)
            .max_trip_distance(100.0)
            .build()
            .unwrap()
    }

    fn exact_delta(instance: &Instance, solution: &Solution, mv: &Move) -> f64 {
        let mut sequences = solution.sequences();
        for (v, seq) in mv.rewrite(solution) {
            sequences[v] = seq;
        }
        Solution::from_sequences(instance, &sequences, "check").cost - solution.cost
    }

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new(3);
        assert_eq!(sol.routes.len(), 3);
        assert!(!sol.feasible);
        assert_eq!(sol.num_served(), 0);
    }

    #[test]
    fn test_from_sequences_reports_unserved() {
        let instance = line_instance();
        let sol = Solution::from_sequences(&instance, &[vec![vec![1, 2]], vec![vec![4]]], "test");
        assert!(!sol.feasible);
        assert_eq!(sol.unassigned, vec![3]);
        assert!((sol.cost - (4.0 + 8.0)).abs() < 1e-9);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "3 vehicle sequences for a fleet of 2")]
    fn test_from_sequences_rejects_extra_vehicles() {
        let instance = line_instance();
        Solution::from_sequences(&instance, &[vec![vec![1]], vec![vec![2]], vec![vec![3, 4]]], "test");
    }

    #[test]
    fn test_distance_deltas_match_rewrite() {
        let instance = line_instance();
        let sol = Solution::from_sequences(&instance, &[vec![vec![3, 1, 2], vec![4]], vec![]], "test");
        assert!(sol.feasible);

        let moves = [
            Move::TwoOpt { vehicle: 0, trip: 0, i: 0, j: 2 },
            Move::Exchange { vehicle: 0, trip: 0, i: 0, j: 1 },
            Move::Exchange { vehicle: 0, trip: 0, i: 0, j: 2 },
            Move::Relocate { from: Position::new(0, 0, 0), to: Position::new(0, 0, 3), new_trip: false },
            Move::Relocate { from: Position::new(0, 1, 0), to: Position::new(0, 0, 1), new_trip: false },
            Move::Relocate { from: Position::new(0, 0, 1), to: Position::new(1, 0, 0), new_trip: true },
            Move::Swap { a: Position::new(0, 0, 2), b: Position::new(0, 1, 0) },
        ];
        for mv in &moves {
            let fast = mv.distance_delta(&instance, &sol).delta;
            let slow = exact_delta(&instance, &sol, mv);
            assert!((fast - slow).abs() < 1e-9, "{:?}: {} vs {}", mv, fast, slow);
        }
    }

    #[test]
    fn test_relocate_drops_emptied_trip() {
        let instance = line_instance();
        let sol = Solution::from_sequences(&instance, &[vec![vec![1, 2], vec![4]], vec![vec![3]]], "test");
        let mv = Move::Relocate { from: Position::new(1, 0, 0), to: Position::new(0, 0, 2), new_trip: false };
        let rewritten = mv.rewrite(&sol);
        assert_eq!(rewritten, vec![(1, vec![]), (0, vec![vec![1, 2, 3], vec![4]])]);
        let delta = mv.distance_delta(&instance, &sol);
        assert!((delta.delta - (-6.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_better_ordering() {
        let instance = line_instance();
        let full = Solution::from_sequences(&instance, &[vec![vec![1, 2, 3, 4]], vec![]], "a");
        let partial = Solution::from_sequences(&instance, &[vec![vec![1]], vec![]], "b");
        assert!(full.is_better_than(&partial));
        assert!(!partial.is_better_than(&full));
        assert!(!full.is_better_than(&full.clone()));
    }
}
