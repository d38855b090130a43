//! Feasibility and cost evaluation.
//!
//! Trips are timed with wait-until-window-opens semantics: a vehicle leaves
//! the depot as late as it can while still reaching its first stop when the
//! window opens, never before its previous trip has returned. Full evaluation
//! ([`evaluate`]) rebuilds every schedule; move evaluation ([`evaluate_move`])
//! rejects on the constant-time distance delta first and only then
//! re-schedules the vehicles the move touches.

use crate::instance::{Instance, DEPOT};
use crate::solution::{Move, Route, Solution, Trip, Violation};
use serde::{Deserialize, Serialize};

/// Tolerance on window and budget comparisons
pub const EPS: f64 = 1e-9;

/// Hard constraint a candidate breaks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    TimeWindow { request: usize, start: f64, latest: f64 },
    DistanceBudget { distance: f64, limit: f64 },
    TripDuration { duration: f64, limit: f64 },
    TripCap { trips: usize, limit: usize },
    Capacity { request: usize, passengers: u32, capacity: u32 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::TimeWindow { request, start, latest } => {
                write!(f, "request {} starts at {:.2} after its window closes at {:.2}", request, start, latest)
            }
            Rejection::DistanceBudget { distance, limit } => {
                write!(f, "trip distance {:.2} exceeds budget {:.2}", distance, limit)
            }
            Rejection::TripDuration { duration, limit } => {
                write!(f, "trip duration {:.2} exceeds limit {:.2}", duration, limit)
            }
            Rejection::TripCap { trips, limit } => write!(f, "{} trips exceed the cap of {}", trips, limit),
            Rejection::Capacity { request, passengers, capacity } => write!(
                f,
                "request {} carries {} passengers, vehicle capacity is {}",
                request, passengers, capacity
            ),
        }
    }
}

/// Re-scheduled routes of the vehicles a move touches
#[derive(Debug, Clone)]
pub struct Evaluated {
    /// Change of total cost
    pub delta: f64,
    pub routes: Vec<(usize, Vec<Trip>)>,
}

/// Outcome of evaluating a candidate move
#[derive(Debug, Clone)]
pub enum MoveVerdict {
    Accepted(Evaluated),
    Rejected(Rejection),
}

/// Time a trip without checking anything.
pub fn time_trip(instance: &Instance, requests: &[usize], ready: f64) -> Trip {
    let mut service_starts = Vec::with_capacity(requests.len());
    let Some(&first) = requests.first() else {
        return Trip {
            requests: Vec::new(),
            departure: ready,
            service_starts,
            return_time: ready,
            distance: 0.0,
        };
    };

    let lead = instance.service_time(DEPOT) + instance.time(DEPOT, first);
    let departure = ready.max(instance.request(first).earliest - lead);

    let mut prev = DEPOT;
    let mut clock = departure;
    let mut distance = 0.0;
    for &r in requests {
        let arrival = clock + instance.service_time(prev) + instance.time(prev, r);
        let start = arrival.max(instance.request(r).earliest);
        service_starts.push(start);
        distance += instance.distance(prev, r);
        clock = start;
        prev = r;
    }
    let return_time = clock + instance.service_time(prev) + instance.time(prev, DEPOT);
    distance += instance.distance(prev, DEPOT);

    Trip {
        requests: requests.to_vec(),
        departure,
        service_starts,
        return_time,
        distance,
    }
}

/// Every constraint a timed trip breaks
pub fn trip_violations(instance: &Instance, trip: &Trip) -> Vec<Rejection> {
    let mut violations = Vec::new();
    for (&r, &start) in trip.requests.iter().zip(&trip.service_starts) {
        let request = instance.request(r);
        if request.passengers > instance.vehicle_capacity {
            violations.push(Rejection::Capacity {
                request: r,
                passengers: request.passengers,
                capacity: instance.vehicle_capacity,
            });
        }
        if start > request.latest + EPS {
            violations.push(Rejection::TimeWindow { request: r, start, latest: request.latest });
        }
    }
    if trip.distance > instance.max_trip_distance + EPS {
        violations.push(Rejection::DistanceBudget { distance: trip.distance, limit: instance.max_trip_distance });
    }
    if let Some(limit) = instance.max_trip_duration {
        if trip.duration() > limit + EPS {
            violations.push(Rejection::TripDuration { duration: trip.duration(), limit });
        }
    }
    violations
}

/// Time a trip and reject it on its first broken constraint
pub fn schedule_trip(instance: &Instance, requests: &[usize], ready: f64) -> Result<Trip, Rejection> {
    let trip = time_trip(instance, requests, ready);
    match trip_violations(instance, &trip).into_iter().next() {
        Some(rejection) => Err(rejection),
        None => Ok(trip),
    }
}

/// Time the trips of one vehicle back to back
pub fn schedule_route(instance: &Instance, sequences: &[Vec<usize>]) -> Result<Vec<Trip>, Rejection> {
    let trips = sequences.iter().filter(|s| !s.is_empty()).count();
    if trips > instance.max_trips {
        return Err(Rejection::TripCap { trips, limit: instance.max_trips });
    }

    let mut scheduled = Vec::with_capacity(trips);
    let mut ready = 0.0;
    for seq in sequences.iter().filter(|s| !s.is_empty()) {
        let trip = schedule_trip(instance, seq, ready)?;
        ready = trip.return_time;
        scheduled.push(trip);
    }
    Ok(scheduled)
}

/// Recompute every schedule, the cost, coverage and the feasibility flag.
pub fn evaluate(instance: &Instance, solution: &mut Solution) {
    let n = instance.num_requests();
    let mut visits = vec![0usize; n + 1];
    let mut violations = Vec::new();

    for route in solution.routes.iter_mut() {
        route.trips.retain(|t| !t.is_empty());

        let mut ready = 0.0;
        for (t, trip) in route.trips.iter_mut().enumerate() {
            let known: Vec<usize> = trip.requests.iter().copied().filter(|&r| r != DEPOT && r <= n).collect();
            for &r in &trip.requests {
                if r == DEPOT || r > n {
                    violations.push(Violation::UnknownRequest { request: r });
                } else {
                    visits[r] += 1;
                }
            }
            *trip = time_trip(instance, &known, ready);
            ready = trip.return_time;
            for cause in trip_violations(instance, trip) {
                violations.push(Violation::Route { vehicle: route.vehicle, trip: Some(t), cause });
            }
        }
        route.trips.retain(|t| !t.is_empty());

        if route.trips.len() > instance.max_trips {
            violations.push(Violation::Route {
                vehicle: route.vehicle,
                trip: None,
                cause: Rejection::TripCap { trips: route.trips.len(), limit: instance.max_trips },
            });
        }
    }

    for (r, &count) in visits.iter().enumerate().skip(1) {
        if count > 1 {
            violations.push(Violation::Duplicate { request: r });
        }
    }

    solution.unassigned = (1..=n).filter(|&r| visits[r] == 0).collect();
    solution.cost = solution.routes.iter().map(Route::distance).sum();
    solution.feasible = solution.unassigned.is_empty() && violations.is_empty();
    solution.violations = violations;
}

/// Evaluate a move against a feasible solution without mutating it.
pub fn evaluate_move(instance: &Instance, solution: &Solution, mv: &Move) -> MoveVerdict {
    let delta = mv.distance_delta(instance, solution);
    for affected in delta.trips.iter().flatten() {
        if affected.distance > instance.max_trip_distance + EPS {
            return MoveVerdict::Rejected(Rejection::DistanceBudget {
                distance: affected.distance,
                limit: instance.max_trip_distance,
            });
        }
    }

    let mut routes = Vec::with_capacity(2);
    for (vehicle, sequences) in mv.rewrite(solution) {
        match schedule_route(instance, &sequences) {
            Ok(trips) => routes.push((vehicle, trips)),
            Err(rejection) => return MoveVerdict::Rejected(rejection),
        }
    }
    MoveVerdict::Accepted(Evaluated { delta: delta.delta, routes })
}

/// Install re-scheduled routes into a solution
pub fn commit(solution: &mut Solution, evaluated: Evaluated) {
    for (vehicle, trips) in evaluated.routes {
        solution.routes[vehicle].trips = trips;
    }
    solution.cost = solution.routes.iter().map(Route::distance).sum();
}

/// Where to put an unrouted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub vehicle: usize,
    /// Existing trip index, or the trip slot for a new trip
    pub trip: usize,
    /// Position inside the trip (ignored for a new trip)
    pub index: usize,
    pub new_trip: bool,
}

/// Distance increase of an insertion, in constant time
pub fn insertion_distance(instance: &Instance, route: &Route, request: usize, at: &Insertion) -> f64 {
    if at.new_trip {
        return instance.round_trip_distance(request);
    }
    let seq = &route.trips[at.trip].requests;
    let u = if at.index == 0 { DEPOT } else { seq[at.index - 1] };
    let w = if at.index >= seq.len() { DEPOT } else { seq[at.index] };
    instance.distance(u, request) + instance.distance(request, w) - instance.distance(u, w)
}

/// Evaluate inserting `request` into `route`; on success returns the added
/// distance and the re-scheduled trips.
pub fn evaluate_insertion(
    instance: &Instance,
    route: &Route,
    request: usize,
    at: &Insertion,
) -> Result<(f64, Vec<Trip>), Rejection> {
    let added = insertion_distance(instance, route, request, at);
    let trip_distance = if at.new_trip { added } else { route.trips[at.trip].distance + added };
    if trip_distance > instance.max_trip_distance + EPS {
        return Err(Rejection::DistanceBudget { distance: trip_distance, limit: instance.max_trip_distance });
    }
    if at.new_trip && route.trips.len() >= instance.max_trips {
        return Err(Rejection::TripCap { trips: route.trips.len() + 1, limit: instance.max_trips });
    }

    let mut sequences = route.sequences();
    if at.new_trip {
        sequences.insert(at.trip, vec![request]);
    } else {
        sequences[at.trip].insert(at.index, request);
    }
    schedule_route(instance, &sequences).map(|trips| (added, trips))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;
    use crate::solution::Position;

    fn windowed_instance() -> Instance {
        InstanceBuilder::new("windows")
            .request(10.0, 0.0, 20.0, 35.0, 2.0)
            .request(20.0, 0.0, 25.0, 50.0, 2.0)
            .request(0.0, 10.0, 0.0, 15.0, 1.0)
            .vehicles(1)
            .max_trips(2)
            .max_trip_distance(50.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_waiting_and_departure() {
        let instance = windowed_instance();
        let trip = schedule_trip(&instance, &[1, 2], 0.0).unwrap();
        // leave at 10, reach 1 at 20, leave 22, reach 2 at 32
        assert!((trip.departure - 10.0).abs() < 1e-9);
        assert_eq!(trip.service_starts, vec![20.0, 32.0]);
        assert!((trip.return_time - 54.0).abs() < 1e-9);
        assert!((trip.distance - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_rejection() {
        let instance = windowed_instance();
        // 2 first: start 25, then 1 at 37 > 35
        let err = schedule_trip(&instance, &[2, 1], 0.0).unwrap_err();
        assert!(matches!(err, Rejection::TimeWindow { request: 1, .. }));
    }

    #[test]
    fn test_route_chains_trips() {
        let instance = windowed_instance();
        let trips = schedule_route(&instance, &[vec![3], vec![1, 2]]).unwrap();
        assert!((trips[0].return_time - 21.0).abs() < 1e-9);
        // next departure waits for the return
        assert!((trips[1].departure - 21.0).abs() < 1e-9);
        assert_eq!(trips[1].service_starts, vec![31.0, 43.0]);

        let err = schedule_route(&instance, &[vec![3], vec![1], vec![2]]).unwrap_err();
        assert_eq!(err, Rejection::TripCap { trips: 3, limit: 2 });
    }

    #[test]
    fn test_duration_limit_binds_within_distance_budget() {
        let instance = InstanceBuilder::new("duration")
            .request(0.0, 4.0, 0.0, 100.0, 0.0)
            .request(4.0, 0.0, 0.0, 100.0, 0.0)
            .request(0.0, -8.0, 0.0, 100.0, 0.0)
            .max_trips(2)
            .max_trip_distance(100.0)
            .max_trip_duration(10.0)
            .build()
            .unwrap();

        // 4 + 5.66 + 4 fits the distance budget but lasts 13.66
        let err = schedule_trip(&instance, &[1, 2], 0.0).unwrap_err();
        assert!(matches!(err, Rejection::TripDuration { limit, .. } if limit == 10.0));
        let trips = schedule_route(&instance, &[vec![1], vec![2]]).unwrap();
        assert!(trips.iter().all(|t| t.duration() <= 10.0));

        let solution = Solution::from_sequences(&instance, &[vec![vec![1, 2], vec![3]]], "t");
        assert!(!solution.feasible);
        let too_long = solution
            .violations
            .iter()
            .filter(|v| matches!(v, Violation::Route { cause: Rejection::TripDuration { .. }, .. }))
            .count();
        assert_eq!(too_long, 2);
        assert!(!solution
            .violations
            .iter()
            .any(|v| matches!(v, Violation::Route { cause: Rejection::DistanceBudget { .. }, .. })));

        assert!(instance.is_admissible(1));
        assert!(!instance.is_admissible(3));
    }

    #[test]
    fn test_full_evaluation_lists_violations() {
        let instance = windowed_instance();
        let mut solution = Solution::new(1);
        solution.routes[0].trips.push(time_trip(&instance, &[2, 1, 1], 0.0));
        evaluate(&instance, &mut solution);

        assert!(!solution.feasible);
        assert_eq!(solution.unassigned, vec![3]);
        assert!(solution.violations.contains(&Violation::Duplicate { request: 1 }));
        assert!(solution
            .violations
            .iter()
            .any(|v| matches!(v, Violation::Route { cause: Rejection::TimeWindow { .. }, .. })));
    }

    #[test]
    fn test_move_rejected_on_budget_before_scheduling() {
        let instance = windowed_instance();
        let solution = Solution::from_sequences(&instance, &[vec![vec![3], vec![1, 2]]], "t");
        assert!(solution.feasible);

        let mv = Move::Relocate { from: Position::new(0, 0, 0), to: Position::new(0, 1, 2), new_trip: false };
        match evaluate_move(&instance, &solution, &mv) {
            MoveVerdict::Rejected(Rejection::DistanceBudget { .. }) => {}
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_commit_keeps_cost_consistent() {
        let instance = InstanceBuilder::new("line")
            .request(1.0, 0.0, 0.0, 100.0, 0.0)
            .request(2.0, 0.0, 0.0, 100.0, 0.0)
            .request(3.0, 0.0, 0.0, 100.0, 0.0)
            .build()
            .unwrap();
        let mut solution = Solution::from_sequences(&instance, &[vec![vec![2, 1, 3]]], "t");
        assert!((solution.cost - 8.0).abs() < 1e-9);

        let mv = Move::Exchange { vehicle: 0, trip: 0, i: 0, j: 1 };
        let MoveVerdict::Accepted(ev) = evaluate_move(&instance, &solution, &mv) else {
            panic!("exchange should be accepted");
        };
        assert!((ev.delta + 2.0).abs() < 1e-9);
        commit(&mut solution, ev);
        assert_eq!(solution.routes[0].trips[0].requests, vec![1, 2, 3]);
        assert!((solution.cost - 6.0).abs() < 1e-9);
        assert!((solution.cost - solution.recomputed_cost(&instance)).abs() < 1e-9);
    }

    #[test]
    fn test_insertion() {
        let instance = windowed_instance();
        let solution = Solution::from_sequences(&instance, &[vec![vec![1]]], "t");
        let route = &solution.routes[0];

        let at = Insertion { vehicle: 0, trip: 0, index: 1, new_trip: false };
        let (added, trips) = evaluate_insertion(&instance, route, 2, &at).unwrap();
        assert!((added - 20.0).abs() < 1e-9);
        assert_eq!(trips[0].requests, vec![1, 2]);

        let at = Insertion { vehicle: 0, trip: 0, index: 0, new_trip: true };
        let (_, trips) = evaluate_insertion(&instance, route, 3, &at).unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].requests, vec![3]);
    }
}
