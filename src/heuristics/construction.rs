use crate::evaluation::{self, Insertion};
use crate::instance::Instance;
use crate::solution::{Route, Solution};
use crate::heuristics::sampling::{rng_for, weighted_choice};
use ordered_float::OrderedFloat;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &Instance) -> Solution;
    fn name(&self) -> &str;
}

/// Cheapest feasible insertion of `request` into `route`.
///
/// Existing trips are scanned first; with `open_trip` a new single-request
/// trip in any trip slot is also considered.
pub fn cheapest_insertion(
    instance: &Instance,
    route: &Route,
    request: usize,
    existing: bool,
    open_trip: bool,
) -> Option<(f64, Insertion)> {
    let mut best: Option<(f64, Insertion)> = None;
    let mut consider = |at: Insertion| {
        let added = evaluation::insertion_distance(instance, route, request, &at);
        if best.as_ref().is_some_and(|(cost, _)| added >= *cost) {
            return;
        }
        if evaluation::evaluate_insertion(instance, route, request, &at).is_ok() {
            best = Some((added, at));
        }
    };

    if existing {
        for (t, trip) in route.trips.iter().enumerate() {
            for index in 0..=trip.len() {
                consider(Insertion { vehicle: route.vehicle, trip: t, index, new_trip: false });
            }
        }
    }
    if open_trip && route.trips.len() < instance.max_trips {
        for t in 0..=route.trips.len() {
            consider(Insertion { vehicle: route.vehicle, trip: t, index: 0, new_trip: true });
        }
    }
    best
}

/// Insert a request at a position already known to be feasible
fn insert(instance: &Instance, solution: &mut Solution, request: usize, at: &Insertion) -> bool {
    let route = &solution.routes[at.vehicle];
    match evaluation::evaluate_insertion(instance, route, request, at) {
        Ok((_, trips)) => {
            solution.routes[at.vehicle].trips = trips;
            true
        }
        Err(_) => false,
    }
}

/// Re-insert unserved requests at their cheapest feasible position in any
/// vehicle. Returns the number of requests placed.
pub fn repair_unassigned(instance: &Instance, solution: &mut Solution) -> usize {
    if solution.unassigned.is_empty() {
        return 0;
    }

    let mut repaired = 0;
    for request in solution.unassigned.clone() {
        let best = solution
            .routes
            .iter()
            .filter_map(|route| cheapest_insertion(instance, route, request, true, true))
            .min_by_key(|(cost, at)| (OrderedFloat(*cost), at.vehicle));
        if let Some((_, at)) = best {
            if insert(instance, solution, request, &at) {
                repaired += 1;
            }
        }
    }

    solution.validate(instance);
    if repaired > 0 {
        log::debug!("repair placed {} requests, {} remain unserved", repaired, solution.unassigned.len());
    }
    repaired
}

/// Earliest-window-first construction
///
/// Requests are taken by ascending opening time and appended to the first
/// trip, scanning trip index then vehicle, that can still take them.
/// Deterministic; used to seed the initial pheromone level.
pub struct EarliestWindowFirst;

impl EarliestWindowFirst {
    pub fn new() -> Self {
        EarliestWindowFirst
    }
}

impl Default for EarliestWindowFirst {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for EarliestWindowFirst {
    fn construct(&self, instance: &Instance) -> Solution {
        let start = std::time::Instant::now();
        let mut solution = Solution::new(instance.num_vehicles);

        let mut order: Vec<usize> = instance.request_ids().collect();
        order.sort_by_key(|&r| (OrderedFloat(instance.request(r).earliest), r));

        for request in order {
            'search: for t in 0..instance.max_trips {
                for v in 0..instance.num_vehicles {
                    let route = &solution.routes[v];
                    let at = match route.trips.len() {
                        len if len > t => Insertion { vehicle: v, trip: t, index: route.trips[t].len(), new_trip: false },
                        len if len == t => Insertion { vehicle: v, trip: t, index: 0, new_trip: true },
                        _ => continue,
                    };
                    if insert(instance, &mut solution, request, &at) {
                        break 'search;
                    }
                }
            }
        }

        solution.validate(instance);
        solution.algorithm = self.name().to_string();
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        "EarliestWindowFirst"
    }
}

/// Greedy randomized insertion (GRASP constructive phase)
///
/// At every step each unserved request is ranked by its cheapest feasible
/// insertion into an existing trip of any vehicle; a request with no such
/// position is ranked by the cheapest new trip instead. Candidates within
/// `rcl_threshold` of the best cost form the restricted candidate list, from
/// which one is drawn with weight decreasing in cost.
pub struct GreedyRandomizedConstruction {
    pub rcl_threshold: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    at: Insertion,
}

impl GreedyRandomizedConstruction {
    pub fn new(rcl_threshold: f64, seed: u64) -> Self {
        GreedyRandomizedConstruction { rcl_threshold, seed }
    }

    /// Best existing-trip insertion and best new-trip insertion on one vehicle
    fn options(instance: &Instance, route: &Route, request: usize) -> (Option<Candidate>, Option<Candidate>) {
        let existing = cheapest_insertion(instance, route, request, true, false).map(|(cost, at)| Candidate { cost, at });
        let fresh = cheapest_insertion(instance, route, request, false, true).map(|(cost, at)| Candidate { cost, at });
        (existing, fresh)
    }
}

impl Default for GreedyRandomizedConstruction {
    fn default() -> Self {
        Self::new(0.2, 42)
    }
}

impl ConstructionHeuristic for GreedyRandomizedConstruction {
    fn construct(&self, instance: &Instance) -> Solution {
        let start = std::time::Instant::now();
        let mut rng = rng_for(self.seed, 0);
        let mut solution = Solution::new(instance.num_vehicles);
        let k = instance.num_vehicles;

        let mut pool: Vec<usize> = instance.request_ids().collect();
        // options[request][vehicle], refreshed only for the vehicle that changed
        let mut options: Vec<Vec<(Option<Candidate>, Option<Candidate>)>> = vec![vec![(None, None); k]; instance.dimension()];
        for &r in &pool {
            for v in 0..k {
                options[r][v] = Self::options(instance, &solution.routes[v], r);
            }
        }

        while !pool.is_empty() {
            let mut list: Vec<(usize, Candidate)> = Vec::with_capacity(pool.len());
            let mut stuck = Vec::new();
            for &r in &pool {
                let pick_min = |c: &[Option<Candidate>]| {
                    c.iter().flatten().copied().min_by_key(|c| (OrderedFloat(c.cost), c.at.vehicle))
                };
                let existing: Vec<Option<Candidate>> = options[r].iter().map(|o| o.0).collect();
                let best = pick_min(&existing).or_else(|| {
                    let fresh: Vec<Option<Candidate>> = options[r].iter().map(|o| o.1).collect();
                    pick_min(&fresh)
                });
                match best {
                    Some(candidate) => list.push((r, candidate)),
                    None => stuck.push(r),
                }
            }

            // no vehicle can take these any more
            pool.retain(|r| !stuck.contains(r));
            if list.is_empty() {
                break;
            }

            let min_cost = list.iter().map(|(_, c)| c.cost).fold(f64::INFINITY, f64::min);
            let limit = min_cost + self.rcl_threshold * min_cost.abs();
            let rcl: Vec<((usize, Candidate), f64)> = list
                .into_iter()
                .filter(|(_, c)| c.cost <= limit + evaluation::EPS)
                .map(|entry| {
                    let weight = 1.0 / (1.0 + entry.1.cost - min_cost);
                    (entry, weight)
                })
                .collect();
            let indices: Vec<(usize, f64)> = rcl.iter().enumerate().map(|(i, (_, w))| (i, *w)).collect();
            let Some(chosen) = weighted_choice(&mut rng, &indices) else {
                break;
            };
            let (request, candidate) = rcl[chosen].0;

            if !insert(instance, &mut solution, request, &candidate.at) {
                // cached option went stale; drop it and retry next round
                options[request][candidate.at.vehicle] = (None, None);
                continue;
            }
            pool.retain(|&r| r != request);

            let v = candidate.at.vehicle;
            for &r in &pool {
                options[r][v] = Self::options(instance, &solution.routes[v], r);
            }
        }

        solution.validate(instance);
        if !solution.unassigned.is_empty() {
            log::warn!("{}: requests {:?} could not be placed", self.name(), solution.unassigned);
        }
        solution.algorithm = self.name().to_string();
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        "GreedyRandomized"
    }
}
