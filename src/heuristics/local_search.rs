//! Local search improvement for multi-trip routes.
//!
//! This module implements the neighborhoods of the descent:
//! - 2-opt inside a trip
//! - exchange of two requests of a trip
//! - relocation inside a vehicle (other position, other trip, new trip)
//! - relocation to another vehicle
//! - swap of two requests served by different vehicles
//!
//! Candidates are filtered on their constant-time distance delta; only
//! improving ones are re-scheduled. A rejected candidate never touches the
//! solution.

use crate::config::{Config, MovePolicy, NeighborhoodKind};
use crate::evaluation::{self, Evaluated, MoveVerdict, EPS};
use crate::instance::Instance;
use crate::solution::{Move, Position, Solution};
use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::ControlFlow;

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, instance: &Instance, solution: &mut Solution) -> bool;
    fn name(&self) -> &str;
}

/// Feed every structurally valid move of a neighborhood to `visit` until it
/// breaks.
pub fn for_each_move(
    kind: NeighborhoodKind,
    instance: &Instance,
    solution: &Solution,
    visit: &mut dyn FnMut(Move) -> ControlFlow<()>,
) -> ControlFlow<()> {
    let routes = &solution.routes;
    match kind {
        NeighborhoodKind::TwoOpt | NeighborhoodKind::Exchange => {
            for route in routes {
                for (t, trip) in route.trips.iter().enumerate() {
                    let len = trip.len();
                    for i in 0..len {
                        for j in i + 1..len {
                            let mv = if kind == NeighborhoodKind::TwoOpt {
                                Move::TwoOpt { vehicle: route.vehicle, trip: t, i, j }
                            } else {
                                Move::Exchange { vehicle: route.vehicle, trip: t, i, j }
                            };
                            if visit(mv).is_break() {
                                return ControlFlow::Break(());
                            }
                        }
                    }
                }
            }
        }
        NeighborhoodKind::Relocate => {
            for route in routes {
                let v = route.vehicle;
                for (t, trip) in route.trips.iter().enumerate() {
                    for p in 0..trip.len() {
                        let from = Position::new(v, t, p);
                        for (t2, target) in route.trips.iter().enumerate() {
                            for q in 0..=target.len() {
                                if t2 == t && (q == p || q == p + 1) {
                                    continue;
                                }
                                let mv = Move::Relocate { from, to: Position::new(v, t2, q), new_trip: false };
                                if visit(mv).is_break() {
                                    return ControlFlow::Break(());
                                }
                            }
                        }
                        let alone = trip.len() == 1;
                        if route.trips.len() < instance.max_trips || alone {
                            for slot in 0..=route.trips.len() {
                                if alone && (slot == t || slot == t + 1) {
                                    continue;
                                }
                                let mv = Move::Relocate { from, to: Position::new(v, slot, 0), new_trip: true };
                                if visit(mv).is_break() {
                                    return ControlFlow::Break(());
                                }
                            }
                        }
                    }
                }
            }
        }
        NeighborhoodKind::InterRelocate => {
            for route in routes {
                for (t, trip) in route.trips.iter().enumerate() {
                    for p in 0..trip.len() {
                        let from = Position::new(route.vehicle, t, p);
                        for other in routes.iter().filter(|o| o.vehicle != route.vehicle) {
                            let w = other.vehicle;
                            for (t2, target) in other.trips.iter().enumerate() {
                                for q in 0..=target.len() {
                                    let mv = Move::Relocate { from, to: Position::new(w, t2, q), new_trip: false };
                                    if visit(mv).is_break() {
                                        return ControlFlow::Break(());
                                    }
                                }
                            }
                            if other.trips.len() < instance.max_trips {
                                for slot in 0..=other.trips.len() {
                                    let mv = Move::Relocate { from, to: Position::new(w, slot, 0), new_trip: true };
                                    if visit(mv).is_break() {
                                        return ControlFlow::Break(());
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        NeighborhoodKind::InterSwap => {
            for (vi, first) in routes.iter().enumerate() {
                for second in &routes[vi + 1..] {
                    for (ta, trip_a) in first.trips.iter().enumerate() {
                        for pa in 0..trip_a.len() {
                            for (tb, trip_b) in second.trips.iter().enumerate() {
                                for pb in 0..trip_b.len() {
                                    let mv = Move::Swap {
                                        a: Position::new(first.vehicle, ta, pa),
                                        b: Position::new(second.vehicle, tb, pb),
                                    };
                                    if visit(mv).is_break() {
                                        return ControlFlow::Break(());
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    ControlFlow::Continue(())
}

/// Find an improving feasible move of one neighborhood.
pub fn find_improving_move(
    kind: NeighborhoodKind,
    policy: MovePolicy,
    instance: &Instance,
    solution: &Solution,
) -> Option<(Move, Evaluated)> {
    let mut best: Option<(Move, Evaluated)> = None;
    let mut threshold = -EPS;

    let _ = for_each_move(kind, instance, solution, &mut |mv| {
        if mv.distance_delta(instance, solution).delta >= threshold {
            return ControlFlow::Continue(());
        }
        if let MoveVerdict::Accepted(evaluated) = evaluation::evaluate_move(instance, solution, &mv) {
            threshold = evaluated.delta;
            best = Some((mv, evaluated));
            if policy == MovePolicy::FirstImprovement {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });

    best
}

/// A random feasible move of a neighborhood, improving or not
pub fn random_neighbor<R: Rng>(
    kind: NeighborhoodKind,
    instance: &Instance,
    solution: &Solution,
    rng: &mut R,
) -> Option<(Move, Evaluated)> {
    let mut moves = Vec::new();
    let _ = for_each_move(kind, instance, solution, &mut |mv| {
        moves.push(mv);
        ControlFlow::Continue(())
    });
    moves.shuffle(rng);

    moves.into_iter().find_map(|mv| match evaluation::evaluate_move(instance, solution, &mv) {
        MoveVerdict::Accepted(evaluated) => Some((mv, evaluated)),
        MoveVerdict::Rejected(_) => None,
    })
}

/// One neighborhood scanned with a move policy; applies at most one move
pub struct NeighborhoodSearch {
    pub kind: NeighborhoodKind,
    pub policy: MovePolicy,
}

impl NeighborhoodSearch {
    pub fn new(kind: NeighborhoodKind, policy: MovePolicy) -> Self {
        NeighborhoodSearch { kind, policy }
    }

    pub fn first_improvement(kind: NeighborhoodKind) -> Self {
        Self::new(kind, MovePolicy::FirstImprovement)
    }
}

impl LocalSearch for NeighborhoodSearch {
    fn improve(&self, instance: &Instance, solution: &mut Solution) -> bool {
        match find_improving_move(self.kind, self.policy, instance, solution) {
            Some((mv, evaluated)) => {
                log::trace!("{}: {:?} saves {:.4}", self.kind, mv, -evaluated.delta);
                evaluation::commit(solution, evaluated);
                solution.stats.moves_applied += 1;
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &str {
        match self.kind {
            NeighborhoodKind::TwoOpt => "2-opt",
            NeighborhoodKind::Exchange => "Exchange",
            NeighborhoodKind::Relocate => "Relocate",
            NeighborhoodKind::InterRelocate => "InterRelocate",
            NeighborhoodKind::InterSwap => "InterSwap",
        }
    }
}

/// Variable Neighborhood Descent
///
/// Scans neighborhoods in order, returning to the first one after every
/// applied move. Stops when the last neighborhood yields nothing or after
/// `max_moves` moves.
pub struct NeighborhoodDescent {
    operators: Vec<Box<dyn LocalSearch + Send + Sync>>,
    pub max_moves: usize,
}

impl NeighborhoodDescent {
    pub fn new(order: &[NeighborhoodKind], policy: MovePolicy, max_moves: usize) -> Self {
        let operators = order
            .iter()
            .map(|&kind| Box::new(NeighborhoodSearch::new(kind, policy)) as Box<dyn LocalSearch + Send + Sync>)
            .collect();
        NeighborhoodDescent { operators, max_moves }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.neighborhood_order, config.move_policy, config.max_moves)
    }

    pub fn with_standard_operators() -> Self {
        Self::new(&NeighborhoodKind::standard_order(), MovePolicy::FirstImprovement, 10_000)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl Default for NeighborhoodDescent {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for NeighborhoodDescent {
    fn improve(&self, instance: &Instance, solution: &mut Solution) -> bool {
        // schedules of broken routes are not trustworthy
        if !solution.violations.is_empty() {
            return false;
        }

        let mut improved = false;
        let mut k = 0;
        let mut moves = 0;
        while k < self.operators.len() && moves < self.max_moves {
            if self.operators[k].improve(instance, solution) {
                improved = true;
                moves += 1;
                k = 0;
            } else {
                k += 1;
            }
        }
        improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::construction::{ConstructionHeuristic, GreedyRandomizedConstruction};
    use crate::instance::InstanceBuilder;

    fn clustered() -> Instance {
        InstanceBuilder::new("clustered")
            .request(5.0, 0.0, 0.0, 200.0, 1.0)
            .request(-5.0, 0.0, 0.0, 200.0, 1.0)
            .request(6.0, 1.0, 0.0, 200.0, 1.0)
            .request(-6.0, 1.0, 0.0, 200.0, 1.0)
            .request(5.0, 2.0, 0.0, 200.0, 1.0)
            .request(-5.0, 2.0, 0.0, 200.0, 1.0)
            .vehicles(2)
            .max_trips(2)
            .max_trip_distance(40.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_two_opt_untangles_trip() {
        let instance = InstanceBuilder::new("line")
            .request(1.0, 0.0, 0.0, 100.0, 0.0)
            .request(2.0, 0.0, 0.0, 100.0, 0.0)
            .request(3.0, 0.0, 0.0, 100.0, 0.0)
            .build()
            .unwrap();
        let mut solution = Solution::from_sequences(&instance, &[vec![vec![2, 1, 3]]], "t");
        let search = NeighborhoodSearch::first_improvement(NeighborhoodKind::TwoOpt);
        assert!(search.improve(&instance, &mut solution));
        assert!((solution.cost - 6.0).abs() < 1e-9);
        assert_eq!(solution.stats.moves_applied, 1);
    }

    #[test]
    fn test_inter_vehicle_moves_group_clusters() {
        let instance = clustered();
        let mut solution =
            Solution::from_sequences(&instance, &[vec![vec![1, 2, 3]], vec![vec![4, 5, 6]]], "mixed");
        assert!(solution.feasible, "{}", solution);
        let before = solution.cost;

        let vnd = NeighborhoodDescent::with_standard_operators();
        assert!(vnd.improve(&instance, &mut solution));
        solution.validate(&instance);
        assert!(solution.feasible);
        assert!(solution.cost < before - 1.0);
    }

    #[test]
    fn test_descent_keeps_feasibility_and_reaches_fixed_point() {
        let instance = clustered();
        for policy in [MovePolicy::FirstImprovement, MovePolicy::BestImprovement] {
            let vnd = NeighborhoodDescent::new(&NeighborhoodKind::standard_order(), policy, 10_000);
            let mut solution = GreedyRandomizedConstruction::new(1.0, 5).construct(&instance);
            assert!(solution.feasible);
            vnd.improve(&instance, &mut solution);

            let cached = solution.cost;
            solution.validate(&instance);
            assert!(solution.feasible);
            assert!((solution.cost - cached).abs() < 1e-9);

            let local_optimum = solution.sequences();
            assert!(!vnd.improve(&instance, &mut solution));
            assert_eq!(solution.sequences(), local_optimum);
        }
    }

    #[test]
    fn test_rejected_moves_leave_solution_untouched() {
        // windows force the order 1, 2
        let instance = InstanceBuilder::new("tight")
            .request(3.0, 0.0, 0.0, 4.0, 0.0)
            .request(1.0, 0.0, 10.0, 12.0, 0.0)
            .build()
            .unwrap();
        let mut solution = Solution::from_sequences(&instance, &[vec![vec![1, 2]]], "t");
        assert!(solution.feasible);
        let before = solution.sequences();
        assert!(!NeighborhoodDescent::default().improve(&instance, &mut solution));
        assert_eq!(solution.sequences(), before);
    }

    #[test]
    fn test_random_neighbor_is_feasible() {
        let instance = clustered();
        let solution = Solution::from_sequences(&instance, &[vec![vec![1, 3, 5]], vec![vec![2, 4, 6]]], "t");
        let mut rng = crate::heuristics::sampling::rng_for(11, 0);
        for kind in NeighborhoodKind::standard_order() {
            if let Some((_, evaluated)) = random_neighbor(kind, &instance, &solution, &mut rng) {
                let mut neighbor = solution.clone();
                evaluation::commit(&mut neighbor, evaluated);
                neighbor.validate(&instance);
                assert!(neighbor.feasible, "{}: {}", kind, neighbor);
            }
        }
    }
}
