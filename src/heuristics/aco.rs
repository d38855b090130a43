//! Multi-colony Ant Colony System.
//!
//! Each ant builds a solution in two phases: a bus-ant assigns every request
//! to a vehicle using the assignment pheromone, then a route-ant per vehicle
//! sequences the assigned requests into trips using the routing pheromone.
//! Ants of one iteration run in parallel against a frozen pheromone model;
//! their local updates are merged at the barrier before the elitist global
//! update.

use crate::budget::SearchBudget;
use crate::config::Config;
use crate::heuristics::construction::{repair_unassigned, ConstructionHeuristic, EarliestWindowFirst};
use crate::heuristics::local_search::{LocalSearch, NeighborhoodDescent};
use crate::heuristics::pheromone::{LocalTrail, PheromoneModel};
use crate::heuristics::sampling::{rng_for, weighted_choice};
use crate::heuristics::trip_builder::{BudgetDecision, TripBuilder, TripState};
use crate::instance::{Instance, DEPOT};
use crate::solution::{SearchStats, Solution};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

/// Two-phase construction of one ant
pub struct AntConstruction<'a> {
    instance: &'a Instance,
    model: &'a PheromoneModel,
    /// Pheromone importance of the bus-ant
    pub alpha: f64,
    /// Heuristic importance of the bus-ant
    pub beta: f64,
    pub route_alpha: f64,
    pub route_beta: f64,
}

impl<'a> AntConstruction<'a> {
    /// Both phases share `alpha` and `beta` until
    /// [`with_route_weights`](Self::with_route_weights) says otherwise.
    pub fn new(instance: &'a Instance, model: &'a PheromoneModel, alpha: f64, beta: f64) -> Self {
        AntConstruction { instance, model, alpha, beta, route_alpha: alpha, route_beta: beta }
    }

    pub fn with_route_weights(mut self, alpha: f64, beta: f64) -> Self {
        self.route_alpha = alpha;
        self.route_beta = beta;
        self
    }

    /// Attractiveness of giving `request` to a vehicle already holding
    /// `assigned`: fewer window conflicts and a lighter load score higher.
    fn assignment_attractiveness(&self, request: usize, assigned: &[usize]) -> f64 {
        let inst = self.instance;
        let conflicts = assigned
            .iter()
            .filter(|&&a| !inst.can_follow(a, request) && !inst.can_follow(request, a))
            .count();
        let n = inst.num_requests() as f64;
        let spare = (n - assigned.len() as f64 + 1.0) / (n + 1.0);
        spare / (1.0 + conflicts as f64)
    }

    /// Bus-ant: assign every request to a vehicle
    pub fn assign<R: Rng>(&self, rng: &mut R, trail: &mut LocalTrail) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = self.instance.request_ids().collect();
        order.shuffle(rng);

        let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); self.instance.num_vehicles];
        for request in order {
            let candidates: Vec<(usize, f64)> = (0..self.instance.num_vehicles)
                .map(|v| {
                    let tau = self.model.assignment_value(request, v, trail).powf(self.alpha);
                    let eta = self.assignment_attractiveness(request, &assigned[v]).powf(self.beta);
                    (v, tau * eta)
                })
                .collect();
            let Some(vehicle) = weighted_choice(rng, &candidates) else {
                continue;
            };
            self.model.touch_assignment(trail, request, vehicle);
            assigned[vehicle].push(request);
        }
        assigned
    }

    /// Route-ant: sequence one vehicle's requests into trips. Requests that
    /// cannot be placed are left out of the returned builder's trips.
    pub fn route<R: Rng>(&self, vehicle: usize, requests: &[usize], rng: &mut R, trail: &mut LocalTrail) -> TripBuilder<'a> {
        let inst = self.instance;
        let mut builder = TripBuilder::new(inst, vehicle);
        let mut remaining = requests.to_vec();

        while !remaining.is_empty() && !builder.is_closed() {
            let candidates = builder.candidates(&remaining);
            if candidates.is_empty() {
                match builder.state() {
                    TripState::Serving { last } => {
                        self.model.touch_routing(trail, last, DEPOT);
                        builder.close_trip();
                    }
                    _ => builder.stop(),
                }
                continue;
            }

            let from = builder.position();
            let weighted: Vec<(usize, f64)> = candidates
                .iter()
                .map(|&j| {
                    let tau = self.model.routing_value(from, j, trail).powf(self.route_alpha);
                    let eta = (1.0 / (1.0 + inst.distance(from, j))).powf(self.route_beta);
                    (j, tau * eta)
                })
                .collect();
            let Some(next) = weighted_choice(rng, &weighted) else {
                break;
            };

            match builder.budget_check(next) {
                BudgetDecision::ContinueSameTrip => {}
                BudgetDecision::CloseAndOpenNewTrip => {
                    self.model.touch_routing(trail, from, DEPOT);
                    builder.close_trip();
                    if !builder.reachable(next) {
                        continue;
                    }
                }
                BudgetDecision::CloseAndStop => {
                    self.model.touch_routing(trail, from, DEPOT);
                    builder.stop();
                    continue;
                }
            }

            let from = builder.position();
            builder.visit(next);
            self.model.touch_routing(trail, from, next);
            remaining.retain(|&r| r != next);
        }

        if let TripState::Serving { last } = builder.state() {
            self.model.touch_routing(trail, last, DEPOT);
        }
        if !remaining.is_empty() {
            log::trace!("vehicle {} could not deliver {:?}", vehicle, remaining);
        }
        builder
    }

    /// Build a complete solution, repairing undeliverable requests
    pub fn build<R: Rng>(&self, rng: &mut R, trail: &mut LocalTrail) -> Solution {
        let assigned = self.assign(rng, trail);
        let mut solution = Solution::new(self.instance.num_vehicles);
        for (v, requests) in assigned.iter().enumerate() {
            solution.routes[v].trips = self.route(v, requests, rng, trail).finish();
        }
        solution.validate(self.instance);
        repair_unassigned(self.instance, &mut solution);
        solution.algorithm = "Ant".to_string();
        solution
    }
}

/// Ant Colony System driver
pub struct AntColonySystem {
    config: Config,
}

impl AntColonySystem {
    pub fn new(config: Config) -> Self {
        AntColonySystem { config }
    }

    /// Initial pheromone from a deterministic seed solution
    fn initial_pheromone(instance: &Instance, seed: &Solution) -> f64 {
        let n = instance.num_requests() as f64;
        let reference = if seed.feasible && seed.cost > 0.0 {
            seed.cost
        } else {
            instance.request_ids().map(|r| instance.round_trip_distance(r)).sum::<f64>().max(1.0)
        };
        1.0 / (n * reference)
    }

    /// Run one ant: construct, then improve
    fn run_ant(
        &self,
        instance: &Instance,
        model: &PheromoneModel,
        descent: &NeighborhoodDescent,
        stream: u64,
    ) -> (Solution, LocalTrail) {
        let mut rng = rng_for(self.config.random_seed, stream);
        let mut trail = LocalTrail::new();
        let (route_alpha, route_beta) = self.config.route_weights();
        let ant = AntConstruction::new(instance, model, self.config.alpha, self.config.beta)
            .with_route_weights(route_alpha, route_beta);
        let mut solution = ant.build(&mut rng, &mut trail);
        descent.improve(instance, &mut solution);
        (solution, trail)
    }

    /// Run ACS
    pub fn run(&self, instance: &Instance) -> Solution {
        let config = &self.config;
        let budget = SearchBudget::new(config.time_limit, config.max_iterations, config.max_no_improve);
        let descent = NeighborhoodDescent::from_config(config);
        let m = config.num_ants;

        let seed = EarliestWindowFirst::new().construct(instance);
        let tau0 = Self::initial_pheromone(instance, &seed);
        let mut model = PheromoneModel::new(instance, tau0, config.local_decay);
        log::info!("ACS: {} ants, tau0 = {:.3e}, seed cost {:.2} (feasible: {})", m, tau0, seed.cost, seed.feasible);

        let mut best = seed;
        descent.improve(instance, &mut best);
        let mut stats = SearchStats::default();
        stats.absorb(&best.stats);

        let mut iteration = 0;
        let mut no_improve = 0;
        let termination = loop {
            let stream_base = (iteration * m) as u64;
            let ants: Vec<(Solution, LocalTrail)> = if config.parallel {
                (0..m)
                    .into_par_iter()
                    .map(|a| self.run_ant(instance, &model, &descent, stream_base + a as u64))
                    .collect()
            } else {
                (0..m)
                    .map(|a| self.run_ant(instance, &model, &descent, stream_base + a as u64))
                    .collect()
            };

            // barrier: every ant is done with this iteration's pheromone
            let trails: Vec<LocalTrail> = ants.iter().map(|(_, trail)| trail.clone()).collect();
            model.merge(&trails);

            let mut iteration_best: Option<&Solution> = None;
            for (solution, _) in &ants {
                stats.solutions_explored += 1;
                stats.moves_applied += solution.stats.moves_applied;
                if solution.feasible {
                    stats.feasible_solutions += 1;
                } else {
                    model.attenuate(solution, config.infeasible_decay);
                }
                if iteration_best.map_or(true, |b| solution.is_better_than(b)) {
                    iteration_best = Some(solution);
                }
            }

            if let Some(candidate) = iteration_best {
                if candidate.is_better_than(&best) {
                    log::info!("ACS iteration {}: new best {:.2} (feasible: {})", iteration, candidate.cost, candidate.feasible);
                    best = candidate.clone();
                    stats.improvements += 1;
                    no_improve = 0;
                } else {
                    no_improve += 1;
                }
            }

            model.evaporate(config.rho);
            let elite = iteration_best.filter(|s| s.feasible).or(Some(&best).filter(|s| s.feasible));
            if let Some(elite) = elite {
                if elite.cost > 0.0 {
                    model.reinforce(elite, config.deposit / elite.cost);
                }
            }

            iteration += 1;
            log::debug!("ACS iteration {}: best {:.2}, {} without improvement", iteration, best.cost, no_improve);
            if let Some(reason) = budget.exhausted(iteration, no_improve) {
                break reason;
            }
        };

        stats.iterations = iteration;
        best.algorithm = "ACS".to_string();
        best.computation_time = budget.elapsed();
        best.iterations = Some(iteration);
        best.termination = Some(termination);
        best.stats = stats;
        best.pheromone = Some(model.snapshot());
        log::info!("ACS finished after {} iterations ({:?}): cost {:.2}", iteration, termination, best.cost);
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Method;
    use crate::instance::InstanceBuilder;

    fn create_test_instance() -> Instance {
        InstanceBuilder::new("acs")
            .request(4.0, 0.0, 0.0, 60.0, 1.0)
            .request(0.0, 4.0, 10.0, 70.0, 1.0)
            .request(-4.0, 0.0, 20.0, 80.0, 1.0)
            .request(0.0, -4.0, 0.0, 90.0, 1.0)
            .request(6.0, 6.0, 30.0, 100.0, 1.0)
            .request(-6.0, -6.0, 5.0, 100.0, 1.0)
            .vehicles(2)
            .max_trips(3)
            .max_trip_distance(30.0)
            .build()
            .unwrap()
    }

    fn test_config() -> Config {
        Config {
            num_ants: 4,
            max_iterations: 8,
            time_limit: None,
            ..Config::with_method(Method::Acs)
        }
    }

    #[test]
    fn test_ant_construction_serves_everything() {
        let instance = create_test_instance();
        let model = PheromoneModel::new(&instance, 0.01, 0.1);
        let ant = AntConstruction::new(&instance, &model, 1.0, 2.0);
        for stream in 0..10 {
            let mut rng = rng_for(3, stream);
            let mut trail = LocalTrail::new();
            let solution = ant.build(&mut rng, &mut trail);
            assert!(solution.feasible, "stream {}: {}", stream, solution);
            assert!(!trail.is_empty());
            for trip in solution.routes.iter().flat_map(|r| r.trips.iter()) {
                assert!(trip.distance <= instance.max_trip_distance + 1e-9);
            }
        }
    }

    /// First stop of the route-ant over several streams
    fn first_stops(ant: &AntConstruction<'_>) -> Vec<usize> {
        (0..30)
            .map(|stream| {
                let mut rng = rng_for(11, stream);
                let mut trail = LocalTrail::new();
                ant.route(0, &[3, 2, 1], &mut rng, &mut trail).finish()[0].requests[0]
            })
            .collect()
    }

    #[test]
    fn test_route_weights_steer_the_route_ant() {
        // stops 1, 5 and 9 away from the depot, all compatible
        let instance = InstanceBuilder::new("fan")
            .request(1.0, 0.0, 0.0, 1000.0, 0.0)
            .request(0.0, 5.0, 0.0, 1000.0, 0.0)
            .request(-9.0, 0.0, 0.0, 1000.0, 0.0)
            .build()
            .unwrap();
        let model = PheromoneModel::new(&instance, 1.0, 0.0);

        let greedy = AntConstruction::new(&instance, &model, 1.0, 0.0).with_route_weights(1.0, 30.0);
        assert!(first_stops(&greedy).iter().all(|&r| r == 1));
        assert_eq!(greedy.beta, 0.0);

        let blind = AntConstruction::new(&instance, &model, 1.0, 30.0).with_route_weights(0.0, 0.0);
        assert!(first_stops(&blind).iter().any(|&r| r != 1));
    }

    #[test]
    fn test_route_weights_default_to_shared_weights() {
        let config = Config { alpha: 2.0, beta: 3.0, ..Config::default() };
        assert_eq!(config.route_weights(), (2.0, 3.0));
        let config = Config { route_beta: Some(5.0), ..config };
        assert_eq!(config.route_weights(), (2.0, 5.0));
    }

    #[test]
    fn test_acs() {
        let instance = create_test_instance();
        let solution = AntColonySystem::new(test_config()).run(&instance);

        assert!(solution.feasible);
        assert!(solution.is_complete(&instance));
        assert_eq!(solution.algorithm, "ACS");
        assert!(solution.pheromone.is_some());
        assert_eq!(solution.stats.solutions_explored, solution.iterations.unwrap() * 4);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let instance = create_test_instance();
        let parallel = AntColonySystem::new(test_config()).run(&instance);
        let sequential = AntColonySystem::new(Config { parallel: false, ..test_config() }).run(&instance);

        assert_eq!(parallel.sequences(), sequential.sequences());
        assert_eq!(parallel.cost, sequential.cost);
        assert_eq!(parallel.pheromone, sequential.pheromone);
    }
}
