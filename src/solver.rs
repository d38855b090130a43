//! Uniform entry point over the three drivers.

use crate::config::{Config, Method};
use crate::error::ConfigError;
use crate::heuristics::aco::AntColonySystem;
use crate::heuristics::grasp::Grasp;
use crate::heuristics::vns::VariableNeighborhoodSearch;
use crate::instance::Instance;
use crate::solution::Solution;

/// A driver that turns an instance into its best solution found
pub trait Metaheuristic {
    fn solve(&self, instance: &Instance) -> Solution;
    fn name(&self) -> &str;
}

impl Metaheuristic for Grasp {
    fn solve(&self, instance: &Instance) -> Solution {
        self.run(instance)
    }

    fn name(&self) -> &str {
        "GRASP"
    }
}

impl Metaheuristic for VariableNeighborhoodSearch {
    fn solve(&self, instance: &Instance) -> Solution {
        self.run(instance)
    }

    fn name(&self) -> &str {
        "VNS"
    }
}

impl Metaheuristic for AntColonySystem {
    fn solve(&self, instance: &Instance) -> Solution {
        self.run(instance)
    }

    fn name(&self) -> &str {
        "ACS"
    }
}

/// Driver selected by `config.method`
pub fn driver(config: &Config) -> Box<dyn Metaheuristic + Send + Sync> {
    match config.method {
        Method::Grasp => Box::new(Grasp::new(config.clone())),
        Method::Vns => Box::new(VariableNeighborhoodSearch::new(config.clone())),
        Method::Acs => Box::new(AntColonySystem::new(config.clone())),
    }
}

/// Solve an instance with the configured method.
///
/// Blocks until the budget is exhausted or the driver converges. The only
/// error is an invalid configuration; an instance without feasible solution
/// yields a `Solution` with `feasible == false` that names the unserved
/// requests and broken constraints.
pub fn solve(instance: &Instance, config: &Config) -> Result<Solution, ConfigError> {
    config.validate()?;

    let driver = driver(config);
    log::info!("Solving {} with {}", instance, driver.name());
    let mut solution = driver.solve(instance);
    solution.reference_cost = config.reference_cost;

    if !solution.feasible {
        log::warn!(
            "{}: no feasible solution found; unserved requests {:?}, {} violations",
            driver.name(),
            solution.unassigned,
            solution.violations.len()
        );
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeighborhoodKind;
    use crate::instance::InstanceBuilder;
    use crate::solution::Termination;
    use proptest::prelude::*;

    fn quick(method: Method) -> Config {
        Config {
            num_ants: 3,
            max_iterations: 5,
            restart_count: 4,
            time_limit: None,
            ..Config::with_method(method)
        }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let instance = InstanceBuilder::new("x").request(1.0, 0.0, 0.0, 10.0, 0.0).build().unwrap();
        let config = Config { num_ants: 0, ..Default::default() };
        assert_eq!(solve(&instance, &config).unwrap_err(), ConfigError::NonPositiveAntCount);

        let config = Config { neighborhood_order: vec![], ..quick(Method::Vns) };
        assert_eq!(solve(&instance, &config).unwrap_err(), ConfigError::EmptyNeighborhoodOrder);
    }

    #[test]
    fn test_two_requests_match_brute_force() {
        let instance = InstanceBuilder::new("pair")
            .request(4.0, 0.0, 0.0, 1000.0, 0.0)
            .request(4.0, 3.0, 0.0, 1000.0, 0.0)
            .build()
            .unwrap();
        let optimum = [[1, 2], [2, 1]]
            .iter()
            .map(|order| instance.path_distance(&[0, order[0], order[1], 0]))
            .fold(f64::INFINITY, f64::min);

        for method in Method::all() {
            let solution = solve(&instance, &quick(method)).unwrap();
            assert!(solution.feasible);
            assert_eq!(solution.num_trips(), 1, "{}", method);
            assert!((solution.cost - optimum).abs() < 1e-9, "{}: {}", method, solution.cost);
        }
    }

    #[test]
    fn test_distance_budget_forces_second_trip() {
        // any two stops in one trip need at least 10 + 14.1 + 10 > 25
        let instance = InstanceBuilder::new("split")
            .request(10.0, 0.0, 0.0, 1000.0, 0.0)
            .request(0.0, 10.0, 0.0, 1000.0, 0.0)
            .request(-10.0, 0.0, 0.0, 1000.0, 0.0)
            .max_trips(3)
            .max_trip_distance(25.0)
            .build()
            .unwrap();

        for method in Method::all() {
            let solution = solve(&instance, &quick(method)).unwrap();
            assert!(solution.feasible, "{}", solution);
            assert!(solution.routes[0].trips.len() >= 2);
            for trip in &solution.routes[0].trips {
                assert!(trip.distance <= 25.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_unmeetable_window_is_named() {
        let instance = InstanceBuilder::new("late")
            .request(1.0, 0.0, 0.0, 100.0, 0.0)
            .request(30.0, 0.0, 0.0, 5.0, 0.0)
            .vehicles(2)
            .max_trips(2)
            .build()
            .unwrap();

        for method in Method::all() {
            let solution = solve(&instance, &quick(method)).unwrap();
            assert!(!solution.feasible);
            assert_eq!(solution.unassigned, vec![2]);
            assert!(solution.position(1).is_some());
        }
    }

    #[test]
    fn test_request_over_capacity_is_left_unassigned() {
        let instance = InstanceBuilder::new("capacity")
            .request(3.0, 0.0, 0.0, 100.0, 0.0)
            .request(0.0, 3.0, 0.0, 100.0, 0.0)
            .passengers(5)
            .request(-3.0, 0.0, 0.0, 100.0, 0.0)
            .capacity(4)
            .vehicles(2)
            .max_trips(2)
            .build()
            .unwrap();

        for method in Method::all() {
            let solution = solve(&instance, &quick(method)).unwrap();
            assert!(!solution.feasible, "{}", method);
            assert_eq!(solution.unassigned, vec![2], "{}", method);
            assert!(solution.violations.is_empty(), "{}: {:?}", method, solution.violations);
            assert!(solution.position(1).is_some() && solution.position(3).is_some());
        }
    }

    #[test]
    fn test_time_limit_ends_every_driver() {
        let instance = InstanceBuilder::new("clock")
            .request(4.0, 0.0, 0.0, 1000.0, 0.0)
            .request(4.0, 3.0, 0.0, 1000.0, 0.0)
            .build()
            .unwrap();

        for method in Method::all() {
            let config = Config {
                time_limit: Some(1e-9),
                max_iterations: 1_000_000,
                max_no_improve: None,
                restart_count: 1_000_000,
                num_ants: 2,
                parallel: false,
                ..Config::with_method(method)
            };
            let solution = solve(&instance, &config).unwrap();
            assert_eq!(solution.termination, Some(Termination::TimeLimit), "{}", method);
            assert!(solution.iterations.is_some_and(|i| i < 1_000_000));
            assert!(solution.feasible, "{}: {}", method, solution);
        }
    }

    #[test]
    fn test_reference_cost_gap() {
        let instance = InstanceBuilder::new("gap").request(3.0, 4.0, 0.0, 100.0, 0.0).build().unwrap();
        let config = Config { reference_cost: Some(8.0), ..quick(Method::Grasp) };
        let solution = solve(&instance, &config).unwrap();
        assert!((solution.optimality_gap().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let instance = InstanceBuilder::new("repeat")
            .request(1.0, 5.0, 0.0, 60.0, 1.0)
            .request(4.0, -2.0, 10.0, 60.0, 1.0)
            .request(-3.0, 3.0, 0.0, 80.0, 1.0)
            .request(-2.0, -4.0, 30.0, 90.0, 1.0)
            .vehicles(2)
            .max_trips(2)
            .max_trip_distance(20.0)
            .build()
            .unwrap();
        for method in Method::all() {
            let a = solve(&instance, &quick(method)).unwrap();
            let b = solve(&instance, &quick(method)).unwrap();
            assert_eq!(a.sequences(), b.sequences(), "{}", method);
            assert_eq!(a.cost, b.cost);
        }
    }

    fn random_instance() -> impl Strategy<Value = crate::instance::Instance> {
        (
            prop::collection::vec((-20.0..20.0f64, -20.0..20.0f64, 0.0..100.0f64, 5.0..80.0f64), 2..9),
            1usize..3,
            1usize..4,
            40.0..120.0f64,
        )
            .prop_map(|(stops, vehicles, trips, dmax)| {
                let mut builder = InstanceBuilder::new("fuzz")
                    .vehicles(vehicles)
                    .max_trips(trips)
                    .max_trip_distance(dmax);
                for (x, y, earliest, width) in stops {
                    builder = builder.request(x, y, earliest, earliest + width, 1.0);
                }
                builder.build().unwrap()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_returned_solutions_respect_constraints(
            instance in random_instance(),
            method in prop::sample::select(Method::all().to_vec()),
            seed in 0u64..1000,
        ) {
            let config = Config { random_seed: seed, ..quick(method) };
            let solution = solve(&instance, &config).unwrap();

            let mut recomputed = solution.clone();
            recomputed.validate(&instance);
            prop_assert!((recomputed.cost - solution.cost).abs() < 1e-6);
            prop_assert_eq!(recomputed.feasible, solution.feasible);

            let mut served: Vec<usize> = solution.served_requests().collect();
            served.extend(solution.unassigned.iter().copied());
            served.sort_unstable();
            prop_assert_eq!(served, instance.request_ids().collect::<Vec<_>>());

            if solution.feasible {
                for route in &solution.routes {
                    prop_assert!(route.trips.len() <= instance.max_trips);
                    for trip in &route.trips {
                        prop_assert!(trip.distance <= instance.max_trip_distance + 1e-9);
                        for (&r, &start) in trip.requests.iter().zip(&trip.service_starts) {
                            let request = instance.request(r);
                            prop_assert!(start >= request.earliest - 1e-9 && start <= request.latest + 1e-9);
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_descent_never_breaks_feasibility(instance in random_instance(), seed in 0u64..1000) {
            use crate::heuristics::construction::{ConstructionHeuristic, GreedyRandomizedConstruction};
            use crate::heuristics::local_search::{LocalSearch, NeighborhoodDescent};

            let mut solution = GreedyRandomizedConstruction::new(0.5, seed).construct(&instance);
            let was_feasible = solution.feasible;
            let descent = NeighborhoodDescent::new(&NeighborhoodKind::standard_order(), crate::config::MovePolicy::BestImprovement, 1000);
            descent.improve(&instance, &mut solution);
            solution.validate(&instance);
            if was_feasible {
                prop_assert!(solution.feasible);
            }
        }
    }
}
