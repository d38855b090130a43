//! Basic Variable Neighborhood Search.
//!
//! The incumbent is shaken with `k + 1` random feasible moves of
//! neighborhood `k`, improved by the descent, and replaced when the result
//! is better; `k` then returns to the first neighborhood, otherwise it
//! advances. A pass over every neighborhood is one outer iteration.

use crate::budget::SearchBudget;
use crate::config::Config;
use crate::evaluation;
use crate::heuristics::construction::{repair_unassigned, ConstructionHeuristic, GreedyRandomizedConstruction};
use crate::heuristics::local_search::{random_neighbor, LocalSearch, NeighborhoodDescent};
use crate::heuristics::sampling::{rng_for, stream_seed};
use crate::solution::{SearchStats, Solution, Termination};
use crate::instance::Instance;

pub struct VariableNeighborhoodSearch {
    config: Config,
}

impl VariableNeighborhoodSearch {
    pub fn new(config: Config) -> Self {
        VariableNeighborhoodSearch { config }
    }

    /// Apply `strength` random feasible moves of neighborhood `k`
    fn shake<R: rand::Rng>(&self, instance: &Instance, solution: &mut Solution, k: usize, strength: usize, rng: &mut R) {
        let kind = self.config.neighborhood_order[k];
        for _ in 0..strength {
            match random_neighbor(kind, instance, solution, rng) {
                Some((_, evaluated)) => evaluation::commit(solution, evaluated),
                None => break,
            }
        }
    }

    pub fn run(&self, instance: &Instance) -> Solution {
        let config = &self.config;
        let budget = SearchBudget::new(config.time_limit, config.max_iterations, config.max_no_improve);
        let descent = NeighborhoodDescent::from_config(config);
        let mut rng = rng_for(config.random_seed, 1);
        let mut stats = SearchStats::default();

        let construction = GreedyRandomizedConstruction::new(config.rcl_threshold, stream_seed(config.random_seed, 0));
        let mut incumbent = construction.construct(instance);
        descent.improve(instance, &mut incumbent);
        stats.absorb(&incumbent.stats);
        log::info!("VNS: initial cost {:.2} (feasible: {})", incumbent.cost, incumbent.feasible);

        let neighborhoods = config.neighborhood_order.len();
        let mut iteration = 0;
        let mut no_improve = 0;
        let termination = 'outer: loop {
            let mut improved = false;
            let mut k = 0;
            while k < neighborhoods {
                let mut candidate = incumbent.clone();
                candidate.stats = SearchStats::default();
                self.shake(instance, &mut candidate, k, k + 1, &mut rng);
                repair_unassigned(instance, &mut candidate);
                descent.improve(instance, &mut candidate);

                stats.solutions_explored += 1;
                stats.moves_applied += candidate.stats.moves_applied;
                if candidate.feasible {
                    stats.feasible_solutions += 1;
                }

                if candidate.is_better_than(&incumbent) {
                    log::debug!("VNS: neighborhood {} improved to {:.2}", config.neighborhood_order[k], candidate.cost);
                    incumbent = candidate;
                    stats.improvements += 1;
                    improved = true;
                    k = 0;
                } else {
                    k += 1;
                }

                if budget.out_of_time() {
                    iteration += 1;
                    break 'outer Termination::TimeLimit;
                }
            }

            iteration += 1;
            no_improve = if improved { 0 } else { no_improve + 1 };
            if let Some(reason) = budget.exhausted(iteration, no_improve) {
                break reason;
            }
        };

        stats.iterations = iteration;
        incumbent.algorithm = "VNS".to_string();
        incumbent.computation_time = budget.elapsed();
        incumbent.iterations = Some(iteration);
        incumbent.termination = Some(termination);
        incumbent.stats = stats;
        log::info!("VNS finished after {} iterations ({:?}): cost {:.2}", iteration, termination, incumbent.cost);
        incumbent
    }
}
