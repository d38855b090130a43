//! GRASP multi-start driver.
//!
//! Restarts are independent: restart `i` draws from its own stream derived
//! from the run seed, so the batch can run on the rayon pool and still give
//! the result of a sequential run. Restarts are processed in batches; the
//! time budget is checked between batches.

use crate::budget::SearchBudget;
use crate::config::Config;
use crate::heuristics::construction::{ConstructionHeuristic, GreedyRandomizedConstruction};
use crate::heuristics::local_search::{LocalSearch, NeighborhoodDescent};
use crate::heuristics::sampling::stream_seed;
use crate::instance::Instance;
use crate::solution::{SearchStats, Solution};
use rayon::prelude::*;

pub struct Grasp {
    config: Config,
}

impl Grasp {
    pub fn new(config: Config) -> Self {
        Grasp { config }
    }

    fn restart(&self, instance: &Instance, descent: &NeighborhoodDescent, index: usize) -> Solution {
        let seed = stream_seed(self.config.random_seed, index as u64);
        let mut solution = GreedyRandomizedConstruction::new(self.config.rcl_threshold, seed).construct(instance);
        descent.improve(instance, &mut solution);
        solution
    }

    pub fn run(&self, instance: &Instance) -> Solution {
        let config = &self.config;
        let budget = SearchBudget::new(config.time_limit, config.restart_count, None);
        let descent = NeighborhoodDescent::from_config(config);
        let batch = if config.parallel { rayon::current_num_threads().max(1) } else { 1 };

        let mut best: Option<Solution> = None;
        let mut stats = SearchStats::default();
        let mut done = 0;
        let termination = loop {
            let end = (done + batch).min(config.restart_count);
            let results: Vec<Solution> = if config.parallel {
                (done..end).into_par_iter().map(|i| self.restart(instance, &descent, i)).collect()
            } else {
                (done..end).map(|i| self.restart(instance, &descent, i)).collect()
            };

            // reduce in restart order so ties go to the lowest index
            for (offset, solution) in results.into_iter().enumerate() {
                stats.solutions_explored += 1;
                stats.moves_applied += solution.stats.moves_applied;
                if solution.feasible {
                    stats.feasible_solutions += 1;
                }
                if best.as_ref().map_or(true, |b| solution.is_better_than(b)) {
                    log::debug!("GRASP restart {}: new best {:.2} (feasible: {})", done + offset, solution.cost, solution.feasible);
                    stats.improvements += 1;
                    best = Some(solution);
                }
            }

            done = end;
            if let Some(reason) = budget.exhausted(done, 0) {
                break reason;
            }
        };

        let mut best = best.unwrap_or_else(|| Solution::new(instance.num_vehicles));
        stats.iterations = done;
        best.algorithm = "GRASP".to_string();
        best.computation_time = budget.elapsed();
        best.iterations = Some(done);
        best.termination = Some(termination);
        best.stats = stats;
        log::info!("GRASP finished after {} restarts ({:?}): cost {:.2}", done, termination, best.cost);
        best
    }
}
