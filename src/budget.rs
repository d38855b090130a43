//! Cooperative search budget, checked by drivers between outer iterations.

use crate::solution::Termination;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SearchBudget {
    start: Instant,
    time_limit: Option<Duration>,
    max_iterations: usize,
    max_no_improve: Option<usize>,
}

impl SearchBudget {
    pub fn new(time_limit: Option<f64>, max_iterations: usize, max_no_improve: Option<usize>) -> Self {
        SearchBudget {
            start: Instant::now(),
            time_limit: time_limit.map(Duration::from_secs_f64),
            max_iterations,
            max_no_improve,
        }
    }

    /// Seconds since the budget was created
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn out_of_time(&self) -> bool {
        self.time_limit.is_some_and(|limit| self.start.elapsed() >= limit)
    }

    /// Reason to stop after `iterations` completed outer iterations, the
    /// last `no_improve` of which did not improve the best solution.
    pub fn exhausted(&self, iterations: usize, no_improve: usize) -> Option<Termination> {
        if iterations >= self.max_iterations {
            Some(Termination::IterationLimit)
        } else if self.max_no_improve.is_some_and(|limit| no_improve >= limit) {
            Some(Termination::Stagnation)
        } else if self.out_of_time() {
            Some(Termination::TimeLimit)
        } else {
            None
        }
    }
}
