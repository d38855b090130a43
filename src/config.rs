//! Solver configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Metaheuristic driver selected by [`Config::method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Grasp,
    Vns,
    Acs,
}

impl Method {
    pub fn all() -> [Method; 3] {
        [Method::Grasp, Method::Vns, Method::Acs]
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Grasp => write!(f, "GRASP"),
            Method::Vns => write!(f, "VNS"),
            Method::Acs => write!(f, "ACS"),
        }
    }
}

/// Acceptance policy inside a neighborhood scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovePolicy {
    FirstImprovement,
    BestImprovement,
}

/// Neighborhood identifiers, listed by increasing perturbation strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeighborhoodKind {
    /// Reverse a segment of one trip
    TwoOpt,
    /// Swap two requests of one trip
    Exchange,
    /// Move a request to another position or trip of the same vehicle
    Relocate,
    /// Move a request to another vehicle
    InterRelocate,
    /// Swap two requests served by different vehicles
    InterSwap,
}

impl NeighborhoodKind {
    pub fn standard_order() -> Vec<NeighborhoodKind> {
        vec![
            NeighborhoodKind::TwoOpt,
            NeighborhoodKind::Exchange,
            NeighborhoodKind::Relocate,
            NeighborhoodKind::InterRelocate,
            NeighborhoodKind::InterSwap,
        ]
    }
}

impl std::fmt::Display for NeighborhoodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NeighborhoodKind::TwoOpt => "two-opt",
            NeighborhoodKind::Exchange => "exchange",
            NeighborhoodKind::Relocate => "relocate",
            NeighborhoodKind::InterRelocate => "inter-relocate",
            NeighborhoodKind::InterSwap => "inter-swap",
        };
        write!(f, "{}", name)
    }
}

/// Configuration shared by all drivers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver to run
    pub method: Method,
    /// Pheromone importance
    pub alpha: f64,
    /// Heuristic importance
    pub beta: f64,
    /// Pheromone importance of the route-ant phase, `alpha` when unset
    pub route_alpha: Option<f64>,
    /// Heuristic importance of the route-ant phase, `beta` when unset
    pub route_beta: Option<f64>,
    /// Evaporation rate, in (0, 1)
    pub rho: f64,
    /// Ants per iteration (m)
    pub num_ants: usize,
    /// Outer iterations (ACS iterations, VNS cycles)
    pub max_iterations: usize,
    /// Outer iterations without improvement before stopping
    pub max_no_improve: Option<usize>,
    /// GRASP restarts
    pub restart_count: usize,
    /// Wall-clock budget in seconds
    pub time_limit: Option<f64>,
    /// Neighborhoods explored by local search, in order
    pub neighborhood_order: Vec<NeighborhoodKind>,
    pub move_policy: MovePolicy,
    pub random_seed: u64,
    /// ACS local pheromone decay (xi)
    pub local_decay: f64,
    /// Global deposit factor, deposit = q / cost
    pub deposit: f64,
    /// GRASP candidate list threshold relative to the best insertion cost
    pub rcl_threshold: f64,
    /// Moves applied by one local search call before it stops
    pub max_moves: usize,
    /// Factor applied to pheromone along choices of an infeasible ant
    pub infeasible_decay: f64,
    /// Run ants and restarts on the rayon pool
    pub parallel: bool,
    /// Reference optimal cost from an exact method, for gap reporting
    pub reference_cost: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            method: Method::Acs,
            alpha: 1.0,
            beta: 2.0,
            route_alpha: None,
            route_beta: None,
            rho: 0.1,
            num_ants: 10,
            max_iterations: 100,
            max_no_improve: Some(30),
            restart_count: 20,
            time_limit: Some(60.0),
            neighborhood_order: NeighborhoodKind::standard_order(),
            move_policy: MovePolicy::FirstImprovement,
            random_seed: 42,
            local_decay: 0.1,
            deposit: 1.0,
            rcl_threshold: 0.2,
            max_moves: 10_000,
            infeasible_decay: 0.9,
            parallel: true,
            reference_cost: None,
        }
    }
}

impl Config {
    pub fn with_method(method: Method) -> Self {
        Config {
            method,
            ..Default::default()
        }
    }

    /// Pheromone and heuristic weights of the route-ant phase
    pub fn route_weights(&self) -> (f64, f64) {
        (self.route_alpha.unwrap_or(self.alpha), self.route_beta.unwrap_or(self.beta))
    }

    /// Fail fast on settings no driver can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_ants == 0 {
            return Err(ConfigError::NonPositiveAntCount);
        }
        if self.neighborhood_order.is_empty() {
            return Err(ConfigError::EmptyNeighborhoodOrder);
        }
        for (i, kind) in self.neighborhood_order.iter().enumerate() {
            if self.neighborhood_order[..i].contains(kind) {
                return Err(ConfigError::DuplicateNeighborhood(*kind));
            }
        }
        if let Some(limit) = self.time_limit {
            if !(limit > 0.0) {
                return Err(ConfigError::NonPositiveTimeLimit(limit));
            }
        }
        if self.max_iterations == 0 || self.max_moves == 0 || self.max_no_improve == Some(0) {
            return Err(ConfigError::NonPositiveIterations);
        }
        if self.restart_count == 0 {
            return Err(ConfigError::NonPositiveRestarts);
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(ConfigError::InvalidEvaporation(self.rho));
        }
        if !(0.0..=1.0).contains(&self.local_decay) {
            return Err(ConfigError::InvalidLocalDecay(self.local_decay));
        }
        if !(self.rcl_threshold >= 0.0) {
            return Err(ConfigError::InvalidRclThreshold(self.rcl_threshold));
        }
        Ok(())
    }
}
