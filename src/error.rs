//! Error types for instance construction and solver configuration.
//!
//! Only fatal, fail-fast conditions are errors. Partial assignments, rejected
//! moves and exhausted budgets are states of the returned [`crate::Solution`].

use crate::config::NeighborhoodKind;

/// Invalid solver configuration, reported before any search starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveAntCount,
    EmptyNeighborhoodOrder,
    DuplicateNeighborhood(NeighborhoodKind),
    NonPositiveTimeLimit(f64),
    NonPositiveIterations,
    NonPositiveRestarts,
    InvalidEvaporation(f64),
    InvalidLocalDecay(f64),
    InvalidRclThreshold(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NonPositiveAntCount => write!(f, "ant count must be positive"),
            ConfigError::EmptyNeighborhoodOrder => write!(f, "neighborhood order must not be empty"),
            ConfigError::DuplicateNeighborhood(kind) => {
                write!(f, "neighborhood {} appears more than once", kind)
            }
            ConfigError::NonPositiveTimeLimit(t) => {
                write!(f, "time limit must be positive, got {}", t)
            }
            ConfigError::NonPositiveIterations => write!(f, "iteration budget must be positive"),
            ConfigError::NonPositiveRestarts => write!(f, "restart count must be positive"),
            ConfigError::InvalidEvaporation(rho) => {
                write!(f, "evaporation rate must lie in (0, 1), got {}", rho)
            }
            ConfigError::InvalidLocalDecay(xi) => {
                write!(f, "local pheromone decay must lie in [0, 1], got {}", xi)
            }
            ConfigError::InvalidRclThreshold(t) => {
                write!(f, "candidate list threshold must be non-negative, got {}", t)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Inconsistent instance data detected by [`crate::instance::Instance::new`].
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceError {
    NoRequests,
    NoVehicles,
    NoTrips,
    NonPositiveDistanceBudget(f64),
    MatrixDimension { matrix: &'static str, expected: usize, found: usize },
    NegativeEntry { matrix: &'static str, from: usize, to: usize },
    InvertedWindow { request: usize, earliest: f64, latest: f64 },
    NegativeServiceTime { request: usize },
    RequestIdMismatch { position: usize, id: usize },
}

impl std::fmt::Display for InstanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceError::NoRequests => write!(f, "instance has no requests"),
            InstanceError::NoVehicles => write!(f, "fleet size must be positive"),
            InstanceError::NoTrips => write!(f, "maximum trips per vehicle must be positive"),
            InstanceError::NonPositiveDistanceBudget(d) => {
                write!(f, "per-trip distance budget must be positive, got {}", d)
            }
            InstanceError::MatrixDimension { matrix, expected, found } => {
                write!(f, "{} matrix has dimension {}, expected {}", matrix, found, expected)
            }
            InstanceError::NegativeEntry { matrix, from, to } => {
                write!(f, "{} matrix has a negative entry at ({}, {})", matrix, from, to)
            }
            InstanceError::InvertedWindow { request, earliest, latest } => write!(
                f,
                "request {} has an inverted time window [{}, {}]",
                request, earliest, latest
            ),
            InstanceError::NegativeServiceTime { request } => {
                write!(f, "request {} has a negative service time", request)
            }
            InstanceError::RequestIdMismatch { position, id } => write!(
                f,
                "request at position {} has id {}, expected {}",
                position,
                id,
                position + 1
            ),
        }
    }
}

impl std::error::Error for InstanceError {}
