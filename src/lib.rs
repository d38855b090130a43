//! Multi-trip DARP Solver Library
//!
//! Metaheuristic engine for a multi-trip Dial-a-Ride problem with time
//! windows: a homogeneous fleet based at one depot serves coupled
//! collection/drop requests, each trip bounded by a distance budget and each
//! vehicle by a maximum number of trips.
//!
//! # Features
//!
//! - Feasibility and cost evaluation with constant-time move deltas
//! - Construction heuristics (earliest window first, greedy randomized insertion)
//! - Two-phase ant construction (bus-ant assignment, route-ant trip sequencing)
//! - Local search (2-opt, exchange, relocate, inter-vehicle relocate and swap, VND)
//! - Drivers: GRASP, VNS and a parallel Ant Colony System
//! - Benchmarking across methods and seeds
//!
//! # Example
//!
//! ```no_run
//! use mt_darp_solver::instance::InstanceBuilder;
//! use mt_darp_solver::{solve, Config, Method};
//!
//! let instance = InstanceBuilder::new("demo")
//!     .request(3.0, 4.0, 0.0, 60.0, 1.0)
//!     .request(-2.0, 1.0, 10.0, 80.0, 1.0)
//!     .vehicles(2)
//!     .max_trips(2)
//!     .max_trip_distance(30.0)
//!     .build()
//!     .unwrap();
//!
//! let solution = solve(&instance, &Config::with_method(Method::Acs)).unwrap();
//! println!("Solution cost: {:.2}", solution.cost);
//! ```

pub mod error;
pub mod instance;
pub mod config;
pub mod solution;
pub mod evaluation;
pub mod budget;
pub mod heuristics;
pub mod solver;
pub mod benchmark;

pub use config::{Config, Method};
pub use error::{ConfigError, InstanceError};
pub use instance::Instance;
pub use solution::Solution;
pub use solver::solve;
