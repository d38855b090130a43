//! Heuristics module for the multi-trip DARP.
//!
//! Construction heuristics, the trip state machine and pheromone model used
//! by the ants, local search neighborhoods and the three drivers.

pub mod sampling;
pub mod construction;
pub mod trip_builder;
pub mod local_search;
pub mod pheromone;
pub mod aco;
pub mod grasp;
pub mod vns;

pub use construction::*;
pub use local_search::*;
pub use aco::*;
pub use grasp::*;
pub use vns::*;
