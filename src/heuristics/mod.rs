//! Heuristics module for the CEVRP.
//!
//! This module exports the MMAS construction phase, its pheromone
//! arithmetic and the local search improvement kit.

pub mod local_search;
pub mod mmas;
pub mod pheromone;

pub use mmas::{Ant, Mmas, MmasConfig, MmasResult};
