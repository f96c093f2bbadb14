//! CEVRP Solver Library
//!
//! A two-phase hybrid metaheuristic for the Capacitated Electric Vehicle
//! Routing Problem (CEVRP).
//!
//! # Features
//!
//! - EVRP-LIB instance parsing (depot, customers, charging stations)
//! - Max-Min Ant System construction with bounded pheromones
//! - Local search kit (2-opt, 2-opt*, node-shift, swap/reverse/block moves)
//! - Adaptive Large Neighborhood Search with Roulette Wheel operator
//!   selection and Record-to-Record Travel acceptance
//! - Energy-aware charging station splicing
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use cevrp_solver::experiment::{Experiment, Profile};
//! use cevrp_solver::instance::CevrpInstance;
//! use cevrp_solver::solver;
//!
//! let instance = CevrpInstance::from_file("instances/E-n22-k4.evrp").unwrap();
//! let experiment =
//!     Experiment::for_profile(Profile::Baseline, &instance, &PathBuf::from("experiments"));
//!
//! let outcome = solver::solve(&instance, &experiment, 1234, false).unwrap();
//! println!("Final total cost: {:.2}", outcome.final_cost);
//! ```

pub mod alns;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod heuristics;
pub mod instance;
pub mod route;
pub mod solver;
pub mod state;

pub use error::SolverError;
pub use graph::Graph;
pub use instance::CevrpInstance;
pub use route::Route;
pub use state::CevrpState;
