//! Experiment configuration for solver runs.
//!
//! An `Experiment` bundles every tunable of the two-phase solver. The
//! "baseline", "optimized" and "custom" profiles differ only in their
//! numeric values; everything else about a run (instance, seed) is passed
//! alongside.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::instance::CevrpInstance;

/// Ant step budget shared by all profiles
pub const MAX_ANT_STEPS: usize = 10_000;

/// No-improvement streak tolerated by the MMAS phase
pub const MAX_ITERATION_IMPROVEMENT: usize = 5;

/// Named parameter profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Baseline,
    Optimized,
    Custom,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Baseline => "baseline",
            Profile::Optimized => "optimized",
            Profile::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Profile::Baseline),
            "optimized" => Ok(Profile::Optimized),
            "custom" => Ok(Profile::Custom),
            other => Err(format!("unknown profile: {}", other)),
        }
    }
}

/// Full parameter set of one solver run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub num_ants: usize,
    pub max_ant_steps: usize,
    pub num_iterations: usize,
    pub max_iteration_improvement: usize,
    pub alns_iterations: usize,
    /// Outcome scores [new best, better, accepted, rejected]
    pub rw_weights: [f64; 4],
    pub rw_decay: f64,
    pub autofit_start_threshold: f64,
    pub autofit_end_threshold: f64,
    /// Run directory for logs and solution dumps
    pub directory_path: PathBuf,
}

impl Experiment {
    /// Build the experiment for a profile and instance. `num_ants` scales
    /// with the customer-side node count of the instance.
    pub fn for_profile(profile: Profile, instance: &CevrpInstance, base_dir: &Path) -> Self {
        let num_ants = instance.dimension + 1;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let directory_path = base_dir
            .join(profile.name())
            .join(&instance.name)
            .join(timestamp);

        match profile {
            Profile::Baseline => Experiment {
                num_ants,
                max_ant_steps: MAX_ANT_STEPS,
                num_iterations: 30,
                max_iteration_improvement: MAX_ITERATION_IMPROVEMENT,
                alns_iterations: 30,
                rw_weights: [25.0, 5.0, 1.0, 0.5],
                rw_decay: 0.8,
                autofit_start_threshold: 0.02,
                autofit_end_threshold: 0.0,
                directory_path,
            },
            Profile::Optimized => Experiment {
                num_ants,
                max_ant_steps: MAX_ANT_STEPS,
                num_iterations: 10,
                max_iteration_improvement: MAX_ITERATION_IMPROVEMENT,
                alns_iterations: 50,
                rw_weights: [8.0, 5.0, 1.0, 0.5],
                rw_decay: 0.8,
                autofit_start_threshold: 0.02,
                autofit_end_threshold: 0.0,
                directory_path,
            },
            Profile::Custom => Experiment {
                num_ants,
                max_ant_steps: MAX_ANT_STEPS,
                num_iterations: 50,
                max_iteration_improvement: MAX_ITERATION_IMPROVEMENT,
                alns_iterations: 200,
                rw_weights: [25.0, 5.0, 1.0, 0.5],
                rw_decay: 0.8,
                autofit_start_threshold: 0.02,
                autofit_end_threshold: 0.0,
                directory_path,
            },
        }
    }

    /// Create the run directory on disk
    pub fn prepare_directory(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory_path)
    }
}
