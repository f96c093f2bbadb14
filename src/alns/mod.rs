//! Adaptive Large Neighborhood Search for the CEVRP.
//!
//! The engine owns a registry of destroy and repair operators, two adaptive
//! roulette wheels over them, and a Record-to-Record Travel acceptance
//! criterion. Each iteration destroys the current state, repairs it, scores
//! the outcome and updates the operator weights; a new global best triggers
//! one randomly chosen local-search polish.

pub mod accept;
pub mod destroy;
pub mod repair;
pub mod select;

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::graph::Graph;
use crate::heuristics::local_search;
use crate::state::CevrpState;

use accept::RecordToRecordTravel;
use select::{Outcome, RouletteWheel};

const EPS: f64 = 1e-9;

/// A destroy operator: deep-copies the state, displaces customers into
/// `unassigned` and returns the new state, or `None` on a failed
/// precondition.
pub type DestroyOperator = fn(&CevrpState, &Graph, &mut ChaCha8Rng) -> Option<CevrpState>;

/// A repair operator: reinserts every unassigned customer and returns a
/// fully feasible state, or `None` when it cannot.
pub type RepairOperator = fn(&CevrpState, &Graph, &mut ChaCha8Rng) -> Option<CevrpState>;

/// ALNS configuration parameters
#[derive(Debug, Clone)]
pub struct AlnsConfig {
    /// Number of destroy/repair iterations
    pub num_iterations: usize,
    /// Outcome scores [new best, better, accepted, rejected]
    pub rw_weights: [f64; 4],
    /// Weight decay of the roulette wheels
    pub rw_decay: f64,
    /// Starting RRT threshold as a fraction of the initial objective
    pub start_threshold: f64,
    /// Final RRT threshold as a fraction of the initial objective
    pub end_threshold: f64,
    /// Random seed
    pub seed: u64,
    /// Wall-clock budget in seconds for the improvement phase
    pub time_limit: f64,
    /// Render an iteration progress bar
    pub show_progress: bool,
}

impl Default for AlnsConfig {
    fn default() -> Self {
        AlnsConfig {
            num_iterations: 200,
            rw_weights: [25.0, 5.0, 1.0, 0.5],
            rw_decay: 0.8,
            start_threshold: 0.02,
            end_threshold: 0.0,
            seed: 1234,
            time_limit: 600.0,
            show_progress: false,
        }
    }
}

/// Pick and score counters for one operator, for the run report
#[derive(Debug, Clone)]
pub struct OperatorStats {
    pub name: &'static str,
    pub picks: usize,
    pub new_best: usize,
}

/// Outcome of an ALNS run
#[derive(Debug, Clone)]
pub struct AlnsResult {
    pub best: CevrpState,
    pub best_cost: f64,
    pub iterations: usize,
    /// Best objective on record after each iteration
    pub best_trajectory: Vec<f64>,
    pub destroy_stats: Vec<OperatorStats>,
    pub repair_stats: Vec<OperatorStats>,
}

/// The ALNS engine
pub struct Alns<'a> {
    graph: &'a Graph,
    config: AlnsConfig,
    destroy_operators: Vec<(&'static str, DestroyOperator)>,
    repair_operators: Vec<(&'static str, RepairOperator)>,
}

impl<'a> Alns<'a> {
    pub fn new(graph: &'a Graph, config: AlnsConfig) -> Self {
        Alns {
            graph,
            config,
            destroy_operators: Vec::new(),
            repair_operators: Vec::new(),
        }
    }

    /// Engine with the standard operator registry
    pub fn with_default_operators(graph: &'a Graph, config: AlnsConfig) -> Self {
        let mut alns = Alns::new(graph, config);
        alns.add_destroy_operator("remove_overcapacity_nodes", destroy::remove_overcapacity_nodes);
        alns.add_destroy_operator("remove_charging_station", destroy::remove_charging_station);
        alns.add_destroy_operator("worst_removal", destroy::worst_removal);
        alns.add_destroy_operator("cluster_removal", destroy::cluster_removal);
        alns.add_repair_operator("greedy_insertion", repair::greedy_insertion);
        alns.add_repair_operator("regret_k_insertion", repair::regret_k_insertion);
        alns.add_repair_operator("best_feasible_insertion", repair::best_feasible_insertion);
        alns
    }

    pub fn add_destroy_operator(&mut self, name: &'static str, operator: DestroyOperator) {
        self.destroy_operators.push((name, operator));
    }

    pub fn add_repair_operator(&mut self, name: &'static str, operator: RepairOperator) {
        self.repair_operators.push((name, operator));
    }

    /// Run the search from an initial state
    pub fn run(&self, initial: CevrpState) -> AlnsResult {
        assert!(
            !self.destroy_operators.is_empty() && !self.repair_operators.is_empty(),
            "ALNS needs at least one destroy and one repair operator"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut destroy_wheel = RouletteWheel::new(
            self.config.rw_weights,
            self.config.rw_decay,
            self.destroy_operators.len(),
        );
        let mut repair_wheel = RouletteWheel::new(
            self.config.rw_weights,
            self.config.rw_decay,
            self.repair_operators.len(),
        );
        let acceptance = RecordToRecordTravel::autofit(
            initial.objective(),
            self.config.start_threshold,
            self.config.end_threshold,
            self.config.num_iterations,
        );

        let mut destroy_stats: Vec<OperatorStats> = self
            .destroy_operators
            .iter()
            .map(|(name, _)| OperatorStats {
                name,
                picks: 0,
                new_best: 0,
            })
            .collect();
        let mut repair_stats: Vec<OperatorStats> = self
            .repair_operators
            .iter()
            .map(|(name, _)| OperatorStats {
                name,
                picks: 0,
                new_best: 0,
            })
            .collect();

        let mut current = initial.clone();
        let mut best = initial;
        let mut best_cost = best.objective();

        let bar = if self.config.show_progress {
            let bar = ProgressBar::new(self.config.num_iterations as u64);
            bar.set_style(
                ProgressStyle::with_template("ALNS {bar:30} {pos}/{len} best={msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        } else {
            None
        };

        let start = Instant::now();
        let mut iterations = 0usize;
        let mut best_trajectory = Vec::with_capacity(self.config.num_iterations);

        for iteration in 0..self.config.num_iterations {
            let destroy_index = destroy_wheel.select(&mut rng);
            let repair_index = repair_wheel.select(&mut rng);
            destroy_stats[destroy_index].picks += 1;
            repair_stats[repair_index].picks += 1;

            // The engine never hands its own states out mutably: operators
            // receive a shared reference and clone before touching anything.
            let candidate = (self.destroy_operators[destroy_index].1)(&current, self.graph, &mut rng)
                .and_then(|destroyed| {
                    (self.repair_operators[repair_index].1)(&destroyed, self.graph, &mut rng)
                });

            let outcome = match candidate {
                Some(candidate) => {
                    debug_assert!(candidate.covers_customers_exactly_once(self.graph));
                    let cost = candidate.objective();
                    if cost < best_cost - EPS {
                        // New global best: polish with a random local-search
                        // operator before recording it
                        let mut polished = candidate;
                        let operator_name =
                            local_search::apply_random_operator(self.graph, &mut polished, &mut rng);
                        debug!(
                            "iteration {}: new best {:.2} (polished by {})",
                            iteration,
                            polished.objective(),
                            operator_name
                        );
                        best = polished.clone();
                        best_cost = polished.objective();
                        current = polished;
                        destroy_stats[destroy_index].new_best += 1;
                        repair_stats[repair_index].new_best += 1;
                        Outcome::Best
                    } else if acceptance.accepts(best_cost, cost, iteration) {
                        let better = cost < current.objective() - EPS;
                        current = candidate;
                        if better {
                            Outcome::Better
                        } else {
                            Outcome::Accepted
                        }
                    } else {
                        Outcome::Rejected
                    }
                }
                // Operator precondition failed: keep the previous state
                None => Outcome::Rejected,
            };

            destroy_wheel.update(destroy_index, outcome);
            repair_wheel.update(repair_index, outcome);
            iterations = iteration + 1;
            best_trajectory.push(best_cost);

            if let Some(bar) = &bar {
                bar.set_message(format!("{:.2}", best_cost));
                bar.inc(1);
            }

            if start.elapsed().as_secs_f64() >= self.config.time_limit {
                debug!("ALNS wall-clock budget exhausted");
                break;
            }
        }

        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }

        AlnsResult {
            best,
            best_cost,
            iterations,
            best_trajectory,
            destroy_stats,
            repair_stats,
        }
    }
}
