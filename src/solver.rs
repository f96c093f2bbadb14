//! Two-phase solve orchestration.
//!
//! Construction first: MMAS builds customer-only routes, the local search
//! kit polishes them and the station splicer restores energy feasibility.
//! Improvement second: the ALNS engine destroys and repairs the solution
//! for a fixed number of iterations. The run report carries the log lines
//! and route dumps of both phases.

use std::path::Path;
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::alns::{repair, Alns, AlnsConfig, OperatorStats};
use crate::error::SolverError;
use crate::experiment::Experiment;
use crate::graph::Graph;
use crate::heuristics::local_search;
use crate::heuristics::{Mmas, MmasConfig};
use crate::instance::CevrpInstance;
use crate::route::Route;
use crate::state::CevrpState;

/// Wall-clock budget and no-improvement streak for an instance size.
///
/// Small instances get one scaled minute block per hundred nodes and a long
/// stall tolerance; the tolerance shrinks as instances grow.
pub fn execution_params(dimension: usize) -> (u64, usize) {
    let (theta, max_no_improve) = if dimension <= 101 {
        (1, 500)
    } else if dimension <= 916 {
        (2, 250)
    } else {
        (3, 100)
    };
    let minutes = ((theta * dimension) as f64 / 100.0 * 60.0).round() as u64;
    (minutes.max(1), max_no_improve)
}

/// Everything a finished run reports
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Routes after construction and local-search polish (customer-only)
    pub initial_routes: Vec<Route>,
    pub initial_cost: f64,
    pub aco_seconds: f64,
    pub mmas_iterations: usize,
    /// Final state after the ALNS phase
    pub final_state: CevrpState,
    pub final_cost: f64,
    pub alns_seconds: f64,
    pub alns_iterations: usize,
    pub destroy_stats: Vec<OperatorStats>,
    pub repair_stats: Vec<OperatorStats>,
}

impl SolveOutcome {
    /// A run is successful when every customer is served by feasible routes
    pub fn is_feasible(&self) -> bool {
        self.final_state.is_complete()
    }
}

/// Solve an instance under an experiment configuration.
pub fn solve(
    instance: &CevrpInstance,
    experiment: &Experiment,
    seed: u64,
    show_progress: bool,
) -> Result<SolveOutcome, SolverError> {
    let mut graph =
        Graph::from_instance(instance, 1.0).map_err(SolverError::InvalidInstance)?;
    let (minutes, max_no_improve) = execution_params(instance.dimension);
    let phase_budget = (minutes * 60) as f64;

    // Construction phase
    let aco_start = Instant::now();
    let mmas_config = MmasConfig {
        num_ants: experiment.num_ants,
        max_ant_steps: experiment.max_ant_steps,
        num_iterations: experiment.num_iterations,
        max_iteration_improvement: max_no_improve,
        seed,
        time_limit: phase_budget,
        show_progress,
        ..Default::default()
    };
    let mmas_result = Mmas::new(&mut graph, mmas_config).run()?;
    info!(
        "MMAS finished after {} iterations at cost {:.2}",
        mmas_result.iterations, mmas_result.cost
    );

    // Local-search polish: 2-opt per route, 2-opt* across routes, node-shift
    let polished: Vec<Route> = mmas_result
        .routes
        .iter()
        .map(|route| local_search::two_opt(&graph, route))
        .collect();
    let polished = local_search::two_opt_star(&graph, &polished);
    let polished = local_search::node_shift(&graph, &polished);
    let initial_cost: f64 = polished.iter().map(|r| r.total_cost).sum();
    let aco_seconds = aco_start.elapsed().as_secs_f64();

    // Improvement phase: splice stations, then destroy and repair
    let alns_start = Instant::now();
    let seeded = repair::smart_reinsertion(&CevrpState::new(polished.clone()), &graph);
    let alns_config = AlnsConfig {
        num_iterations: experiment.alns_iterations,
        rw_weights: experiment.rw_weights,
        rw_decay: experiment.rw_decay,
        start_threshold: experiment.autofit_start_threshold,
        end_threshold: experiment.autofit_end_threshold,
        seed: seed.wrapping_add(1),
        time_limit: phase_budget,
        show_progress,
    };
    let alns_result = Alns::with_default_operators(&graph, alns_config).run(seeded);
    let alns_seconds = alns_start.elapsed().as_secs_f64();
    info!(
        "ALNS finished after {} iterations at cost {:.2}",
        alns_result.iterations, alns_result.best_cost
    );

    Ok(SolveOutcome {
        initial_routes: polished,
        initial_cost,
        aco_seconds,
        mmas_iterations: mmas_result.iterations,
        final_cost: alns_result.best_cost,
        final_state: alns_result.best,
        alns_seconds,
        alns_iterations: alns_result.iterations,
        destroy_stats: alns_result.destroy_stats,
        repair_stats: alns_result.repair_stats,
    })
}

/// Boxed route dump, one line per route
pub fn format_routes(graph: &Graph, routes: &[Route]) -> String {
    let mut lines = vec![
        "╔════════════════════════════════════════╗".to_string(),
        "║               Found Routes             ║".to_string(),
        "╚════════════════════════════════════════╝".to_string(),
    ];
    for (index, route) in routes.iter().enumerate() {
        lines.push(format!(
            "► Route {}: {}\n  Cost: {}",
            index + 1,
            graph.format_nodes(&route.nodes),
            route.total_cost
        ));
        lines.push("-----------------------------------------".to_string());
    }
    lines.join("\n")
}

fn format_phase_time(seconds: f64) -> String {
    format!("{}m {:.2}s", (seconds / 60.0) as u64, seconds % 60.0)
}

/// Render the execution log of a finished run
pub fn render_report(graph: &Graph, outcome: &SolveOutcome) -> String {
    let mut report = String::new();
    report.push_str(&format!(
        "⏱ ACO Solution Execution time: {}\n",
        format_phase_time(outcome.aco_seconds)
    ));
    report.push_str(&format!(
        "ACO - Initial routes:\n{}\n",
        format_routes(graph, &outcome.initial_routes)
    ));
    report.push_str(&format!("ACO - Initial total cost: {}\n", outcome.initial_cost));
    report.push_str(&format!(
        "⏱ ALNS Optimization Execution time: {}\n",
        format_phase_time(outcome.alns_seconds)
    ));
    report.push_str(&format!(
        "ALNS - Final routes:\n{}\n",
        format_routes(graph, &outcome.final_state.routes)
    ));
    report.push_str(&format!("ALNS - Final total cost: {}\n", outcome.final_cost));

    report.push_str("\nOperator usage:\n");
    for stats in outcome.destroy_stats.iter().chain(&outcome.repair_stats) {
        report.push_str(&format!(
            "  {:<26} picks: {:<5} new best: {}\n",
            stats.name, stats.picks, stats.new_best
        ));
    }
    report
}

/// Serializable dump of the final solution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionDump {
    pub instance: String,
    pub cost: f64,
    pub feasible: bool,
    pub routes: Vec<Vec<String>>,
    pub unassigned: Vec<String>,
}

impl SolutionDump {
    pub fn new(instance: &CevrpInstance, graph: &Graph, outcome: &SolveOutcome) -> Self {
        SolutionDump {
            instance: instance.name.clone(),
            cost: outcome.final_cost,
            feasible: outcome.is_feasible(),
            routes: outcome
                .final_state
                .routes
                .iter()
                .map(|r| r.nodes.iter().map(|&n| graph.key(n).to_string()).collect())
                .collect(),
            unassigned: outcome
                .final_state
                .unassigned
                .iter()
                .map(|&n| graph.key(n).to_string())
                .collect(),
        }
    }
}

/// Write the run log and solution dump into the run directory
pub fn write_run_artifacts(
    directory: &Path,
    report: &str,
    dump: &SolutionDump,
) -> std::io::Result<()> {
    std::fs::create_dir_all(directory)?;
    std::fs::write(directory.join("run.log"), report)?;
    let json = serde_json::to_string_pretty(dump)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(directory.join("solution.json"), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Experiment, Profile};
    use std::path::PathBuf;

    const VILLAGE: &str = "\
TYPE: EVRP
VEHICLES: 2
DIMENSION: 7
STATIONS: 1
CAPACITY: 3
ENERGY_CAPACITY: 100
ENERGY_CONSUMPTION: 1.0
NODE_COORD_SECTION
1 0 0
2 2 1
3 3 1
4 4 1
5 -2 -1
6 -3 -1
7 -4 -1
8 0 5
DEMAND_SECTION
1 0
2 1
3 1
4 1
5 1
6 1
7 1
STATIONS_COORD_SECTION
8
DEPOT_SECTION
1
EOF
";

    fn setup() -> (CevrpInstance, Experiment) {
        let instance = CevrpInstance::parse(VILLAGE, "village").unwrap();
        let experiment =
            Experiment::for_profile(Profile::Baseline, &instance, &PathBuf::from("experiments"));
        (instance, experiment)
    }

    #[test]
    fn test_execution_params_table() {
        assert_eq!(execution_params(22), (13, 500));
        assert_eq!(execution_params(101), (61, 500));
        assert_eq!(execution_params(143), (172, 250));
        assert_eq!(execution_params(1001), (1802, 100));
        // Tiny test instances still get a non-zero budget
        assert_eq!(execution_params(1).0, 1);
    }

    #[test]
    fn test_solve_produces_feasible_outcome() {
        let (instance, experiment) = setup();
        let outcome = solve(&instance, &experiment, 42, false).unwrap();

        assert!(outcome.is_feasible());
        assert!(outcome.final_cost <= outcome.initial_cost + 1e-9);
        assert!(outcome.mmas_iterations > 0);
        assert!(outcome.alns_iterations > 0);

        let graph = Graph::from_instance(&instance, 1.0).unwrap();
        let recomputed: f64 = outcome
            .final_state
            .routes
            .iter()
            .map(|r| graph.path_cost(&r.nodes))
            .sum();
        assert!((recomputed - outcome.final_cost).abs() < 1e-6);
    }

    #[test]
    fn test_solve_is_deterministic_for_a_seed() {
        let (instance, experiment) = setup();
        let a = solve(&instance, &experiment, 7, false).unwrap();
        let b = solve(&instance, &experiment, 7, false).unwrap();
        assert!((a.final_cost - b.final_cost).abs() < 1e-12);

        let routes_a: Vec<_> = a.final_state.routes.iter().map(|r| r.nodes.clone()).collect();
        let routes_b: Vec<_> = b.final_state.routes.iter().map(|r| r.nodes.clone()).collect();
        assert_eq!(routes_a, routes_b);
    }

    #[test]
    fn test_report_carries_the_log_lines() {
        let (instance, experiment) = setup();
        let outcome = solve(&instance, &experiment, 11, false).unwrap();
        let graph = Graph::from_instance(&instance, 1.0).unwrap();
        let report = render_report(&graph, &outcome);

        assert!(report.contains("⏱ ACO Solution Execution time:"));
        assert!(report.contains("ACO - Initial total cost:"));
        assert!(report.contains("⏱ ALNS Optimization Execution time:"));
        assert!(report.contains("ALNS - Final total cost:"));
        assert!(report.contains("► Route 1:"));
    }

    #[test]
    fn test_solution_dump_uses_textual_keys() {
        let (instance, experiment) = setup();
        let outcome = solve(&instance, &experiment, 3, false).unwrap();
        let graph = Graph::from_instance(&instance, 1.0).unwrap();
        let dump = SolutionDump::new(&instance, &graph, &outcome);

        assert_eq!(dump.instance, "village");
        assert!(dump.feasible);
        for route in &dump.routes {
            assert_eq!(route.first().map(String::as_str), Some("1"));
            assert_eq!(route.last().map(String::as_str), Some("1"));
        }
        let rendered = serde_json::to_string(&dump).unwrap();
        assert!(rendered.contains("\"routes\""));
    }
}
