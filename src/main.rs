//! CEVRP Solver - Command Line Interface
//!
//! A two-phase MMAS + ALNS solver for the Capacitated Electric Vehicle
//! Routing Problem.

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use statrs::statistics::Statistics;

use cevrp_solver::experiment::{Experiment, Profile};
use cevrp_solver::instance::CevrpInstance;
use cevrp_solver::solver::{self, SolutionDump};
use cevrp_solver::Graph;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "cevrp-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "A two-phase MMAS + ALNS solver for the CEVRP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one instance from the instance directory
    Solve {
        /// 1-based index of the instance; prompts interactively when absent
        index: Option<usize>,

        /// Directory containing .evrp instance files
        #[arg(short, long, default_value = "instances")]
        dir: PathBuf,

        /// Parameter profile: baseline, optimized or custom
        #[arg(short, long, default_value = "baseline")]
        profile: Profile,

        /// Random seed
        #[arg(short, long, default_value = "1234")]
        seed: u64,

        /// Base directory for run artifacts
        #[arg(short, long, default_value = "experiments")]
        output: PathBuf,

        /// Suppress progress bars and the route dump on stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Launch several independent solver processes on one instance
    Launch {
        /// 1-based index of the instance
        index: usize,

        /// Number of parallel runs
        #[arg(short, long, default_value = "4")]
        runs: usize,

        /// Directory containing .evrp instance files
        #[arg(short, long, default_value = "instances")]
        dir: PathBuf,

        /// Parameter profile for every run
        #[arg(short, long, default_value = "baseline")]
        profile: Profile,

        /// Base seed; run i uses seed + i
        #[arg(short, long, default_value = "1234")]
        seed: u64,

        /// Base directory for run artifacts
        #[arg(short, long, default_value = "experiments")]
        output: PathBuf,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },

    /// Compare several seeded runs on one instance
    Compare {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Number of runs
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Parameter profile for every run
        #[arg(short, long, default_value = "baseline")]
        profile: Profile,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Solve {
            index,
            dir,
            profile,
            seed,
            output,
            quiet,
        } => solve_command(index, &dir, profile, seed, &output, quiet),
        Commands::Launch {
            index,
            runs,
            dir,
            profile,
            seed,
            output,
        } => launch_command(index, runs, &dir, profile, seed, &output),
        Commands::Analyze { instance } => analyze_command(&instance),
        Commands::Compare {
            instance,
            runs,
            profile,
            output,
        } => compare_command(&instance, runs, profile, output),
    }
}

/// All .evrp files of a directory, sorted by name
fn list_instances(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|e| e == "evrp").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Numbered prompt over the instance files
fn select_instance(files: &[PathBuf]) -> PathBuf {
    println!("Select an instance by entering its number:");
    for (index, file) in files.iter().enumerate() {
        println!("{}: {}", index + 1, file.display());
    }
    loop {
        print!("Enter the number of the instance: ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            eprintln!("Failed to read input.");
            std::process::exit(1);
        }
        match line.trim().parse::<usize>() {
            Ok(selection) if selection >= 1 && selection <= files.len() => {
                return files[selection - 1].clone();
            }
            _ => println!("Invalid selection. Please enter a valid number."),
        }
    }
}

fn resolve_instance_file(index: Option<usize>, dir: &Path) -> PathBuf {
    let files = list_instances(dir);
    if files.is_empty() {
        eprintln!("No .evrp instances found in {}", dir.display());
        std::process::exit(1);
    }
    match index {
        Some(i) if i >= 1 && i <= files.len() => files[i - 1].clone(),
        Some(i) => {
            eprintln!("Instance index {} out of range (1..={})", i, files.len());
            std::process::exit(1);
        }
        None => select_instance(&files),
    }
}

fn load_instance(path: &Path) -> CevrpInstance {
    match CevrpInstance::from_file(path) {
        Ok(instance) => {
            println!("Instance successfully created from: {}", path.display());
            instance
        }
        Err(e) => {
            eprintln!("Error creating instance from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn solve_command(
    index: Option<usize>,
    dir: &Path,
    profile: Profile,
    seed: u64,
    output: &Path,
    quiet: bool,
) {
    let file = resolve_instance_file(index, dir);
    println!("Selected instance: {}", file.display());

    let instance = load_instance(&file);
    let experiment = Experiment::for_profile(profile, &instance, output);
    if let Err(e) = experiment.prepare_directory() {
        eprintln!("Cannot create run directory: {}", e);
        std::process::exit(1);
    }

    let outcome = match solver::solve(&instance, &experiment, seed, !quiet) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let graph = Graph::from_instance(&instance, 1.0).expect("graph was already built once");
    let report = solver::render_report(&graph, &outcome);
    if !quiet {
        println!("{}", report);
    } else {
        println!("Final total cost: {}", outcome.final_cost);
    }

    let dump = SolutionDump::new(&instance, &graph, &outcome);
    match solver::write_run_artifacts(&experiment.directory_path, &report, &dump) {
        Ok(()) => println!("Artifacts written to {}", experiment.directory_path.display()),
        Err(e) => eprintln!("Failed to write run artifacts: {}", e),
    }

    if !outcome.is_feasible() {
        eprintln!("No feasible solution found.");
        std::process::exit(1);
    }
}

fn launch_command(
    index: usize,
    runs: usize,
    dir: &Path,
    profile: Profile,
    seed: u64,
    output: &Path,
) {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("Cannot locate the solver executable: {}", e);
            std::process::exit(1);
        }
    };

    let mut children = Vec::new();
    for run in 0..runs {
        let run_seed = seed + run as u64;
        println!("Launching parallel run #{} with seed {}", run + 1, run_seed);
        let child = ProcessCommand::new(&exe)
            .arg("solve")
            .arg(index.to_string())
            .arg("--dir")
            .arg(dir)
            .arg("--profile")
            .arg(profile.name())
            .arg("--seed")
            .arg(run_seed.to_string())
            .arg("--output")
            .arg(output)
            .arg("--quiet")
            .spawn();
        match child {
            Ok(child) => children.push(child),
            Err(e) => eprintln!("Run #{} failed to start: {}", run + 1, e),
        }
    }

    println!("Waiting for all runs to finish...");
    let mut failures = 0;
    for (run, child) in children.into_iter().enumerate() {
        match child.wait_with_output() {
            Ok(result) if result.status.success() => {
                println!("Run #{} completed successfully", run + 1);
            }
            Ok(result) => {
                failures += 1;
                println!("Run #{} failed with status {}", run + 1, result.status);
            }
            Err(e) => {
                failures += 1;
                println!("Run #{} failed: {}", run + 1, e);
            }
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }
}

fn analyze_command(path: &Path) {
    let instance = load_instance(path);
    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());
}

fn compare_command(path: &Path, runs: usize, profile: Profile, output: Option<PathBuf>) {
    let instance = load_instance(path);
    println!(
        "Comparing {} seeded runs on {} ({} customers)...\n",
        runs,
        instance.name,
        instance.num_customers()
    );

    let results: Vec<(u64, Option<f64>, f64)> = (0..runs as u64)
        .into_par_iter()
        .map(|seed| {
            let experiment =
                Experiment::for_profile(profile, &instance, &PathBuf::from("experiments"));
            let start = Instant::now();
            let cost = solver::solve(&instance, &experiment, seed, false)
                .ok()
                .filter(|o| o.is_feasible())
                .map(|o| o.final_cost);
            (seed, cost, start.elapsed().as_secs_f64())
        })
        .collect();

    let costs: Vec<f64> = results.iter().filter_map(|&(_, cost, _)| cost).collect();
    let times: Vec<f64> = results.iter().map(|&(_, _, time)| time).collect();

    println!("{:<8} {:>12} {:>10}", "Seed", "Cost", "Time");
    println!("{}", "-".repeat(34));
    for (seed, cost, time) in &results {
        match cost {
            Some(cost) => println!("{:<8} {:>12.2} {:>9.2}s", seed, cost, time),
            None => println!("{:<8} {:>12} {:>9.2}s", seed, "infeasible", time),
        }
    }

    if !costs.is_empty() {
        println!("\n========== Summary ==========");
        println!("Feasible runs: {}/{}", costs.len(), runs);
        println!("Best cost:     {:.2}", costs.iter().cloned().fold(f64::INFINITY, f64::min));
        println!("Mean cost:     {:.2}", (&costs).mean());
        if costs.len() > 1 {
            println!("Std dev:       {:.2}", (&costs).std_dev());
        }
        println!("Mean time:     {:.2}s", (&times).mean());
    } else {
        println!("\nNo feasible runs.");
    }

    if let Some(out_path) = output {
        match write_compare_csv(&out_path, &results) {
            Ok(()) => println!("\nResults exported to {}", out_path.display()),
            Err(e) => eprintln!("Failed to export results: {}", e),
        }
    }

    if costs.is_empty() {
        std::process::exit(1);
    }
}

fn write_compare_csv(
    path: &Path,
    results: &[(u64, Option<f64>, f64)],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["seed", "cost", "feasible", "seconds"])?;
    for (seed, cost, time) in results {
        writer.write_record([
            seed.to_string(),
            cost.map(|c| format!("{:.4}", c)).unwrap_or_default(),
            cost.is_some().to_string(),
            format!("{:.4}", time),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
