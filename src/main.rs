//! Multi-trip DARP Solver - Command Line Interface
//!
//! Solves multi-trip Dial-a-Ride instances stored as JSON with GRASP, VNS or
//! the multi-colony ant system, and compares the three methods over seeds.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mt_darp_solver::benchmark::{Benchmark, BenchmarkConfig};
use mt_darp_solver::config::{Config, Method, MovePolicy};
use mt_darp_solver::instance::Instance;
use mt_darp_solver::solution::Solution;
use mt_darp_solver::solve;

use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mt-darp-solver")]
#[command(version = "1.0")]
#[command(about = "Metaheuristic solver for the multi-trip Dial-a-Ride problem with time windows")]
struct Cli {
    /// Log search progress (debug level unless RUST_LOG says otherwise)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an instance with one method
    Solve {
        /// Path to the instance file (JSON)
        #[arg(short, long)]
        instance: PathBuf,

        /// Method to use (defaults to the one in --config, else acs)
        #[arg(short, long, value_enum)]
        method: Option<MethodArg>,

        /// Full solver configuration (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Ants per iteration
        #[arg(long)]
        ants: Option<usize>,

        /// Outer iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// GRASP restarts
        #[arg(long)]
        restarts: Option<usize>,

        /// Take the best move of each neighborhood instead of the first
        #[arg(long)]
        best_improvement: bool,

        /// Run on a single thread
        #[arg(long)]
        sequential: bool,

        /// Known optimal cost, for gap reporting
        #[arg(long)]
        reference_cost: Option<f64>,

        /// Output solution to file (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare methods over several seeds on an instance
    Compare {
        /// Path to the instance file (JSON)
        #[arg(short, long)]
        instance: PathBuf,

        /// Methods to compare
        #[arg(short, long, value_enum, value_delimiter = ',', default_values_t = vec![MethodArg::Grasp, MethodArg::Vns, MethodArg::Acs])]
        methods: Vec<MethodArg>,

        /// Number of runs per method
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Time limit per run in seconds
        #[arg(short, long, default_value = "10")]
        time_limit: f64,

        /// Base solver configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Known optimal cost, for gap reporting
        #[arg(long)]
        reference_cost: Option<f64>,

        /// Output directory for CSV results and the report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file (JSON)
        #[arg(short, long)]
        instance: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum MethodArg {
    /// Greedy randomized multi-start with local search
    Grasp,
    /// Variable Neighborhood Search
    Vns,
    /// Multi-colony Ant Colony System
    Acs,
}

impl std::fmt::Display for MethodArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => write!(f, "{}", value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Grasp => Method::Grasp,
            MethodArg::Vns => Method::Vns,
            MethodArg::Acs => Method::Acs,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Solve {
            instance,
            method,
            config,
            time_limit,
            seed,
            ants,
            iterations,
            restarts,
            best_improvement,
            sequential,
            reference_cost,
            output,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(method) = method {
                config.method = method.into();
            }
            if time_limit.is_some() {
                config.time_limit = time_limit;
            }
            if let Some(seed) = seed {
                config.random_seed = seed;
            }
            if let Some(ants) = ants {
                config.num_ants = ants;
            }
            if let Some(iterations) = iterations {
                config.max_iterations = iterations;
            }
            if let Some(restarts) = restarts {
                config.restart_count = restarts;
            }
            if best_improvement {
                config.move_policy = MovePolicy::BestImprovement;
            }
            if sequential {
                config.parallel = false;
            }
            if reference_cost.is_some() {
                config.reference_cost = reference_cost;
            }
            solve_instance(&instance, &config, output.as_deref(), cli.verbose)
        }

        Commands::Compare { instance, methods, runs, time_limit, config, reference_cost, output } => {
            let mut base = load_config(config.as_deref())?;
            base.time_limit = Some(time_limit);
            if reference_cost.is_some() {
                base.reference_cost = reference_cost;
            }
            let config = BenchmarkConfig {
                num_runs: runs,
                methods: methods.into_iter().map(Method::from).collect(),
                base,
            };
            compare_methods(&instance, config, output.as_deref())
        }

        Commands::Analyze { instance } => analyze_instance(&instance),
    }
}

fn load_instance(path: &Path) -> Result<Instance, Box<dyn Error>> {
    println!("Loading instance from {:?}...", path);
    let text = std::fs::read_to_string(path)?;
    let instance: Instance = serde_json::from_str(&text)?;
    instance.validate()?;
    Ok(instance)
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(Config::default()),
    }
}

fn solve_instance(path: &Path, config: &Config, output: Option<&Path>, verbose: bool) -> Result<(), Box<dyn Error>> {
    let instance = load_instance(path)?;
    if verbose {
        println!("{}", instance.statistics());
    }

    println!("Solving {} with {}...", instance, config.method);
    let solution = solve(&instance, config)?;

    print_solution(&solution);

    if let Some(out_path) = output {
        let json = serde_json::to_string_pretty(&solution)?;
        std::fs::write(out_path, json)?;
        println!("\nSolution saved to {:?}", out_path);
    }
    Ok(())
}

fn print_solution(solution: &Solution) {
    println!("\n========== Results ==========");
    println!("Method: {}", solution.algorithm);
    println!("Cost: {:.2}", solution.cost);
    println!("Feasible: {}", solution.feasible);
    println!("Trips: {}", solution.num_trips());
    println!("Time: {:.4}s", solution.computation_time);
    if let Some(iterations) = solution.iterations {
        println!("Iterations: {}", iterations);
    }
    if let Some(termination) = solution.termination {
        println!("Stopped by: {:?}", termination);
    }
    if let Some(gap) = solution.optimality_gap() {
        println!("Gap to reference: {:.2}%", gap * 100.0);
    }
    if !solution.unassigned.is_empty() {
        println!("Unserved requests: {:?}", solution.unassigned);
    }
    for violation in &solution.violations {
        println!("Violation: {}", violation);
    }

    println!("\nRoutes:");
    for route in solution.routes.iter().filter(|r| !r.trips.is_empty()) {
        println!("  Vehicle {} ({:.2}):", route.vehicle, route.distance());
        for (t, trip) in route.trips.iter().enumerate() {
            println!(
                "    Trip {}: {:?} depart {:.2} return {:.2} distance {:.2}",
                t, trip.requests, trip.departure, trip.return_time, trip.distance
            );
        }
    }
}

fn compare_methods(path: &Path, config: BenchmarkConfig, output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let instance = load_instance(path)?;
    let mut benchmark = Benchmark::new(config);

    let bar = ProgressBar::new(benchmark.num_jobs() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let methods = benchmark.config().methods.clone();
    let runs = benchmark.config().num_runs;
    for method in methods {
        for run in 0..runs {
            bar.set_message(format!("{} run {}", method, run + 1));
            let result = benchmark.run_once(&instance, method, run)?;
            benchmark.record(result);
            bar.inc(1);
        }
    }
    bar.finish_with_message("done");

    let report = benchmark.generate_report();
    println!("\n{}", report);

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)?;

        let results_path = dir.join("results.csv");
        benchmark.export_to_csv(File::create(&results_path)?)?;
        println!("Results exported to {:?}", results_path);

        let stats_path = dir.join("statistics.csv");
        benchmark.export_statistics_csv(File::create(&stats_path)?)?;
        println!("Statistics exported to {:?}", stats_path);

        let report_path = dir.join("report.txt");
        std::fs::write(&report_path, &report)?;
        println!("Report saved to {:?}", report_path);
    }
    Ok(())
}

fn analyze_instance(path: &Path) -> Result<(), Box<dyn Error>> {
    let instance = load_instance(path)?;

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    let ids: Vec<usize> = instance.request_ids().collect();
    let pairs = ids.len() * ids.len().saturating_sub(1);
    let compatible = ids
        .iter()
        .flat_map(|&i| ids.iter().map(move |&j| (i, j)))
        .filter(|&(i, j)| i != j && instance.can_follow(i, j))
        .count();

    println!("Window Compatibility:");
    if pairs > 0 {
        println!(
            "  Ordered pairs that may follow each other: {}/{} ({:.1}%)",
            compatible,
            pairs,
            100.0 * compatible as f64 / pairs as f64
        );
    }

    let round_trips: Vec<f64> = ids.iter().map(|&r| instance.round_trip_distance(r)).collect();
    let longest = round_trips.iter().copied().fold(0.0, f64::max);
    println!("\nDedicated Trips:");
    println!("  Longest round trip: {:.2} (budget {:.2})", longest, instance.max_trip_distance);
    println!(
        "  Fleet trip capacity: {} trips for {} requests",
        instance.num_vehicles * instance.max_trips,
        ids.len()
    );
    Ok(())
}
