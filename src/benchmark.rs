//! Benchmarking and experimentation module.
//!
//! Runs every configured method for several seeds on an instance, collects
//! per-run results and aggregates them per method. Export goes through any
//! `std::io::Write`, so opening files is left to the caller.

use crate::config::{Config, Method};
use crate::error::ConfigError;
use crate::instance::Instance;
use crate::solution::Solution;
use crate::solver;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::io::Write;

/// Result of a single run of one method on an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Method name
    pub method: String,
    /// Instance name
    pub instance: String,
    pub num_requests: usize,
    /// Run index within the method
    pub run: usize,
    pub seed: u64,
    /// Total travelled distance
    pub cost: f64,
    pub feasible: bool,
    /// Requests left unserved
    pub unassigned: usize,
    pub num_trips: usize,
    /// Computation time in seconds
    pub time: f64,
    pub iterations: Option<usize>,
    /// What stopped the run
    pub termination: Option<String>,
    /// Gap to the reference cost, in percent
    pub gap: Option<f64>,
    /// RFC 3339 time at which the run finished
    pub timestamp: String,
}

impl RunResult {
    pub fn from_solution(instance: &Instance, solution: &Solution, run: usize, seed: u64) -> Self {
        RunResult {
            method: solution.algorithm.clone(),
            instance: instance.name.clone(),
            num_requests: instance.num_requests(),
            run,
            seed,
            cost: solution.cost,
            feasible: solution.feasible,
            unassigned: solution.unassigned.len(),
            num_trips: solution.num_trips(),
            time: solution.computation_time,
            iterations: solution.iterations,
            termination: solution.termination.map(|t| format!("{:?}", t)),
            gap: solution.optimality_gap().map(|g| g * 100.0),
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Aggregated statistics for a method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodStatistics {
    pub method: String,
    /// Number of runs recorded
    pub num_runs: usize,
    /// Number of feasible runs
    pub num_feasible: usize,
    /// Average cost over feasible runs
    pub avg_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    /// Population standard deviation of cost over feasible runs
    pub std_cost: f64,
    pub avg_time: f64,
    pub total_time: f64,
    /// Average gap to the reference cost, in percent
    pub avg_gap: Option<f64>,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of seeds per method
    pub num_runs: usize,
    /// Methods to compare, in report order
    pub methods: Vec<Method>,
    /// Solver settings shared by every run; `method` and `random_seed` are
    /// overridden per run
    pub base: Config,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            methods: Method::all().to_vec(),
            base: Config {
                time_limit: Some(10.0),
                ..Default::default()
            },
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<RunResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Number of runs `run` performs on one instance
    pub fn num_jobs(&self) -> usize {
        self.config.methods.len() * self.config.num_runs
    }

    /// Solver settings for run `run` of `method`
    pub fn run_config(&self, method: Method, run: usize) -> Config {
        Config {
            method,
            random_seed: self.config.base.random_seed.wrapping_add(run as u64),
            ..self.config.base.clone()
        }
    }

    /// Solve the instance once, without recording the result
    pub fn run_once(&self, instance: &Instance, method: Method, run: usize) -> Result<RunResult, ConfigError> {
        let config = self.run_config(method, run);
        let solution = solver::solve(instance, &config)?;
        Ok(RunResult::from_solution(instance, &solution, run, config.random_seed))
    }

    pub fn record(&mut self, result: RunResult) {
        log::debug!(
            "{} run {} on {}: cost {:.2} (feasible: {}, {:.3}s)",
            result.method,
            result.run,
            result.instance,
            result.cost,
            result.feasible,
            result.time
        );
        self.results.push(result);
    }

    /// Run every configured method for every seed on an instance
    pub fn run(&mut self, instance: &Instance) -> Result<(), ConfigError> {
        log::info!("Running benchmark on instance: {}", instance.name);
        let methods = self.config.methods.clone();
        for method in methods {
            for run in 0..self.config.num_runs {
                let result = self.run_once(instance, method, run)?;
                self.record(result);
            }
        }
        Ok(())
    }

    /// Compute statistics for each method, in order of first appearance.
    /// Methods without a feasible run are skipped.
    pub fn compute_statistics(&self) -> Vec<MethodStatistics> {
        let mut groups: Vec<(String, Vec<&RunResult>)> = Vec::new();
        for result in &self.results {
            match groups.iter_mut().find(|(method, _)| *method == result.method) {
                Some((_, runs)) => runs.push(result),
                None => groups.push((result.method.clone(), vec![result])),
            }
        }

        let mut statistics = Vec::new();
        for (method, runs) in groups {
            let feasible: Vec<&RunResult> = runs.iter().copied().filter(|r| r.feasible).collect();
            if feasible.is_empty() {
                log::warn!("{}: no feasible run out of {}", method, runs.len());
                continue;
            }

            let costs: Vec<f64> = feasible.iter().map(|r| r.cost).collect();
            let times: Vec<f64> = runs.iter().map(|r| r.time).collect();
            let gaps: Vec<f64> = feasible.iter().filter_map(|r| r.gap).collect();

            statistics.push(MethodStatistics {
                method,
                num_runs: runs.len(),
                num_feasible: feasible.len(),
                avg_cost: costs.iter().mean(),
                best_cost: Statistics::min(costs.iter()),
                worst_cost: Statistics::max(costs.iter()),
                std_cost: costs.iter().population_std_dev(),
                avg_time: times.iter().mean(),
                total_time: times.iter().sum(),
                avg_gap: if gaps.is_empty() { None } else { Some(gaps.iter().mean()) },
            });
        }

        statistics.sort_by(|a, b| a.avg_cost.total_cmp(&b.avg_cost));
        statistics
    }

    /// Write every run as CSV
    pub fn export_to_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the per-method statistics as CSV
    pub fn export_statistics_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     Multi-trip DARP Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!(
            "Runs per method: {}, time limit: {}\n\n",
            self.config.num_runs,
            self.config
                .base
                .time_limit
                .map(|t| format!("{}s", t))
                .unwrap_or_else(|| "none".to_string())
        ));

        let stats = self.compute_statistics();

        report.push_str("Method Performance Summary:\n");
        report.push_str("-".repeat(92).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<10} {:>10} {:>12} {:>12} {:>12} {:>10} {:>10} {:>10}\n",
            "Method", "Feasible", "Avg Cost", "Best Cost", "Worst Cost", "Std", "Avg Gap%", "Avg Time"
        ));
        report.push_str("-".repeat(92).as_str());
        report.push('\n');

        for stat in &stats {
            let gap_str = stat
                .avg_gap
                .map(|g| format!("{:.2}%", g))
                .unwrap_or_else(|| "-".to_string());

            report.push_str(&format!(
                "{:<10} {:>10} {:>12.2} {:>12.2} {:>12.2} {:>10.2} {:>10} {:>10.4}\n",
                stat.method,
                format!("{}/{}", stat.num_feasible, stat.num_runs),
                stat.avg_cost,
                stat.best_cost,
                stat.worst_cost,
                stat.std_cost,
                gap_str,
                stat.avg_time
            ));
        }

        report.push_str("-".repeat(92).as_str());
        report.push('\n');

        report.push_str("\nBest Solutions per Instance:\n");

        let mut instance_best: BTreeMap<&str, &RunResult> = BTreeMap::new();
        for result in self.results.iter().filter(|r| r.feasible) {
            let entry = instance_best.entry(result.instance.as_str()).or_insert(result);
            if result.cost < entry.cost {
                *entry = result;
            }
        }

        if instance_best.is_empty() {
            report.push_str("  (no feasible solution)\n");
        }
        for (instance, best) in &instance_best {
            report.push_str(&format!(
                "  {}: {:.2} ({}, seed {}, {} trips)\n",
                instance, best.cost, best.method, best.seed, best.num_trips
            ));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;

    fn instance() -> Instance {
        InstanceBuilder::new("bench")
            .request(2.0, 1.0, 0.0, 60.0, 1.0)
            .request(-2.0, 1.0, 0.0, 60.0, 1.0)
            .request(1.0, -3.0, 15.0, 80.0, 1.0)
            .vehicles(2)
            .max_trips(2)
            .max_trip_distance(20.0)
            .build()
            .unwrap()
    }

    fn quick_config(num_runs: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            num_runs,
            methods: vec![Method::Grasp, Method::Vns],
            base: Config {
                num_ants: 3,
                max_iterations: 3,
                restart_count: 3,
                time_limit: None,
                reference_cost: Some(10.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.num_runs, 5);
        assert_eq!(config.methods.len(), 3);
    }

    #[test]
    fn test_run_seeds_differ_per_run() {
        let benchmark = Benchmark::new(quick_config(2));
        let first = benchmark.run_config(Method::Acs, 0);
        let second = benchmark.run_config(Method::Acs, 1);
        assert_eq!(first.method, Method::Acs);
        assert_eq!(second.random_seed, first.random_seed + 1);
    }

    #[test]
    fn test_benchmark_statistics() {
        let instance = instance();
        let mut benchmark = Benchmark::new(quick_config(2));
        benchmark.run(&instance).unwrap();
        assert_eq!(benchmark.results().len(), benchmark.num_jobs());

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 2);
        for stat in &stats {
            assert_eq!(stat.num_runs, 2);
            assert!(stat.best_cost <= stat.avg_cost + 1e-9);
            assert!(stat.avg_cost <= stat.worst_cost + 1e-9);
            assert!(stat.std_cost >= 0.0);
            assert!(stat.avg_gap.is_some());
        }

        let report = benchmark.generate_report();
        assert!(report.contains("GRASP"));
        assert!(report.contains("VNS"));
        assert!(report.contains("bench:"));
    }

    #[test]
    fn test_csv_export() {
        let instance = instance();
        let mut benchmark = Benchmark::new(quick_config(1));
        benchmark.run(&instance).unwrap();

        let mut buffer = Vec::new();
        benchmark.export_to_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("method,instance,num_requests"));
        assert_eq!(lines.count(), 2);

        let mut buffer = Vec::new();
        benchmark.export_statistics_csv(&mut buffer).unwrap();
        assert!(String::from_utf8(buffer).unwrap().starts_with("method,num_runs"));
    }

    #[test]
    fn test_invalid_base_config_is_reported() {
        let instance = instance();
        let mut config = quick_config(1);
        config.base.restart_count = 0;
        let mut benchmark = Benchmark::new(config);
        assert_eq!(benchmark.run(&instance).unwrap_err(), ConfigError::NonPositiveRestarts);
    }
}
