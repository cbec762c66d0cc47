//! Core data types for the timepack simulator.

use serde::{Deserialize, Serialize};

/// Nanoseconds per millisecond; workload files speak milliseconds, the
/// simulator speaks nanoseconds everywhere else.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Tuning knobs shared by the process accounting and the migrator.
///
/// Passed into the machine at construction; there is no process-wide
/// mutable configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tuning {
    /// Width of the burst-averaging window, in target latencies.
    pub n_latencies: u64,
    /// Slack applied when matching a process to a bucket boundary.
    pub rounding_error_ns: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            n_latencies: 10,
            rounding_error_ns: 100,
        }
    }
}

/// One benchmark entry in a workload: which recorded trace to replay and
/// how many clones of it to create.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub benchmark: String,
    pub quantity: usize,
}

/// A workload description as read from `./workloads/<name>.json`.
///
/// All durations are milliseconds in the file; use the `*_ns` accessors
/// for simulation units.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workload {
    pub cpus: usize,
    pub processes: Vec<BenchmarkSpec>,
    pub initial_latency_millis: u64,
    pub max_latency_millis: u64,
    pub rebalance_period_millis: u64,
    pub sim_time_millis: u64,
    pub time_packer_active: bool,
}

impl Workload {
    pub fn initial_latency_ns(&self) -> u64 {
        self.initial_latency_millis * NANOS_PER_MILLI
    }

    pub fn max_latency_ns(&self) -> u64 {
        self.max_latency_millis * NANOS_PER_MILLI
    }

    pub fn rebalance_period_ns(&self) -> u64 {
        self.rebalance_period_millis * NANOS_PER_MILLI
    }

    pub fn sim_time_ns(&self) -> u64 {
        self.sim_time_millis * NANOS_PER_MILLI
    }
}

/// Per-process results after a simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessSummary {
    pub name: String,
    pub bench_name: String,
    pub context_switches: u64,
    pub average_runtime_ns: u64,
    pub load: f64,
    pub finished: bool,
    /// (wall_clock_ns, average_runtime_ns) samples taken each time a burst
    /// was finalized; the estimated-runtime trail over the process lifetime.
    pub runtime_trail: Vec<(u64, u64)>,
}

/// Context-switch counts averaged over all clones of one benchmark.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BenchmarkSummary {
    pub bench_name: String,
    pub proc_count: usize,
    pub avg_context_switches: f64,
}

/// Everything a run produces, serializable to `./results/<workload>.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimulationSummary {
    pub workload: String,
    pub time_packing: bool,
    pub processes: Vec<ProcessSummary>,
    pub benchmarks: Vec<BenchmarkSummary>,
    /// Mean over the per-rebalance mean target latencies; absent when the
    /// time packer was inactive.
    pub mean_rebalance_latency_ns: Option<u64>,
}
