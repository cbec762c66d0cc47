//! Result reporting: per-process summaries, per-benchmark aggregates, and
//! a machine-readable JSON dump.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::migrate::Migrator;
use crate::models::{BenchmarkSummary, ProcessSummary, SimulationSummary};
use crate::sched::Process;

/// Collect everything a finished run has to say.
pub fn build_summary(
    workload_name: &str,
    time_packing: bool,
    procs: &[Process],
    migrator: &Migrator,
) -> SimulationSummary {
    let processes: Vec<ProcessSummary> = procs
        .iter()
        .map(|p| ProcessSummary {
            name: p.name.clone(),
            bench_name: p.bench_name.clone(),
            context_switches: p.context_switches,
            average_runtime_ns: p.average_runtime_ns,
            load: p.get_load(),
            finished: p.finished,
            runtime_trail: p.runtime_trail().to_vec(),
        })
        .collect();

    // Average the context switches over each benchmark's clones.
    let mut by_bench: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for p in procs {
        let entry = by_bench.entry(p.bench_name.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += p.context_switches;
    }
    let benchmarks = by_bench
        .into_iter()
        .map(|(bench_name, (count, switches))| BenchmarkSummary {
            bench_name: bench_name.to_string(),
            proc_count: count,
            avg_context_switches: switches as f64 / count as f64,
        })
        .collect();

    SimulationSummary {
        workload: workload_name.to_string(),
        time_packing,
        processes,
        benchmarks,
        mean_rebalance_latency_ns: if time_packing {
            migrator.mean_latency_ns()
        } else {
            None
        },
    }
}

/// Print the human-readable summary.
pub fn print_summary(summary: &SimulationSummary) {
    for p in &summary.processes {
        println!("{}", p.name);
        println!("***********************");
        println!("\tcontext switches: {}", p.context_switches);
        println!("\taverage runtime: {}", p.average_runtime_ns);
        println!("\tload: {:.4}", p.load);
        println!("\tfinished: {}", p.finished);
        println!();
    }

    for b in &summary.benchmarks {
        println!("{}: {:.1}", b.bench_name, b.avg_context_switches);
    }

    if let Some(latency) = summary.mean_rebalance_latency_ns {
        println!("Avg latency: {}", latency);
    }
}

/// Persist the summary as JSON under `dir`, creating it if needed.
pub fn write_summary_json(summary: &SimulationSummary, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", summary.workload));
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json)?;
    Ok(path)
}
