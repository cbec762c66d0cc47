//! Workload file loader and listing.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::WorkloadError;
use crate::models::Workload;

/// Where workload descriptions are looked up by name.
pub const WORKLOAD_DIR: &str = "./workloads";

/// Where benchmark traces are resolved from.
pub const TRACE_DIR: &str = "./traces";

/// Path of the workload file for `name`.
pub fn workload_path(name: &str) -> PathBuf {
    Path::new(WORKLOAD_DIR).join(format!("{}.json", name))
}

/// Path of the recorded trace for `benchmark`, under `dir`.
pub fn trace_path(dir: &Path, benchmark: &str) -> PathBuf {
    dir.join(format!("{}.trace.csv", benchmark))
}

/// Load a workload by name from the default workload directory.
pub fn load_workload(name: &str) -> Result<Workload, WorkloadError> {
    load_workload_in(Path::new(WORKLOAD_DIR), name)
}

/// Load a workload by name from `dir`. A name with no matching `.json`
/// file in the directory is an unknown workload, distinct from a missing
/// or unreadable file.
pub fn load_workload_in(dir: &Path, name: &str) -> Result<Workload, WorkloadError> {
    if !list_workloads_in(dir).iter().any(|w| w == name) {
        return Err(WorkloadError::UnknownWorkload(name.to_string()));
    }
    load_workload_file(&dir.join(format!("{}.json", name)))
}

/// Load and validate a workload from a JSON file.
pub fn load_workload_file(path: &Path) -> Result<Workload, WorkloadError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkloadError::FileNotFound(path.display().to_string())
        } else {
            WorkloadError::IoError(e)
        }
    })?;

    let workload: Workload = serde_json::from_str(&content)?;
    validate_workload(&workload)?;
    Ok(workload)
}

/// The names of every workload available in the default directory.
pub fn list_workloads() -> Vec<String> {
    list_workloads_in(Path::new(WORKLOAD_DIR))
}

/// The names of every `.json` workload under `dir`, sorted. A missing
/// directory just means no workloads.
pub fn list_workloads_in(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
        .filter_map(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();
    names.sort();
    names
}

fn validate_workload(workload: &Workload) -> Result<(), WorkloadError> {
    if workload.cpus == 0 {
        return Err(WorkloadError::ValidationFailed(
            "cpus must be positive".to_string(),
        ));
    }
    if workload.processes.is_empty() {
        return Err(WorkloadError::ValidationFailed(
            "workload names no processes".to_string(),
        ));
    }
    for spec in &workload.processes {
        if spec.benchmark.is_empty() {
            return Err(WorkloadError::ValidationFailed(
                "benchmark name must not be empty".to_string(),
            ));
        }
        if spec.quantity == 0 {
            return Err(WorkloadError::ValidationFailed(format!(
                "benchmark '{}' has zero quantity",
                spec.benchmark
            )));
        }
    }
    for (field, value) in [
        ("initial_latency_millis", workload.initial_latency_millis),
        ("max_latency_millis", workload.max_latency_millis),
        ("rebalance_period_millis", workload.rebalance_period_millis),
        ("sim_time_millis", workload.sim_time_millis),
    ] {
        if value == 0 {
            return Err(WorkloadError::ValidationFailed(format!(
                "{} must be positive",
                field
            )));
        }
    }
    Ok(())
}
