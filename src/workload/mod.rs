//! Workload descriptions and the directories they live in.

pub mod loader;

pub use loader::{
    list_workloads, list_workloads_in, load_workload, load_workload_file, load_workload_in,
    trace_path, workload_path, TRACE_DIR, WORKLOAD_DIR,
};
