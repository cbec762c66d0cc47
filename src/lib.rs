//! timepack
//!
//! A discrete-event simulator for a multi-core fair-share scheduler with a
//! time-packing load balancer. Recorded benchmark traces (alternating
//! RUNNING/SLEEPING intervals) are replayed through simulated CPUs, each
//! running a CFS-style virtual-time scheduler, under two policies: static
//! partitioning, or periodic rebalancing that clusters processes by average
//! run-burst length and tunes each CPU's scheduling latency to the bursts
//! it hosts.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Workload description, summaries, tuning parameters
//! - **logging**: Stderr backend for the `log` facade
//! - **trace**: Trace CSV parsing into state lists
//! - **sched**: Process state machine, per-CPU scheduler, CPU binding
//! - **migrate**: Jenks clustering, buckets, the rebalancer
//! - **workload**: Workload JSON loading and listing
//! - **sim**: The machine driver and result reporting

pub mod error;
pub mod logging;
pub mod models;

pub mod migrate;
pub mod sched;
pub mod sim;
pub mod trace;
pub mod workload;

// Re-export the log crate for macro usage
pub use log;

// Re-export error types for easy access
pub use error::{Result, SimError, TraceError, WorkloadError};

// Re-export model types for easy access
pub use models::{
    BenchmarkSpec, BenchmarkSummary, ProcessSummary, SimulationSummary, Tuning, Workload,
    NANOS_PER_MILLI,
};

// Re-export the simulation surface
pub use migrate::{Bucket, Migrator};
pub use sched::{Cpu, CpuId, ProcId, Process, Scheduler};
pub use sim::Machine;
pub use trace::{State, StateKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
