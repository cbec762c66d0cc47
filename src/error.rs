//! Unified error type hierarchy for the timepack simulator
//!
//! Provides structured error handling with TraceError, WorkloadError and
//! SimError.

use std::io;
use thiserror::Error;

/// Trace file parsing errors.
///
/// The trace parser is a strict two-state machine; event sequences that do
/// not alternate RUNNING/SLEEPING correctly are reported with the offending
/// line number so the broken trace can be inspected directly.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("[line {line}] not expecting a wakeup while process is runnable: {path}")]
    UnexpectedWakeup { path: String, line: usize },

    #[error("[line {line}] expected wakeup as next event in trace: {path}")]
    MissingWakeup { path: String, line: usize },

    #[error("[line {line}] malformed trace row (want event,state,timestamp): {path}")]
    MalformedRow { path: String, line: usize },

    #[error("[line {line}] bad timestamp {value:?}: {path}")]
    BadTimestamp {
        path: String,
        line: usize,
        value: String,
    },

    #[error("trace file not found: {0}")]
    FileNotFound(String),

    #[error("IO error while reading trace: {0}")]
    IoError(#[from] io::Error),
}

/// Workload file loading and validation errors.
#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("workload file not found: {0}")]
    FileNotFound(String),

    #[error("invalid JSON in workload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("workload validation failed: {0}")]
    ValidationFailed(String),

    #[error("unknown workload: {0}")]
    UnknownWorkload(String),

    #[error("IO error during workload operations: {0}")]
    IoError(#[from] io::Error),
}

/// Simulation invariant violations.
///
/// These are programming errors, not user errors: the simulation state has
/// diverged from the model and there is nothing to recover. The diagnostic
/// names the offending component.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("process '{0}' asked to run while not in a RUNNING state")]
    RunWhileNotRunnable(String),

    #[error("scheduler on cpu {0} has no current process to compute a timeslice for")]
    NoCurrentProcess(usize),

    #[error("cpu apportionment left {remaining} cpus unassigned across {buckets} buckets")]
    CpuApportionment { remaining: usize, buckets: usize },

    #[error("fast-forward on cpu {0} found no sleeping process to wait on")]
    NothingToWaitOn(usize),
}

/// Top-level result type for operations that may fail.
/// Use this as the return type for all fallible functions.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
