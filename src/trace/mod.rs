//! Recorded execution traces.
//!
//! A trace is the pre-recorded behavior of one benchmark process: an ordered
//! list of alternating RUNNING and SLEEPING intervals distilled from kernel
//! scheduler events. The parser turns the raw event CSV into that list; the
//! simulator then replays it without ever looking at the file again.

pub mod parser;
pub mod state;

pub use parser::{parse_trace_file, parse_trace_str, SCHED_WAKEUP};
pub use state::{State, StateKind};
