//! Trace CSV parser.
//!
//! Trace files are headerless CSV, one scheduler event per row:
//! `event_kind,reported_state,timestamp_ns`. The parser is a two-state
//! machine over those rows. The process is assumed to begin RUNNING at
//! t=0; a non-runnable reported state ends the current RUNNING interval,
//! and the very next event must then be a `sched_wakeup` ending the
//! SLEEPING interval. Anything else means the trace is corrupt.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::TraceError;
use crate::trace::state::{State, StateKind};

/// The one event label that marks a sleep-to-run transition.
pub const SCHED_WAKEUP: &str = "sched_wakeup";

/// Parse a trace file into a state list, truncating at `horizon_ns`.
pub fn parse_trace_file(path: &Path, horizon_ns: u64) -> Result<Vec<State>, TraceError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            TraceError::FileNotFound(path.display().to_string())
        } else {
            TraceError::IoError(e)
        }
    })?;
    parse_trace_str(&content, &path.display().to_string(), horizon_ns)
}

/// Parse trace CSV content into a state list.
///
/// `path` is only used for diagnostics. Events with timestamps beyond
/// `horizon_ns` are discarded; a zero-length interval is promoted to 1 ns
/// so every state makes progress when replayed.
pub fn parse_trace_str(
    content: &str,
    path: &str,
    horizon_ns: u64,
) -> Result<Vec<State>, TraceError> {
    let mut states = Vec::new();
    let mut curr_kind = StateKind::Running;
    let mut curr_time: u64 = 0;

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let row = raw.trim();
        if row.is_empty() {
            continue;
        }

        let mut fields = row.splitn(3, ',');
        let (event, reported, ts_field) = match (fields.next(), fields.next(), fields.next()) {
            (Some(e), Some(s), Some(t)) => (e.trim(), s.trim(), t.trim()),
            _ => {
                return Err(TraceError::MalformedRow {
                    path: path.to_string(),
                    line,
                })
            }
        };

        let ts: u64 = ts_field.parse().map_err(|_| TraceError::BadTimestamp {
            path: path.to_string(),
            line,
            value: ts_field.to_string(),
        })?;
        if ts > horizon_ns {
            break;
        }
        let duration = ts.checked_sub(curr_time).ok_or_else(|| TraceError::BadTimestamp {
            path: path.to_string(),
            line,
            value: ts_field.to_string(),
        })?;

        match curr_kind {
            StateKind::Running => {
                if event == SCHED_WAKEUP {
                    return Err(TraceError::UnexpectedWakeup {
                        path: path.to_string(),
                        line,
                    });
                }
                // Context switches that leave the process runnable don't end
                // the interval.
                if reported.starts_with('R') {
                    continue;
                }
                states.push(State::new(StateKind::Running, duration.max(1)));
                curr_time = ts;
                curr_kind = StateKind::Sleeping;
            }
            StateKind::Sleeping => {
                if event != SCHED_WAKEUP {
                    return Err(TraceError::MissingWakeup {
                        path: path.to_string(),
                        line,
                    });
                }
                states.push(State::new(StateKind::Sleeping, duration.max(1)));
                curr_time = ts;
                curr_kind = StateKind::Running;
            }
        }
    }

    Ok(states)
}
