//! Trace-driven process state machine.
//!
//! A process replays its recorded state list, consuming RUNNING time when a
//! scheduler runs it and SLEEPING time as simulated time passes around it.
//! Along the way it keeps the accounting the rest of the system feeds on:
//! virtual runtime for the scheduler's fairness ordering, the load ratio and
//! the windowed average run-burst length for the migrator.

use crate::error::SimError;
use crate::models::Tuning;
use crate::sched::CpuId;
use crate::trace::{State, StateKind};

#[derive(Debug)]
pub struct Process {
    pub name: String,
    pub bench_name: String,

    state_list: Vec<State>,
    cursor: usize,
    /// Working copy of the current trace entry; its duration is decremented
    /// as simulated time is consumed.
    pub curr_state: State,

    /// Monotonic virtual time; the scheduler's ordering key.
    pub vruntime_ns: u64,

    pub total_runtime_ns: u64,
    pub total_sleeptime_ns: u64,
    pub context_switches: u64,

    /// Time run since the last wakeup; resets when the process sleeps.
    curr_runtime_ns: u64,
    /// Estimated average length of one run-burst.
    pub average_runtime_ns: u64,
    /// (wall_clock_ns, burst_length_ns) samples backing the windowed mean.
    runtime_points: Vec<(u64, u64)>,
    /// (wall_clock_ns, average_runtime_ns) trail for reporting.
    average_points: Vec<(u64, u64)>,

    /// Where the migrator wants this process to live next.
    pub target_cpu: CpuId,
    /// Set when a rebalance moved this process between CPUs while it slept;
    /// its eventual wakeup then uses the migrant placement.
    pub migrated_while_sleeping: bool,

    pub finished: bool,

    /// Copied from the hosting scheduler; defines the averaging window.
    pub target_latency_ns: u64,

    /// Averaging window width, in target latencies.
    n_latencies: u64,
}

impl Process {
    pub fn new(name: String, bench_name: String, states: Vec<State>, tuning: &Tuning) -> Self {
        let finished = states.is_empty();
        let curr_state = states
            .first()
            .copied()
            .unwrap_or(State::new(StateKind::Running, 0));
        Process {
            name,
            bench_name,
            state_list: states,
            cursor: 0,
            curr_state,
            vruntime_ns: 0,
            total_runtime_ns: 0,
            total_sleeptime_ns: 0,
            context_switches: 0,
            curr_runtime_ns: 0,
            average_runtime_ns: 0,
            runtime_points: Vec::new(),
            average_points: Vec::new(),
            target_cpu: 0,
            migrated_while_sleeping: false,
            finished,
            target_latency_ns: 0,
            n_latencies: tuning.n_latencies,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.finished && self.curr_state.kind == StateKind::Running
    }

    pub fn is_sleeping(&self) -> bool {
        !self.finished && self.curr_state.kind == StateKind::Sleeping
    }

    /// How long until this process next wants the CPU.
    pub fn time_to_next_run(&self) -> u64 {
        if self.finished {
            u64::MAX
        } else if self.curr_state.kind == StateKind::Running {
            0
        } else {
            self.curr_state.duration_ns
        }
    }

    /// Windowed mean of the run-bursts finalized within the last
    /// `n_latencies` target latencies, with the in-progress burst included
    /// so processes that rarely sleep still converge.
    fn calc_average_runtime(&self) -> u64 {
        let wall_clock = self.total_runtime_ns + self.total_sleeptime_ns;
        let window = self.n_latencies * self.target_latency_ns;

        let mut sum: u64 = 0;
        let mut count: u64 = 0;
        for &(at, burst) in &self.runtime_points {
            if wall_clock - at < window {
                sum += burst;
                count += 1;
            }
        }
        sum += self.curr_runtime_ns;
        count += 1;
        sum / count
    }

    /// Let the process run for up to `t_ns`.
    ///
    /// Returns how long it actually ran; less than `t_ns` means the current
    /// burst ended early and the process moved on to its next state.
    pub fn run(&mut self, t_ns: u64) -> Result<u64, SimError> {
        if !self.is_running() {
            return Err(SimError::RunWhileNotRunnable(self.name.clone()));
        }

        let ran = t_ns.min(self.curr_state.duration_ns);
        debug_assert!(ran > 0, "zero-length run on {}", self.name);

        self.curr_state.duration_ns -= ran;
        self.curr_runtime_ns += ran;
        self.vruntime_ns += ran;
        self.total_runtime_ns += ran;

        // A burst that has already outgrown its estimate drags the estimate
        // up without waiting for the burst to end.
        if self.curr_runtime_ns > self.average_runtime_ns {
            self.average_runtime_ns = self.calc_average_runtime();
        }

        if self.curr_state.duration_ns == 0 {
            self.go_to_next_state();
        }

        Ok(ran)
    }

    /// Let simulated time pass while the process sleeps. No-op unless the
    /// process is currently in a SLEEPING state.
    pub fn sleep(&mut self, t_ns: u64) {
        if !self.is_sleeping() {
            return;
        }

        let slept = t_ns.min(self.curr_state.duration_ns);
        self.curr_state.duration_ns -= slept;
        self.total_sleeptime_ns += slept;

        if self.curr_state.duration_ns == 0 {
            self.go_to_next_state();
        }
    }

    /// Advance to the next trace entry; past the last one the process is
    /// finished. Entering a SLEEPING state finalizes the burst that just
    /// ended.
    pub fn go_to_next_state(&mut self) {
        self.cursor += 1;
        match self.state_list.get(self.cursor) {
            Some(&next) => {
                if next.kind == StateKind::Sleeping {
                    self.average_runtime_ns = self.calc_average_runtime();
                    let wall_clock = self.total_runtime_ns + self.total_sleeptime_ns;
                    self.runtime_points.push((wall_clock, self.curr_runtime_ns));
                    self.average_points.push((wall_clock, self.average_runtime_ns));
                    self.curr_runtime_ns = 0;
                }
                self.curr_state = next;
            }
            None => self.finished = true,
        }
    }

    /// Runtime fraction: time spent running over time spent running or
    /// sleeping (waiting in a runqueue counts as neither).
    pub fn get_load(&self) -> f64 {
        let total = self.total_runtime_ns + self.total_sleeptime_ns;
        if total == 0 {
            return 0.0;
        }
        self.total_runtime_ns as f64 / total as f64
    }

    /// The (wall_clock, average_runtime) trail recorded at each burst end.
    pub fn runtime_trail(&self) -> &[(u64, u64)] {
        &self.average_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning::default()
    }

    fn proc_with(states: Vec<State>) -> Process {
        let mut p = Process::new("bench-0".to_string(), "bench".to_string(), states, &tuning());
        p.target_latency_ns = 10_000_000;
        p
    }

    #[test]
    fn test_partial_run_of_forever_running_process() {
        let mut p = proc_with(vec![State::new(StateKind::Running, 1_000_000)]);
        let ran = p.run(500_000).unwrap();
        assert_eq!(ran, 500_000);
        assert_eq!(p.total_runtime_ns, 500_000);
        assert_eq!(p.vruntime_ns, 500_000);
        assert_eq!(p.curr_state.duration_ns, 500_000);
        assert_eq!(p.context_switches, 0);
        assert!(p.is_running());
    }

    #[test]
    fn test_run_past_burst_end_is_clipped() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 300),
            State::new(StateKind::Sleeping, 100),
        ]);
        let ran = p.run(1_000).unwrap();
        assert_eq!(ran, 300);
        assert!(p.is_sleeping());
        assert_eq!(p.curr_state.duration_ns, 100);
    }

    #[test]
    fn test_burst_finalized_on_sleep_transition() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 400),
            State::new(StateKind::Sleeping, 100),
        ]);
        p.run(400).unwrap();
        assert_eq!(p.average_runtime_ns, 400);
        assert_eq!(p.runtime_trail().len(), 1);
        assert_eq!(p.runtime_trail()[0], (400, 400));
    }

    #[test]
    fn test_sleep_is_noop_while_running() {
        let mut p = proc_with(vec![State::new(StateKind::Running, 500)]);
        p.sleep(100);
        assert_eq!(p.total_sleeptime_ns, 0);
        assert_eq!(p.curr_state.duration_ns, 500);
    }

    #[test]
    fn test_sleep_expiry_wakes_process() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 100),
            State::new(StateKind::Sleeping, 200),
            State::new(StateKind::Running, 100),
        ]);
        p.run(100).unwrap();
        assert!(p.is_sleeping());
        p.sleep(150);
        assert!(p.is_sleeping());
        assert_eq!(p.curr_state.duration_ns, 50);
        p.sleep(75);
        assert!(p.is_running());
        assert_eq!(p.total_sleeptime_ns, 200);
    }

    #[test]
    fn test_exhausting_trace_marks_finished() {
        let mut p = proc_with(vec![State::new(StateKind::Running, 100)]);
        p.run(100).unwrap();
        assert!(p.finished);
        assert!(!p.is_running());
        assert!(!p.is_sleeping());
        assert_eq!(p.time_to_next_run(), u64::MAX);
    }

    #[test]
    fn test_run_while_sleeping_is_fatal() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 100),
            State::new(StateKind::Sleeping, 100),
        ]);
        p.run(100).unwrap();
        let err = p.run(50).unwrap_err();
        assert!(matches!(err, SimError::RunWhileNotRunnable(_)));
    }

    #[test]
    fn test_empty_state_list_is_finished_immediately() {
        let p = proc_with(vec![]);
        assert!(p.finished);
    }

    #[test]
    fn test_load_ratio() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 300),
            State::new(StateKind::Sleeping, 100),
            State::new(StateKind::Running, 100),
        ]);
        p.run(300).unwrap();
        p.sleep(100);
        assert!((p.get_load() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_load_of_fresh_process_is_zero() {
        let p = proc_with(vec![State::new(StateKind::Running, 100)]);
        assert_eq!(p.get_load(), 0.0);
    }

    #[test]
    fn test_average_tracks_oversized_burst() {
        // One finalized 100ns burst, then a burst that keeps growing past
        // the estimate; the estimate must grow with it.
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 100),
            State::new(StateKind::Sleeping, 100),
            State::new(StateKind::Running, 1_000),
        ]);
        p.run(100).unwrap();
        p.sleep(100);
        assert_eq!(p.average_runtime_ns, 100);
        p.run(900).unwrap();
        // (100 + 900) / 2
        assert_eq!(p.average_runtime_ns, 500);
    }

    #[test]
    fn test_windowed_mean_forgets_old_bursts() {
        // Window is n_latencies * target_latency = 10 * 1000 = 10_000ns.
        let mut p = Process::new(
            "w".to_string(),
            "w".to_string(),
            vec![
                State::new(StateKind::Running, 100),
                State::new(StateKind::Sleeping, 20_000),
                State::new(StateKind::Running, 500),
                State::new(StateKind::Sleeping, 10),
            ],
            &tuning(),
        );
        p.target_latency_ns = 1_000;

        p.run(100).unwrap();
        p.sleep(20_000);
        // The 100ns burst fell out of the window; only the second burst is
        // left to average over.
        p.run(500).unwrap();
        assert_eq!(p.average_runtime_ns, 500);
    }

    #[test]
    fn test_vruntime_monotonic_over_trace() {
        let mut p = proc_with(vec![
            State::new(StateKind::Running, 100),
            State::new(StateKind::Sleeping, 50),
            State::new(StateKind::Running, 200),
        ]);
        let mut last = p.vruntime_ns;
        while !p.finished {
            if p.is_running() {
                p.run(30).unwrap();
            } else {
                p.sleep(30);
            }
            assert!(p.vruntime_ns >= last);
            last = p.vruntime_ns;
        }
        assert_eq!(p.total_runtime_ns + p.total_sleeptime_ns, 350);
    }
}
