//! Per-CPU fair scheduler simulator.
//!
//! Models one CPU's view of the Completely Fair Scheduler: a runqueue
//! ordered by virtual runtime, a sleeping set aged as simulated time
//! passes, and a current process running timeslices of
//! `target_latency / (waiting + 1)`. All processes share equal weight.
//!
//! The scheduler holds arena handles, never process references; the
//! process table is threaded through every call by the machine that owns
//! it.

use std::collections::BTreeSet;

use crate::error::SimError;
use crate::sched::{CpuId, ProcId, Process};

#[derive(Debug)]
pub struct Scheduler {
    cpu: CpuId,

    /// The scheduling period within which every waiting process should get
    /// a slice.
    target_latency_ns: u64,

    /// Runqueue keyed on (vruntime, pid); a process's vruntime never moves
    /// while it waits, so the key stays valid until it is popped.
    waiting: BTreeSet<(u64, ProcId)>,

    sleeping: Vec<ProcId>,

    curr: Option<ProcId>,

    /// Floor of the runqueue's virtual clock; follows the vruntime of
    /// whichever process was last switched in.
    min_vruntime_ns: u64,

    /// Unspent budget from the previous `run` call.
    residual_time_ns: u64,

    /// Processes that woke during this scheduler's run but belong to a
    /// different CPU now; drained by the machine after each run.
    outbox: Vec<ProcId>,
}

impl Scheduler {
    pub fn new(cpu: CpuId, target_latency_ns: u64) -> Self {
        Scheduler {
            cpu,
            target_latency_ns,
            waiting: BTreeSet::new(),
            sleeping: Vec::new(),
            curr: None,
            min_vruntime_ns: 0,
            residual_time_ns: 0,
            outbox: Vec::new(),
        }
    }

    /// Give this scheduler a process at simulation start.
    pub fn admit(&mut self, pid: ProcId, procs: &mut [Process]) {
        let p = &mut procs[pid];
        p.target_cpu = self.cpu;
        p.target_latency_ns = self.target_latency_ns;
        self.waiting.insert((p.vruntime_ns, pid));
    }

    pub fn has_unfinished(&self) -> bool {
        self.curr.is_some() || !self.waiting.is_empty() || !self.sleeping.is_empty()
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    pub fn target_latency_ns(&self) -> u64 {
        self.target_latency_ns
    }

    pub fn min_vruntime_ns(&self) -> u64 {
        self.min_vruntime_ns
    }

    pub fn residual_time_ns(&self) -> u64 {
        self.residual_time_ns
    }

    pub fn current(&self) -> Option<ProcId> {
        self.curr
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn sleeping_count(&self) -> usize {
        self.sleeping.len()
    }

    /// Every unfinished process this scheduler currently owns.
    pub fn owned_procs(&self) -> Vec<ProcId> {
        let mut pids: Vec<ProcId> = self.waiting.iter().map(|&(_, pid)| pid).collect();
        pids.extend(&self.sleeping);
        pids.extend(self.curr);
        pids
    }

    /// Retune the scheduling period and propagate it to the owned
    /// processes, whose averaging window depends on it.
    pub fn set_target_latency(&mut self, latency_ns: u64, procs: &mut [Process]) {
        self.target_latency_ns = latency_ns;
        for pid in self.owned_procs() {
            procs[pid].target_latency_ns = latency_ns;
        }
    }

    /// CFS slice: every waiting process plus the current one gets an equal
    /// share of the target latency.
    fn timeslice(&self) -> Result<u64, SimError> {
        if self.curr.is_none() {
            return Err(SimError::NoCurrentProcess(self.cpu));
        }
        Ok(self.target_latency_ns / (self.waiting.len() as u64 + 1))
    }

    fn pop_min_waiting(&mut self) -> Option<ProcId> {
        self.waiting.pop_first().map(|(_, pid)| pid)
    }

    /// Wake-up placement, the place_entity analog.
    ///
    /// A locally-woken process is granted the runqueue floor minus one
    /// latency, so sleeps shorter than a latency cycle don't count and the
    /// process can't game the scheduler. A migrant is deferred a full
    /// latency cycle instead, so it can't monopolize its new CPU. If
    /// nothing here is runnable at all, the virtual clock has drifted away
    /// from every worker and both it and the waker are pulled back to
    /// zero; with nobody to monopolize, that covers migrants too.
    pub fn enqueue_waking(&mut self, pid: ProcId, migrated: bool, procs: &mut [Process]) {
        let all_asleep = self.curr.is_none() && self.waiting.is_empty();
        if all_asleep {
            self.min_vruntime_ns = 0;
        }

        let p = &mut procs[pid];
        debug_assert!(p.is_running(), "enqueued a non-runnable process");

        p.vruntime_ns = if all_asleep {
            0
        } else if migrated {
            self.min_vruntime_ns + self.target_latency_ns
        } else {
            p.vruntime_ns
                .max(self.min_vruntime_ns.saturating_sub(self.target_latency_ns))
        };

        p.target_latency_ns = self.target_latency_ns;
        p.migrated_while_sleeping = false;
        self.waiting.insert((p.vruntime_ns, pid));
    }

    /// Take in a process that was migrated here while asleep. It keeps
    /// sleeping; the migrant wake-up placement applies when it wakes.
    pub fn adopt_sleeper(&mut self, pid: ProcId, procs: &mut [Process]) {
        let p = &mut procs[pid];
        p.migrated_while_sleeping = true;
        p.target_latency_ns = self.target_latency_ns;
        self.sleeping.push(pid);
    }

    /// Age the sleeping set by `dt`. Processes that wake either re-enter
    /// this runqueue or, if the migrator has retargeted them, are handed to
    /// the outbox for the machine to deliver. Finished sleepers fall away.
    fn update_sleeping_procs(&mut self, dt: u64, procs: &mut [Process]) {
        if self.sleeping.is_empty() {
            return;
        }

        let mut still_sleeping = Vec::with_capacity(self.sleeping.len());
        let mut woken = Vec::new();
        for &pid in &self.sleeping {
            procs[pid].sleep(dt);
            if procs[pid].is_sleeping() {
                still_sleeping.push(pid);
            } else if procs[pid].is_running() {
                woken.push(pid);
            }
        }
        self.sleeping = still_sleeping;

        for pid in woken {
            if procs[pid].target_cpu == self.cpu {
                let migrated = procs[pid].migrated_while_sleeping;
                self.enqueue_waking(pid, migrated, procs);
            } else {
                self.outbox.push(pid);
            }
        }
    }

    /// Drain the processes that woke here but belong elsewhere.
    pub fn take_outbox(&mut self) -> Vec<ProcId> {
        std::mem::take(&mut self.outbox)
    }

    /// Remove every owned process whose `target_cpu` points elsewhere and
    /// return the handles for the machine to deliver.
    pub fn drain_migrants(&mut self, procs: &[Process]) -> Vec<ProcId> {
        let mut leaving = Vec::new();

        let staying: BTreeSet<(u64, ProcId)> = self
            .waiting
            .iter()
            .copied()
            .filter(|&(_, pid)| {
                if procs[pid].target_cpu == self.cpu {
                    true
                } else {
                    leaving.push(pid);
                    false
                }
            })
            .collect();
        self.waiting = staying;

        let mut still_sleeping = Vec::with_capacity(self.sleeping.len());
        for &pid in &self.sleeping {
            if procs[pid].target_cpu == self.cpu {
                still_sleeping.push(pid);
            } else {
                leaving.push(pid);
            }
        }
        self.sleeping = still_sleeping;

        if let Some(pid) = self.curr {
            if procs[pid].target_cpu != self.cpu {
                leaving.push(pid);
                self.curr = None;
            }
        }

        leaving
    }

    /// Consume up to `budget_ns` of simulated time.
    ///
    /// Returns when the budget is spent (any leftover too small to hold a
    /// slice is carried into the next call), when every owned process has
    /// finished, or when the budget dies out mid-sleep with nobody
    /// runnable.
    pub fn run(&mut self, budget_ns: u64, procs: &mut [Process]) -> Result<(), SimError> {
        let target_sim_time = budget_ns + self.residual_time_ns;
        self.residual_time_ns = 0;
        let mut sim_time: u64 = 0;

        while self.has_unfinished() {
            let time_left = target_sim_time - sim_time;
            if time_left == 0 {
                break;
            }

            let curr = match self.curr {
                Some(pid) => pid,
                None => {
                    if self.waiting.is_empty() {
                        // Nothing is runnable: fast-forward to the nearest
                        // wakeup, bounded by the remaining budget.
                        let (next_wake, time_to_wake) = self
                            .sleeping
                            .iter()
                            .map(|&pid| (pid, procs[pid].time_to_next_run()))
                            .min_by_key(|&(_, ttw)| ttw)
                            .ok_or(SimError::NothingToWaitOn(self.cpu))?;

                        let sleep_delta = time_to_wake.min(time_left);
                        self.update_sleeping_procs(sleep_delta, procs);
                        sim_time += sleep_delta;

                        // The nearest sleeper may have finished outright or
                        // woken into another CPU's runqueue; start over with
                        // whatever budget is left.
                        if procs[next_wake].finished || procs[next_wake].target_cpu != self.cpu {
                            continue;
                        }

                        if self.waiting.is_empty() {
                            // Budget exhausted mid-sleep.
                            debug_assert!(sleep_delta < time_to_wake);
                            return Ok(());
                        }
                    }

                    self.curr = self.pop_min_waiting();
                    continue;
                }
            };

            let ideal_slice = self.timeslice()?;
            if ideal_slice > time_left {
                self.residual_time_ns = time_left;
                break;
            }

            let runtime = procs[curr].run(ideal_slice)?;
            sim_time += runtime;
            self.update_sleeping_procs(runtime, procs);

            if procs[curr].finished {
                self.curr = self.pop_min_waiting();
                if let Some(next) = self.curr {
                    self.min_vruntime_ns = procs[next].vruntime_ns;
                }
            } else if procs[curr].is_running() {
                // The slice ended with the process still runnable; switch to
                // the lowest-vruntime waiter if there is one.
                if let Some(next) = self.pop_min_waiting() {
                    procs[curr].context_switches += 1;
                    self.waiting.insert((procs[curr].vruntime_ns, curr));
                    self.curr = Some(next);
                    self.min_vruntime_ns = procs[next].vruntime_ns;
                }
            } else {
                self.sleeping.push(curr);
                self.curr = self.pop_min_waiting();
                if let Some(next) = self.curr {
                    self.min_vruntime_ns = procs[next].vruntime_ns;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tuning;
    use crate::trace::{State, StateKind};

    const LATENCY: u64 = 10_000_000;

    fn proc_with(name: &str, states: Vec<State>) -> Process {
        Process::new(
            name.to_string(),
            name.to_string(),
            states,
            &Tuning::default(),
        )
    }

    fn running(duration: u64) -> State {
        State::new(StateKind::Running, duration)
    }

    fn sleeping(duration: u64) -> State {
        State::new(StateKind::Sleeping, duration)
    }

    #[test]
    fn test_single_process_consumes_budget() {
        let mut procs = vec![proc_with("a", vec![running(1_000_000)])];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);

        sched.run(500_000, &mut procs).unwrap();

        assert_eq!(procs[0].total_runtime_ns, 500_000);
        assert_eq!(procs[0].vruntime_ns, 500_000);
        assert_eq!(procs[0].curr_state.duration_ns, 500_000);
        assert_eq!(procs[0].context_switches, 0);
    }

    #[test]
    fn test_residual_budget_carries_over() {
        // Budget smaller than one slice: nothing runs, the budget is
        // banked for the next call.
        let mut procs = vec![proc_with("a", vec![running(100_000_000)])];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);

        sched.run(LATENCY / 4, &mut procs).unwrap();
        assert_eq!(procs[0].total_runtime_ns, 0);
        assert_eq!(sched.residual_time_ns(), LATENCY / 4);

        sched.run(LATENCY, &mut procs).unwrap();
        assert_eq!(sched.residual_time_ns(), LATENCY / 4);
        assert_eq!(procs[0].total_runtime_ns, LATENCY);
    }

    #[test]
    fn test_two_processes_alternate() {
        let mut procs = vec![
            proc_with("a", vec![running(100_000_000)]),
            proc_with("b", vec![running(100_000_000)]),
        ];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);
        sched.admit(1, &mut procs);

        sched.run(40_000_000, &mut procs).unwrap();

        // Equal weights: both make identical progress, switching each
        // slice.
        assert_eq!(procs[0].total_runtime_ns, procs[1].total_runtime_ns);
        assert!(procs[0].context_switches >= 1);
        assert!(procs[1].context_switches >= 1);
    }

    #[test]
    fn test_fast_forward_through_global_sleep() {
        let mut procs = vec![proc_with(
            "a",
            vec![running(1_000), sleeping(5_000_000), running(1_000)],
        )];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);

        // Plenty of budget: the run burns 1µs, sleeps 5ms, runs again.
        sched.run(20_000_000, &mut procs).unwrap();
        assert!(procs[0].finished);
        assert_eq!(procs[0].total_runtime_ns, 2_000);
        assert_eq!(procs[0].total_sleeptime_ns, 5_000_000);
    }

    #[test]
    fn test_budget_exhausted_mid_sleep() {
        let mut procs = vec![proc_with(
            "a",
            vec![running(1_000), sleeping(50_000_000), running(1_000)],
        )];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);

        sched.run(10_000_000, &mut procs).unwrap();
        assert!(procs[0].is_sleeping());
        assert!(procs[0].total_sleeptime_ns < 50_000_000);
        assert!(!procs[0].finished);
    }

    #[test]
    fn test_wakeup_floor_grants_min_vruntime_minus_latency() {
        let mut procs = vec![
            proc_with("sleeper", vec![running(1), sleeping(1), running(1_000)]),
            proc_with("busy", vec![running(100_000_000)]),
        ];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.min_vruntime_ns = 10_000_000;
        procs[0].run(1).unwrap();
        procs[0].sleep(1);
        assert!(procs[0].is_running());

        // Floor is min_vruntime - latency = 0; a 2ms vruntime clears it and
        // is kept.
        procs[0].vruntime_ns = 2_000_000;
        sched.waiting.insert((procs[1].vruntime_ns, 1));
        sched.enqueue_waking(0, false, &mut procs);
        assert_eq!(procs[0].vruntime_ns, 2_000_000);

        // With a higher floor the stale vruntime is pulled up to
        // min_vruntime - latency.
        sched.waiting.clear();
        sched.waiting.insert((procs[1].vruntime_ns, 1));
        sched.min_vruntime_ns = 30_000_000;
        procs[0].vruntime_ns = 2_000_000;
        sched.enqueue_waking(0, false, &mut procs);
        assert_eq!(procs[0].vruntime_ns, 20_000_000);
    }

    #[test]
    fn test_migrant_deferred_one_latency_cycle() {
        let mut procs = vec![
            proc_with("migrant", vec![running(1_000)]),
            proc_with("busy", vec![running(100_000_000)]),
        ];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.min_vruntime_ns = 10_000_000;
        sched.waiting.insert((procs[1].vruntime_ns, 1));

        procs[0].vruntime_ns = 55_000_000;
        sched.enqueue_waking(0, true, &mut procs);
        // Placed at min_vruntime + latency regardless of prior vruntime.
        assert_eq!(procs[0].vruntime_ns, 20_000_000);
    }

    #[test]
    fn test_all_asleep_wake_resets_clock() {
        let mut procs = vec![proc_with("a", vec![running(1_000)])];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.min_vruntime_ns = 40_000_000;
        procs[0].vruntime_ns = 3_000_000;

        sched.enqueue_waking(0, false, &mut procs);
        assert_eq!(sched.min_vruntime_ns, 0);
        assert_eq!(procs[0].vruntime_ns, 0);
    }

    #[test]
    fn test_all_asleep_wake_resets_migrant_too() {
        // A migrant arriving at a fully idle scheduler has nobody to
        // monopolize: the reset wins over the migrant deferral.
        let mut procs = vec![proc_with("m", vec![running(1_000)])];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.min_vruntime_ns = 40_000_000;
        procs[0].vruntime_ns = 55_000_000;

        sched.enqueue_waking(0, true, &mut procs);
        assert_eq!(sched.min_vruntime_ns, 0);
        assert_eq!(procs[0].vruntime_ns, 0);
    }

    #[test]
    fn test_woken_migrant_lands_in_outbox() {
        let mut procs = vec![proc_with("m", vec![running(1), sleeping(100), running(1_000)])];
        let mut sched = Scheduler::new(0, LATENCY);
        procs[0].run(1).unwrap();
        assert!(procs[0].is_sleeping());
        sched.sleeping.push(0);

        // Rebalance points the process at cpu 3 while it sleeps.
        procs[0].target_cpu = 3;
        sched.update_sleeping_procs(100, &mut procs);

        assert_eq!(sched.sleeping_count(), 0);
        assert_eq!(sched.waiting_count(), 0);
        assert_eq!(sched.take_outbox(), vec![0]);
    }

    #[test]
    fn test_drain_migrants_empties_all_sets() {
        let mut procs = vec![
            proc_with("w", vec![running(1_000)]),
            proc_with("s", vec![running(1), sleeping(1_000), running(10)]),
            proc_with("c", vec![running(1_000)]),
        ];
        let mut sched = Scheduler::new(0, LATENCY);
        sched.admit(0, &mut procs);
        procs[1].run(1).unwrap();
        sched.sleeping.push(1);
        sched.curr = Some(2);
        procs[2].target_cpu = 0;

        procs[0].target_cpu = 1;
        procs[1].target_cpu = 1;
        procs[2].target_cpu = 2;

        let mut leaving = sched.drain_migrants(&procs);
        leaving.sort_unstable();
        assert_eq!(leaving, vec![0, 1, 2]);
        assert!(!sched.has_unfinished());
    }

    #[test]
    fn test_tri_partition_is_exclusive() {
        let mut procs = vec![
            proc_with("a", vec![running(50_000_000), sleeping(1_000_000), running(1_000)]),
            proc_with("b", vec![running(50_000_000)]),
            proc_with("c", vec![running(2_000_000), sleeping(30_000_000), running(1_000)]),
        ];
        let mut sched = Scheduler::new(0, LATENCY);
        for pid in 0..procs.len() {
            sched.admit(pid, &mut procs);
        }

        for _ in 0..20 {
            sched.run(5_000_000, &mut procs).unwrap();
            let mut seen = std::collections::HashSet::new();
            for pid in sched.owned_procs() {
                assert!(seen.insert(pid), "process {} appears twice", pid);
                assert!(!procs[pid].finished);
            }
        }
    }
}
