//! The machine: process arena, CPUs, migrator, and the driver loop.
//!
//! The machine owns every process in a flat arena and advances the CPUs in
//! a fixed order, one rebalance period at a time. Schedulers only ever see
//! arena handles; ownership of a process moves between schedulers at
//! migration points and nowhere else.

pub mod report;

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::migrate::Migrator;
use crate::models::{Tuning, Workload, NANOS_PER_MILLI};
use crate::sched::{Cpu, Process};
use crate::trace::{parse_trace_file, state, State};
use crate::workload::trace_path;

/// Log a heartbeat every this many rebalance periods.
const HEARTBEAT_PERIODS: u64 = 10;

#[derive(Debug)]
pub struct Machine {
    procs: Vec<Process>,
    cpus: Vec<Cpu>,
    migrator: Migrator,
    time_packing: bool,
    rebalance_period_ns: u64,
}

impl Machine {
    /// Build a machine from a workload: parse each benchmark's trace once,
    /// clone it into `quantity` processes, and deal the processes
    /// round-robin across the CPUs.
    pub fn from_workload(workload: &Workload, trace_dir: &Path, tuning: Tuning) -> Result<Machine> {
        let horizon_ns = workload.sim_time_ns();

        let mut states_by_bench: HashMap<&str, Vec<State>> = HashMap::new();
        let mut procs: Vec<Process> = Vec::new();
        for spec in &workload.processes {
            if !states_by_bench.contains_key(spec.benchmark.as_str()) {
                let path = trace_path(trace_dir, &spec.benchmark);
                let states = parse_trace_file(&path, horizon_ns)?;
                log::debug!(
                    "trace {}: {} states, {} ns total",
                    spec.benchmark,
                    states.len(),
                    state::total_duration(&states)
                );
                states_by_bench.insert(spec.benchmark.as_str(), states);
            }
            let states = &states_by_bench[spec.benchmark.as_str()];
            for i in 0..spec.quantity {
                procs.push(Process::new(
                    format!("{}-{}", spec.benchmark, i),
                    spec.benchmark.clone(),
                    states.clone(),
                    &tuning,
                ));
            }
        }

        let mut cpus: Vec<Cpu> = (0..workload.cpus)
            .map(|id| Cpu::new(id, workload.initial_latency_ns()))
            .collect();
        for pid in 0..procs.len() {
            if !procs[pid].finished {
                cpus[pid % workload.cpus].scheduler.admit(pid, &mut procs);
            }
        }

        Ok(Machine {
            procs,
            cpus,
            migrator: Migrator::new(workload.max_latency_ns(), tuning),
            time_packing: workload.time_packer_active,
            rebalance_period_ns: workload.rebalance_period_ns(),
        })
    }

    /// Run the simulation to completion: advance every CPU by one
    /// rebalance period, deliver cross-CPU wakeups, rebalance if the time
    /// packer is active, repeat until nothing is left to run.
    pub fn run(&mut self) -> Result<()> {
        let mut time_run: u64 = 0;
        let mut periods: u64 = 0;

        while self.cpus.iter().any(|c| c.has_unfinished_procs()) {
            for i in 0..self.cpus.len() {
                if self.cpus[i].has_unfinished_procs() {
                    self.cpus[i].run(self.rebalance_period_ns, &mut self.procs)?;
                    self.deliver_wake_migrants(i);
                }
            }

            time_run += self.rebalance_period_ns;
            periods += 1;
            if periods % HEARTBEAT_PERIODS == 0 {
                log::info!("simulated {} ms", time_run / NANOS_PER_MILLI);
            }

            if self.time_packing {
                self.migrator.rebalance(&mut self.cpus, &mut self.procs)?;
            }
        }

        Ok(())
    }

    /// A process that wakes after the migrator retargeted it leaves its
    /// old scheduler through the outbox; deliver it to its new home with
    /// the migrant placement.
    fn deliver_wake_migrants(&mut self, cpu: usize) {
        for pid in self.cpus[cpu].scheduler.take_outbox() {
            let dest = self.procs[pid].target_cpu;
            self.cpus[dest]
                .scheduler
                .enqueue_waking(pid, true, &mut self.procs);
        }
    }

    pub fn procs(&self) -> &[Process] {
        &self.procs
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }
}
