//! A CPU is an identifier bound to a scheduler.

use crate::error::SimError;
use crate::sched::{CpuId, Process, Scheduler};

#[derive(Debug)]
pub struct Cpu {
    pub id: CpuId,
    pub scheduler: Scheduler,
}

impl Cpu {
    pub fn new(id: CpuId, target_latency_ns: u64) -> Self {
        Cpu {
            id,
            scheduler: Scheduler::new(id, target_latency_ns),
        }
    }

    /// Advance this CPU's scheduler by up to `budget_ns` of simulated time.
    pub fn run(&mut self, budget_ns: u64, procs: &mut [Process]) -> Result<(), SimError> {
        self.scheduler.run(budget_ns, procs)
    }

    pub fn has_unfinished_procs(&self) -> bool {
        self.scheduler.has_unfinished()
    }
}
