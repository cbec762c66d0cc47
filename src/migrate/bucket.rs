//! A bucket groups processes of similar average burst length and carries
//! the CPUs the migrator has granted it.

use crate::sched::{CpuId, ProcId, Process};

#[derive(Debug)]
pub struct Bucket {
    pub procs: Vec<ProcId>,
    /// Burst-length class boundary: processes whose average burst is at or
    /// under this belong here.
    pub upper_bound_ns: u64,
    /// Sum of the constituents' loads.
    pub load: f64,
    pub num_cpus: usize,
    pub cpus: Vec<CpuId>,
}

impl Bucket {
    pub fn new(upper_bound_ns: u64) -> Self {
        Bucket {
            procs: Vec::new(),
            upper_bound_ns,
            load: 0.0,
            num_cpus: 0,
            cpus: Vec::new(),
        }
    }

    pub fn add_process(&mut self, pid: ProcId, load: f64) {
        self.procs.push(pid);
        self.load += load;
    }

    pub fn claim_cpu(&mut self, cpu: CpuId) {
        self.cpus.push(cpu);
    }

    /// Spread this bucket's processes over its CPUs, greedily placing each
    /// on the least-loaded CPU so far. Sets each process's `target_cpu` and
    /// returns, per CPU, the desired target latency: the sum of average
    /// burst lengths packed onto it.
    pub fn pack_procs(&mut self, procs: &mut [Process]) -> Vec<(CpuId, u64)> {
        debug_assert_eq!(self.num_cpus, self.cpus.len());

        let mut load_ledger: Vec<f64> = vec![0.0; self.cpus.len()];
        let mut desired: Vec<(CpuId, u64)> = self.cpus.iter().map(|&c| (c, 0)).collect();

        for &pid in &self.procs {
            let mut slot = 0;
            for i in 1..load_ledger.len() {
                if load_ledger[i] < load_ledger[slot] {
                    slot = i;
                }
            }
            procs[pid].target_cpu = self.cpus[slot];
            load_ledger[slot] += procs[pid].get_load();
            desired[slot].1 += procs[pid].average_runtime_ns;
        }

        desired
    }
}
