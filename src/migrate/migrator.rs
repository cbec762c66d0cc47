//! Global periodic rebalancer.
//!
//! Runs between scheduling windows, when every scheduler is quiescent:
//! gathers the unfinished processes, clusters them into buckets by average
//! burst length, allots CPUs to buckets by load weight, packs processes
//! onto the allotted CPUs, migrates them, and retunes each CPU's target
//! latency.

use crate::error::SimError;
use crate::migrate::jenks::natural_breaks;
use crate::migrate::Bucket;
use crate::models::Tuning;
use crate::sched::{Cpu, ProcId, Process};

#[derive(Debug)]
pub struct Migrator {
    /// Cap applied to every retuned target latency.
    max_latency_ns: u64,
    tuning: Tuning,
    /// Mean of the retuned latencies, one entry per rebalance.
    historical_latencies: Vec<u64>,
    /// The buckets built by the most recent rebalance.
    pub buckets: Vec<Bucket>,
}

impl Migrator {
    pub fn new(max_latency_ns: u64, tuning: Tuning) -> Self {
        Migrator {
            max_latency_ns,
            tuning,
            historical_latencies: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /// Every unfinished process across all CPUs.
    fn gather_procs(cpus: &[Cpu]) -> Vec<ProcId> {
        let mut pids = Vec::new();
        for cpu in cpus {
            pids.extend(cpu.scheduler.owned_procs());
        }
        pids
    }

    /// Recluster, reassign and retune. `cpus[i].id == i` is relied on for
    /// delivering migrants.
    pub fn rebalance(&mut self, cpus: &mut [Cpu], procs: &mut [Process]) -> Result<(), SimError> {
        let gathered = Self::gather_procs(cpus);
        if gathered.is_empty() {
            return Ok(());
        }

        self.buckets = self.build_buckets(&gathered, cpus.len(), procs);
        self.allot_cpus(gathered.len(), cpus.len())?;

        // Hand CPUs to buckets in order, then pack processes within each.
        let mut next_cpu = 0;
        let mut retunes: Vec<(usize, u64)> = Vec::new();
        for bucket in &mut self.buckets {
            for _ in 0..bucket.num_cpus {
                bucket.claim_cpu(cpus[next_cpu].id);
                next_cpu += 1;
            }
            retunes.extend(bucket.pack_procs(procs));
        }

        self.migrate(cpus, procs);
        self.retune_latencies(&retunes, cpus, procs);
        self.log_buckets(procs);

        Ok(())
    }

    /// Cluster processes into buckets by average burst length using
    /// natural breaks; a process lands in the first bucket whose upper
    /// bound covers its average, less a small rounding slack.
    fn build_buckets(&self, gathered: &[ProcId], num_cpus: usize, procs: &[Process]) -> Vec<Bucket> {
        let num_buckets = (num_cpus / 2).max(1);
        let averages: Vec<f64> = gathered
            .iter()
            .map(|&pid| procs[pid].average_runtime_ns as f64)
            .collect();

        let breaks = natural_breaks(&averages, num_buckets.min(gathered.len()));
        let mut buckets: Vec<Bucket> = breaks[1..]
            .iter()
            .map(|&b| Bucket::new(b as u64))
            .collect();

        let last = buckets.len() - 1;
        for &pid in gathered {
            let wanted = procs[pid]
                .average_runtime_ns
                .saturating_sub(self.tuning.rounding_error_ns);
            let slot = buckets
                .iter()
                .position(|b| b.upper_bound_ns >= wanted)
                .unwrap_or(last);
            buckets[slot].add_process(pid, procs[pid].get_load());
        }

        buckets
    }

    /// Give every non-empty bucket one CPU, then its load-weighted share,
    /// then spread any leftovers in descending load order. The `|procs|-1`
    /// cap keeps a bucket from claiming more CPUs than it can fill.
    fn allot_cpus(&mut self, num_procs: usize, num_cpus: usize) -> Result<(), SimError> {
        let target_allotted = num_procs.min(num_cpus);
        let mut allotted = 0;

        for bucket in &mut self.buckets {
            if !bucket.procs.is_empty() {
                bucket.num_cpus = 1;
                allotted += 1;
            }
        }

        let total_load: f64 = self.buckets.iter().map(|b| b.load).sum();
        for bucket in &mut self.buckets {
            if bucket.procs.is_empty() {
                continue;
            }
            let remaining = target_allotted - allotted;
            if remaining == 0 {
                break;
            }

            let load_weight = if total_load > 0.0 {
                bucket.load / total_load
            } else {
                0.0
            };
            let deserved = (load_weight * num_cpus as f64).round() as usize;
            let delta = deserved.saturating_sub(bucket.num_cpus);
            let granted = delta.min(remaining).min(bucket.procs.len() - 1);
            bucket.num_cpus += granted;
            allotted += granted;
        }

        let mut remaining = target_allotted - allotted;
        let mut by_load: Vec<usize> = (0..self.buckets.len())
            .filter(|&i| !self.buckets[i].procs.is_empty())
            .collect();
        by_load.sort_by(|&a, &b| self.buckets[b].load.total_cmp(&self.buckets[a].load));
        for i in by_load {
            if remaining == 0 {
                break;
            }
            if self.buckets[i].procs.len() > self.buckets[i].num_cpus {
                self.buckets[i].num_cpus += 1;
                remaining -= 1;
            }
        }

        if remaining != 0 {
            return Err(SimError::CpuApportionment {
                remaining,
                buckets: self.buckets.len(),
            });
        }
        Ok(())
    }

    /// Move every process whose `target_cpu` changed. Runnable migrants
    /// enter the destination runqueue deferred one latency cycle; sleeping
    /// migrants keep sleeping on the destination and get the same deferral
    /// when they wake.
    fn migrate(&self, cpus: &mut [Cpu], procs: &mut [Process]) {
        let mut moving: Vec<ProcId> = Vec::new();
        for cpu in cpus.iter_mut() {
            moving.extend(cpu.scheduler.drain_migrants(procs));
        }

        for pid in moving {
            let dest = procs[pid].target_cpu;
            if procs[pid].is_running() {
                cpus[dest].scheduler.enqueue_waking(pid, true, procs);
            } else {
                cpus[dest].scheduler.adopt_sleeper(pid, procs);
            }
        }
    }

    /// Point each CPU's target latency at the burst lengths it now hosts,
    /// capped at the configured maximum. A CPU that received no processes
    /// keeps its previous latency.
    fn retune_latencies(&mut self, retunes: &[(usize, u64)], cpus: &mut [Cpu], procs: &mut [Process]) {
        let mut applied: Vec<u64> = Vec::new();
        for &(cpu, desired) in retunes {
            if desired == 0 {
                continue;
            }
            let latency = desired.min(self.max_latency_ns);
            cpus[cpu].scheduler.set_target_latency(latency, procs);
            applied.push(latency);
        }

        if !applied.is_empty() {
            let mean = applied.iter().sum::<u64>() / applied.len() as u64;
            self.historical_latencies.push(mean);
        }
    }

    /// Mean of the per-rebalance mean latencies, if any rebalance retuned
    /// anything yet.
    pub fn mean_latency_ns(&self) -> Option<u64> {
        if self.historical_latencies.is_empty() {
            return None;
        }
        Some(self.historical_latencies.iter().sum::<u64>() / self.historical_latencies.len() as u64)
    }

    fn log_buckets(&self, procs: &[Process]) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for (i, bucket) in self.buckets.iter().enumerate() {
            let names: Vec<&str> = bucket
                .procs
                .iter()
                .map(|&pid| procs[pid].name.as_str())
                .collect();
            log::debug!(
                "bucket {} (upper {} ns, {} cpus): {:?}",
                i,
                bucket.upper_bound_ns,
                bucket.num_cpus,
                names
            );
        }
    }
}
