//! The time-packing rebalancer.
//!
//! Between scheduling windows the migrator clusters processes by average
//! run-burst length, hands each cluster a share of the CPUs proportional to
//! its load, packs processes onto those CPUs, and retunes each CPU's target
//! latency to the burst lengths it now hosts. Short-burst sleepy work ends
//! up on short-latency CPUs, long-burst compute on long-latency ones.

pub mod bucket;
pub mod jenks;
pub mod migrator;

pub use bucket::Bucket;
pub use jenks::natural_breaks;
pub use migrator::Migrator;
