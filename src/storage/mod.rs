//! Persistence for run statistics.
//!
//! The run loop itself keeps no durable state; only the cumulative usage
//! counters survive between runs.

mod stats;

pub use stats::{StatsStore, UsageStats};
