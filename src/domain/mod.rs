//! Domain types for ralphloop
//!
//! - Signal: what the engine pushes onto its output queue
//! - Usage: token counters extracted from agent messages

pub mod signal;
pub mod usage;

pub use signal::{LOOP_BANNER, LOOP_RESUMED, LOOP_STOPPED, LOOP_WOKE, Signal, SignalKind};
pub use usage::Usage;
