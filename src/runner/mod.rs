//! Run loop module - the pausable, hibernating iteration engine.
//!
//! This module provides:
//! - Engine for driving repeated agent iterations
//! - RunPhase describing where the loop currently is
//! - Line-oriented draining of process output into the signal queue

mod engine;
mod reader;
mod state;

pub use engine::{Engine, EngineConfig};
pub use state::RunPhase;
