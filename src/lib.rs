//! ralphloop - run an AI agent CLI over and over
//!
//! ralphloop implements the "Ralph Wiggum" pattern: the same prompt is fed to a
//! fresh agent process once per iteration. The run can be paused and resumed
//! (continuing the agent's session), hibernated through rate limits, and
//! extended after it completes.

pub mod domain;
pub mod error;
pub mod monitor;
pub mod process;
pub mod runner;
pub mod storage;
pub mod stream;

pub use error::{LoopError, Result};
