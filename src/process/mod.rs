//! Process adapter - how the engine starts one agent iteration.
//!
//! The engine only ever talks to [`ProcessSpawner`] and [`AgentProcess`], so
//! tests can drive it with [`mock::ScriptedSpawner`] instead of a real binary.

pub mod claude;
pub mod mock;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

pub use claude::{AgentCommand, ClaudeSpawner};
pub use mock::{Script, ScriptedSpawner};

/// One of the process's output streams
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to start one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Prompt written to the process's stdin
    pub prompt: String,
    /// Session to continue via `--resume`, captured at pause time
    pub resume_session_id: Option<String>,
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

/// A running agent process
#[async_trait]
pub trait AgentProcess: Send {
    /// Take the stdout stream; `None` after the first call
    fn take_stdout(&mut self) -> Option<OutputStream>;

    /// Take the stderr stream; `None` after the first call
    fn take_stderr(&mut self) -> Option<OutputStream>;

    /// Kill the process
    async fn kill(&mut self) -> Result<()>;

    /// Wait for the process to exit; call only after both streams are drained
    async fn wait(&mut self) -> Result<ExitStatus>;
}

/// Strategy for starting agent processes
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Start a process for one iteration
    async fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn AgentProcess>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus { code: Some(0) }.success());
        assert!(!ExitStatus { code: Some(1) }.success());
        assert!(!ExitStatus { code: None }.success());
    }
}
