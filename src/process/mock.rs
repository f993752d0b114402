//! Scripted substitute for the agent binary.
//!
//! Each spawn plays the next [`Script`]: lines on stdout and stderr, an exit
//! code, and optionally a gate or hold that keeps the process "running"
//! until the test releases it or the engine kills it. The last script
//! repeats once the list is exhausted. Every [`SpawnRequest`] is recorded.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AgentProcess, ExitStatus, OutputStream, ProcessSpawner, SpawnRequest};
use crate::error::{LoopError, Result};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Behaviour of one scripted process
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: i32,
    /// Finish only after this is notified (or the process is killed)
    pub gate: Option<Arc<Notify>>,
    /// Never finish on its own; only a kill ends it
    pub hold: bool,
    /// Fail the spawn itself with this message
    pub spawn_error: Option<String>,
}

impl Script {
    /// A process that prints `lines` on stdout and exits 0
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A process that cannot be started
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_stderr<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stderr = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }
}

/// Spawner that plays scripts instead of starting real processes
#[derive(Debug, Default)]
pub struct ScriptedSpawner {
    scripts: Vec<Script>,
    requests: Mutex<Vec<SpawnRequest>>,
}

impl ScriptedSpawner {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in spawn order
    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of spawn attempts so far
    pub fn spawn_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn script_for(&self, index: usize) -> Script {
        self.scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessSpawner for ScriptedSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn AgentProcess>> {
        let index = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            requests.push(request);
            requests.len() - 1
        };
        let script = self.script_for(index);

        if let Some(message) = script.spawn_error {
            return Err(LoopError::Spawn(message));
        }

        let (stdout_writer, stdout_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_writer, stderr_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let killed = CancellationToken::new();
        let task = tokio::spawn(play(script, stdout_writer, stderr_writer, killed.clone()));

        Ok(Box::new(ScriptedProcess {
            stdout: Some(Box::new(stdout_reader)),
            stderr: Some(Box::new(stderr_reader)),
            killed,
            task: Some(task),
        }))
    }
}

async fn play(script: Script, mut stdout: DuplexStream, mut stderr: DuplexStream, killed: CancellationToken) -> ExitStatus {
    for line in &script.stdout {
        if write_line(&mut stdout, line).await.is_err() {
            break;
        }
    }
    for line in &script.stderr {
        if write_line(&mut stderr, line).await.is_err() {
            break;
        }
    }

    if script.hold {
        killed.cancelled().await;
    } else if let Some(gate) = &script.gate {
        tokio::select! {
            _ = gate.notified() => {}
            _ = killed.cancelled() => {}
        }
    }

    if killed.is_cancelled() {
        ExitStatus { code: None }
    } else {
        ExitStatus {
            code: Some(script.exit_code),
        }
    }
}

async fn write_line(pipe: &mut DuplexStream, line: &str) -> std::io::Result<()> {
    pipe.write_all(line.as_bytes()).await?;
    pipe.write_all(b"\n").await
}

struct ScriptedProcess {
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    killed: CancellationToken,
    task: Option<JoinHandle<ExitStatus>>,
}

#[async_trait]
impl AgentProcess for ScriptedProcess {
    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take()
    }

    async fn kill(&mut self) -> Result<()> {
        self.killed.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let task = self
            .task
            .take()
            .ok_or_else(|| LoopError::Stream("scripted process already waited".to_string()))?;
        task.await
            .map_err(|e| LoopError::Stream(format!("scripted process panicked: {}", e)))
    }
}
