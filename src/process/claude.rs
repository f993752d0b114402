//! Production spawner for the Claude CLI.

use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use super::{AgentProcess, ExitStatus, OutputStream, ProcessSpawner, SpawnRequest};
use crate::error::{LoopError, Result};

/// Flags every invocation carries: headless print mode reading the prompt
/// from stdin, NDJSON output (which requires `--verbose`), no permission prompts.
pub const BASE_ARGS: &[&str] = &[
    "-p",
    "--output-format",
    "stream-json",
    "--verbose",
    "--dangerously-skip-permissions",
];

/// The external command line for one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    /// Binary to execute
    pub command: String,
    /// Extra flags appended after the base flags
    pub extra_args: Vec<String>,
    /// Optional `--model` value
    pub model: Option<String>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
            model: None,
        }
    }
}

impl AgentCommand {
    /// Create a command for the given binary
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Append extra flags
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Full argument list; the resume flag always goes last.
    pub fn build_args(&self, resume_session_id: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|a| a.to_string()).collect();

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.extend(self.extra_args.iter().cloned());

        if let Some(id) = resume_session_id {
            args.push("--resume".to_string());
            args.push(id.to_string());
        }

        args
    }
}

/// Spawns the real agent binary with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ClaudeSpawner {
    command: AgentCommand,
}

impl ClaudeSpawner {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ProcessSpawner for ClaudeSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn AgentProcess>> {
        let args = self.command.build_args(request.resume_session_id.as_deref());
        debug!(
            "spawn: {} ({} args, prompt {} bytes, resume={:?})",
            self.command.command,
            args.len(),
            request.prompt.len(),
            request.resume_session_id
        );

        let mut child = Command::new(&self.command.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoopError::Spawn(format!("failed to start '{}': {}", self.command.command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LoopError::Spawn("stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LoopError::Spawn("stderr pipe unavailable".to_string()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| LoopError::Spawn("stdin pipe unavailable".to_string()))?;

        // Written from a task so a large prompt cannot block on a full pipe
        // while nobody is draining stdout yet.
        let prompt = request.prompt;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!("spawn: failed to write prompt to stdin: {}", e);
            }
            if let Err(e) = stdin.shutdown().await {
                debug!("spawn: failed to close stdin: {}", e);
            }
        });

        Ok(Box::new(ClaudeProcess {
            child,
            stdout: Some(Box::new(stdout)),
            stderr: Some(Box::new(stderr)),
        }))
    }
}

struct ClaudeProcess {
    child: Child,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
}

#[async_trait]
impl AgentProcess for ClaudeProcess {
    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take()
    }

    async fn kill(&mut self) -> Result<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_build_args_fresh_run() {
        let args = AgentCommand::default().build_args(None);
        assert_eq!(
            args,
            vec!["-p", "--output-format", "stream-json", "--verbose", "--dangerously-skip-permissions"]
        );
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn test_build_args_resume_is_last() {
        let command = AgentCommand::new("claude")
            .with_args(vec!["--max-turns".to_string(), "5".to_string()])
            .with_model(Some("opus".to_string()));
        let args = command.build_args(Some("sess-42"));
        let n = args.len();
        assert_eq!(&args[n - 2..], &["--resume".to_string(), "sess-42".to_string()]);
        assert!(args.windows(2).any(|w| w == ["--model", "opus"]));
        assert!(args.windows(2).any(|w| w == ["--max-turns", "5"]));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_spawn_error() {
        let spawner = ClaudeSpawner::new(AgentCommand::new("/nonexistent/ralphloop-agent-binary"));
        let err = spawner
            .spawn(SpawnRequest {
                prompt: "hi".to_string(),
                resume_session_id: None,
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoopError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_flags_surface_as_unsuccessful_exit() {
        let mut process = ClaudeSpawner::new(AgentCommand::new("cat"))
            .spawn(SpawnRequest {
                prompt: "ignored".to_string(),
                resume_session_id: None,
            })
            .await
            .unwrap();
        let mut stdout = process.take_stdout().unwrap();
        let mut out = String::new();
        let _ = stdout.read_to_string(&mut out).await;
        let status = process.wait().await.unwrap();
        // cat fails on the unknown "-p" flag
        assert!(!status.success());
    }
}
