//! Iteration engine - runs the agent process over and over.
//!
//! One `Engine` drives one run: a sequence of iterations, each a full
//! spawn/stream/exit cycle of the agent. The run can be paused (the
//! in-flight process is killed and the same iteration is redone under
//! `--resume`), hibernated until a rate limit resets, and extended after it
//! completes. Everything the run produces goes onto a bounded signal queue;
//! the queue closes when the run is cancelled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use super::reader::drain_lines;
use super::state::{EngineState, RunPhase};
use crate::domain::signal::{completed_text, iteration_text};
use crate::domain::{LOOP_RESUMED, LOOP_STOPPED, LOOP_WOKE, Signal};
use crate::error::{LoopError, Result};
use crate::process::{ProcessSpawner, SpawnRequest};

/// Tunables for the run loop
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between iterations (skipped after the last one)
    pub sleep_between: Duration,
    /// Signal queue capacity; a full queue blocks the producer
    pub queue_capacity: usize,
    /// Longest accepted output line
    pub max_line_bytes: usize,
    /// How long to wait for output readers after killing a process
    pub drain_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sleep_between: Duration::from_secs(2),
            queue_capacity: 100,
            max_line_bytes: 10 * 1024 * 1024,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

struct Shared {
    state: Mutex<EngineState>,
    resume_tx: mpsc::Sender<()>,
    /// Taken by `start`; owned by the run task afterwards
    resume_rx: Mutex<Option<mpsc::Receiver<()>>>,
    wake: Notify,
    spawner: Arc<dyn ProcessSpawner>,
    prompt: String,
    config: EngineConfig,
}

/// Handle to one run. Clones share the same run.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

/// Pushes signals stamped with the target at emission time
#[derive(Clone)]
pub(super) struct Emitter {
    tx: mpsc::Sender<Signal>,
    engine: Engine,
}

impl Emitter {
    /// Returns false once the receiver is gone
    async fn emit(&self, signal: Signal) -> bool {
        self.tx.send(signal).await.is_ok()
    }

    async fn marker(&self, content: impl Into<String>, iteration: u32) -> bool {
        self.emit(Signal::marker(content, iteration, self.engine.iterations())).await
    }

    pub(super) async fn output(&self, line: String, iteration: u32) -> bool {
        self.emit(Signal::output(line, iteration, self.engine.iterations())).await
    }

    pub(super) async fn error(&self, message: impl Into<String>, iteration: u32) -> bool {
        self.emit(Signal::error(message, iteration, self.engine.iterations())).await
    }

    async fn complete(&self, iteration: u32) -> bool {
        self.emit(Signal::complete(iteration, self.engine.iterations())).await
    }
}

/// State owned by the run task
struct RunContext {
    cancel: CancellationToken,
    emitter: Emitter,
    resume_rx: mpsc::Receiver<()>,
}

impl Engine {
    /// Create an engine for `target_iterations` iterations of `prompt`
    pub fn new(target_iterations: u32, prompt: impl Into<String>, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self::with_config(target_iterations, prompt, spawner, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(
        target_iterations: u32,
        prompt: impl Into<String>,
        spawner: Arc<dyn ProcessSpawner>,
        config: EngineConfig,
    ) -> Self {
        // Single slot: redundant resumes collapse into one wakeup
        let (resume_tx, resume_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::new(target_iterations)),
                resume_tx,
                resume_rx: Mutex::new(Some(resume_rx)),
                wake: Notify::new(),
                spawner,
                prompt: prompt.into(),
                config,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the run loop on its own task and return the signal queue.
    ///
    /// Cancelling `cancel` terminates the run and closes the queue.
    pub fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Signal>> {
        let resume_rx = self
            .shared
            .resume_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(LoopError::AlreadyStarted)?;

        let target = {
            let mut state = self.state();
            state.running = true;
            state.target_iterations
        };
        info!("start: running {} iterations", target);

        let (tx, rx) = mpsc::channel(self.shared.config.queue_capacity.max(1));
        let ctx = RunContext {
            cancel,
            emitter: Emitter {
                tx,
                engine: self.clone(),
            },
            resume_rx,
        };
        let engine = self.clone();
        tokio::spawn(async move { engine.run(ctx).await });

        Ok(rx)
    }

    /// Pause the run: kill the in-flight process and remember the session to resume.
    ///
    /// No-op unless the run is active and not already paused.
    pub fn pause(&self) {
        if self.state().pause() {
            info!("pause: run paused");
        } else {
            debug!("pause: ignored");
        }
    }

    /// Resume a paused run, or re-check the target of a completed run
    pub fn resume(&self) {
        if self.state().resume() {
            info!("resume: signalling run loop");
            // Full slot means a wakeup is already pending
            let _ = self.shared.resume_tx.try_send(());
        }
    }

    /// Back off until `until`; an existing later deadline is kept
    pub fn hibernate(&self, until: DateTime<Utc>) {
        let effective = {
            let mut state = self.state();
            state.hibernate(until);
            state.hibernate_until
        };
        info!("hibernate: until {:?}", effective);
    }

    /// End hibernation now
    pub fn wake(&self) {
        self.state().wake();
        self.shared.wake.notify_one();
        info!("wake: hibernation cleared");
    }

    /// Change the target iteration count.
    ///
    /// Not clamped: lowering it to or below the in-flight index ends the run
    /// after the current iteration. Callers enforce any floor.
    pub fn set_iterations(&self, n: u32) {
        self.state().target_iterations = n;
        debug!("set_iterations: {}", n);
    }

    pub fn iterations(&self) -> u32 {
        self.state().target_iterations
    }

    /// Record the agent's session id (taken from classified output)
    pub fn set_session_id(&self, id: impl Into<String>) {
        self.state().session_id = id.into();
    }

    pub fn session_id(&self) -> String {
        self.state().session_id.clone()
    }

    /// Session id captured by the last pause and not yet used by a spawn
    pub fn pending_resume_session(&self) -> Option<String> {
        self.state().resume_session_id.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn is_hibernating(&self) -> bool {
        self.state().hibernating
    }

    pub fn hibernate_until(&self) -> Option<DateTime<Utc>> {
        self.state().hibernate_until
    }

    pub fn is_completed_waiting(&self) -> bool {
        self.state().completed_waiting
    }

    pub fn phase(&self) -> RunPhase {
        self.state().phase
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state().phase = phase;
    }

    async fn run(self, mut ctx: RunContext) {
        self.run_loop(&mut ctx).await;

        {
            let mut state = self.state();
            state.running = false;
            state.completed_waiting = false;
            state.iteration_cancel = None;
            state.phase = RunPhase::Terminated;
        }
        info!("run: terminated");
        // ctx (and with it the last sender) drops here, closing the queue
    }

    async fn run_loop(&self, ctx: &mut RunContext) {
        let mut index = 1u32;

        loop {
            if ctx.cancel.is_cancelled() {
                return;
            }

            if index > self.iterations() {
                match self.await_extension(index - 1, ctx).await {
                    Some(next) => {
                        index = next;
                        continue;
                    }
                    None => return,
                }
            }

            if self.is_paused() {
                if !self.hold_while_paused(index, ctx).await {
                    return;
                }
                continue;
            }

            if self.is_hibernating() {
                if !self.sleep_through_hibernation(index, ctx).await {
                    return;
                }
                continue;
            }

            let target = self.iterations();
            if !ctx.emitter.marker(iteration_text(index, target), index).await {
                return;
            }

            let iteration_cancel = ctx.cancel.child_token();
            {
                let mut state = self.state();
                // A pause that landed after the check above still stops this iteration
                if state.paused {
                    iteration_cancel.cancel();
                }
                state.iteration_cancel = Some(iteration_cancel.clone());
                state.phase = RunPhase::Executing(index);
            }
            info!("run: iteration {}/{} started", index, target);

            let result = self.execute(index, &iteration_cancel, &ctx.emitter).await;
            self.state().iteration_cancel = None;

            if ctx.cancel.is_cancelled() {
                return;
            }

            if iteration_cancel.is_cancelled() {
                // Interrupted by pause: partial work is discarded and the same
                // index runs again once resumed.
                info!("run: iteration {} interrupted by pause", index);
                if !self.hold_while_paused(index, ctx).await {
                    return;
                }
                continue;
            }

            match result {
                Ok(()) => debug!("run: iteration {} finished", index),
                Err(e) if e.is_cancellation() => {}
                Err(e) => {
                    warn!("run: iteration {} failed: {}", index, e);
                    if !ctx.emitter.error(e.to_string(), index).await {
                        return;
                    }
                }
            }

            if index < self.iterations() && !self.sleep_between(ctx).await {
                return;
            }
            index += 1;
        }
    }

    /// Emit "LOOP STOPPED", wait until unpaused, emit "LOOP RESUMED".
    ///
    /// Returns false when the run was cancelled.
    async fn hold_while_paused(&self, index: u32, ctx: &mut RunContext) -> bool {
        self.set_phase(RunPhase::AwaitingResume(index));
        if !ctx.emitter.marker(LOOP_STOPPED, index).await {
            return false;
        }

        while self.is_paused() {
            tokio::select! {
                _ = ctx.resume_rx.recv() => {}
                _ = ctx.cancel.cancelled() => return false,
            }
        }
        // Resumed before we started waiting; drop the stale wakeup
        let _ = ctx.resume_rx.try_recv();

        let next = self.phase().resume_index().unwrap_or(index);
        info!("run: resumed at iteration {}", next);
        ctx.emitter.marker(LOOP_RESUMED, next).await
    }

    /// Announce completion and wait until the target is raised past `completed`.
    ///
    /// Returns the next index, or `None` when the run was cancelled.
    async fn await_extension(&self, completed: u32, ctx: &mut RunContext) -> Option<u32> {
        while ctx.resume_rx.try_recv().is_ok() {}

        let target = {
            let mut state = self.state();
            state.completed_waiting = true;
            state.phase = RunPhase::Completed(completed);
            state.target_iterations
        };
        info!("run: {}", completed_text(target));
        if !ctx.emitter.complete(completed).await {
            return None;
        }

        loop {
            tokio::select! {
                _ = ctx.resume_rx.recv() => {}
                _ = ctx.cancel.cancelled() => return None,
            }

            let target = self.iterations();
            if target > completed {
                let next = {
                    let mut state = self.state();
                    state.completed_waiting = false;
                    state.phase.resume_index().unwrap_or(completed + 1)
                };
                info!("run: extended to {} iterations", target);
                if !ctx.emitter.marker(LOOP_RESUMED, next).await {
                    return None;
                }
                return Some(next);
            }
            debug!("run: resume without extension ({} <= {}), still waiting", target, completed);
        }
    }

    /// Wait out hibernation. Returns false when the run was cancelled.
    async fn sleep_through_hibernation(&self, index: u32, ctx: &mut RunContext) -> bool {
        let mut announced = false;

        loop {
            let until = {
                let state = self.state();
                if !state.hibernating {
                    break;
                }
                state.hibernate_until
            };
            let remaining = until
                .and_then(|t| (t - Utc::now()).to_std().ok())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                self.state().wake();
                break;
            }

            if !announced {
                self.set_phase(RunPhase::Hibernating(index));
                let until_text = until.map(|t| t.to_rfc3339()).unwrap_or_default();
                info!("run: hibernating until {}", until_text);
                if !ctx
                    .emitter
                    .marker(format!("LOOP HIBERNATING UNTIL {}", until_text), index)
                    .await
                {
                    return false;
                }
                announced = true;
            }

            // Deadline may have been extended or cleared meanwhile; re-check either way
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.shared.wake.notified() => {}
                _ = ctx.cancel.cancelled() => return false,
            }
        }

        if announced {
            info!("run: woke from hibernation");
            return ctx.emitter.marker(LOOP_WOKE, index).await;
        }
        true
    }

    async fn sleep_between(&self, ctx: &RunContext) -> bool {
        let interval = self.shared.config.sleep_between;
        if interval.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => true,
            _ = ctx.cancel.cancelled() => false,
        }
    }

    /// Run one process to completion (or until `iteration_cancel` fires).
    async fn execute(&self, index: u32, iteration_cancel: &CancellationToken, emitter: &Emitter) -> Result<()> {
        if iteration_cancel.is_cancelled() {
            return Err(LoopError::Cancelled);
        }

        let resume_session_id = self.state().take_resume_session();
        if let Some(id) = &resume_session_id {
            info!("execute: iteration {} resuming session {}", index, id);
        }

        let request = SpawnRequest {
            prompt: self.shared.prompt.clone(),
            resume_session_id,
        };
        let mut process = self.shared.spawner.spawn(request).await?;

        let stdout = process
            .take_stdout()
            .ok_or_else(|| LoopError::Spawn("stdout unavailable".to_string()))?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| LoopError::Spawn("stderr unavailable".to_string()))?;

        let max = self.shared.config.max_line_bytes;
        let stdout_task = tokio::spawn(drain_lines(stdout, emitter.clone(), index, max, "stdout"));
        let stderr_task = tokio::spawn(drain_lines(stderr, emitter.clone(), index, max, "stderr"));
        let aborts = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        // Both readers must finish before the process is reaped
        let readers = async move {
            let _ = tokio::join!(stdout_task, stderr_task);
        };
        tokio::pin!(readers);

        let killed = tokio::select! {
            _ = &mut readers => false,
            _ = iteration_cancel.cancelled() => true,
        };

        if killed {
            debug!("execute: iteration {} cancelled, killing process", index);
            if let Err(e) = process.kill().await {
                warn!("execute: kill failed: {}", e);
            }
            if tokio::time::timeout(self.shared.config.drain_timeout, &mut readers)
                .await
                .is_err()
            {
                warn!("execute: output readers still open after kill, aborting them");
                for abort in &aborts {
                    abort.abort();
                }
            }
        }

        let status = process.wait().await?;
        if killed {
            return Err(LoopError::Cancelled);
        }
        if status.success() {
            Ok(())
        } else {
            Err(LoopError::ProcessFailed {
                code: status.code,
                detail: format!("iteration {} agent process exited unsuccessfully", index),
            })
        }
    }
}
