//! Engine run state: the phase tagged union and the lock-guarded fields.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Where the run loop currently is.
///
/// The index carried by each variant makes the retry contract explicit: a
/// run paused in `AwaitingResume(i)` re-executes iteration `i`, while a run in
/// `Completed(n)` continues at `n + 1` once the target is raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    /// Constructed, not started
    #[default]
    Idle,
    /// Iteration `i` has a live process
    Executing(u32),
    /// Paused before (re)running iteration `i`
    AwaitingResume(u32),
    /// Backing off before iteration `i`
    Hibernating(u32),
    /// Finished `n` iterations, waiting for an extension or cancellation
    Completed(u32),
    /// Run cancelled; the output queue is closed
    Terminated,
}

impl RunPhase {
    /// Iteration index the run continues with after a resume
    pub fn resume_index(&self) -> Option<u32> {
        match *self {
            RunPhase::AwaitingResume(i) | RunPhase::Hibernating(i) => Some(i),
            RunPhase::Completed(n) => Some(n + 1),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Terminated)
    }
}

/// Mutable engine fields, always accessed under the engine's single lock
#[derive(Debug, Default)]
pub struct EngineState {
    pub(super) target_iterations: u32,
    pub(super) running: bool,
    pub(super) paused: bool,
    pub(super) hibernating: bool,
    pub(super) completed_waiting: bool,
    pub(super) hibernate_until: Option<DateTime<Utc>>,
    pub(super) session_id: String,
    /// Non-empty only between a pause and the next spawn
    pub(super) resume_session_id: Option<String>,
    /// Cancels only the in-flight process
    pub(super) iteration_cancel: Option<CancellationToken>,
    pub(super) phase: RunPhase,
}

impl EngineState {
    pub fn new(target_iterations: u32) -> Self {
        Self {
            target_iterations,
            ..Default::default()
        }
    }

    /// Returns false when the pause was a no-op.
    pub(super) fn pause(&mut self) -> bool {
        if !self.running || self.paused {
            return false;
        }
        self.paused = true;
        if !self.session_id.is_empty() {
            self.resume_session_id = Some(self.session_id.clone());
        }
        if let Some(token) = &self.iteration_cancel {
            token.cancel();
        }
        true
    }

    /// Returns true when the run loop should be signalled.
    pub(super) fn resume(&mut self) -> bool {
        if self.paused {
            self.paused = false;
            true
        } else {
            self.completed_waiting
        }
    }

    /// Start or extend hibernation; an existing deadline is never shortened.
    pub(super) fn hibernate(&mut self, until: DateTime<Utc>) {
        self.hibernate_until = match (self.hibernating, self.hibernate_until) {
            (true, Some(current)) => Some(current.max(until)),
            _ => Some(until),
        };
        self.hibernating = true;
    }

    pub(super) fn wake(&mut self) {
        self.hibernating = false;
        self.hibernate_until = None;
    }

    /// Consume the captured resume session; at most one spawn ever sees it
    pub(super) fn take_resume_session(&mut self) -> Option<String> {
        self.resume_session_id.take()
    }
}
