//! Signal types for engine-to-caller communication
//!
//! Every unit the engine pushes onto its output queue is a `Signal`: loop
//! markers, raw process output lines, iteration errors, and completion.

use serde::{Deserialize, Serialize};

/// Prefix of every banner line rendered for a loop marker.
pub const LOOP_BANNER: &str = "=======";

/// Marker text emitted when a pause takes effect
pub const LOOP_STOPPED: &str = "LOOP STOPPED";

/// Marker text emitted when a paused or completed run continues
pub const LOOP_RESUMED: &str = "LOOP RESUMED";

/// Marker text emitted when hibernation ends
pub const LOOP_WOKE: &str = "LOOP WOKE";

/// Kind of signal on the output queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Engine-generated progress marker ("LOOP 2/5", "LOOP STOPPED", ...)
    LoopMarker,
    /// One raw line from the agent process (stdout or stderr)
    Output,
    /// A failed iteration or stream; the run continues
    Error,
    /// All target iterations finished
    Complete,
}

/// One unit pushed onto the engine's output queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// What kind of signal this is
    pub kind: SignalKind,
    /// Marker text, output line, or error text
    pub content: String,
    /// Iteration the signal belongs to (1-based)
    pub iteration: u32,
    /// Target iteration count at the moment of emission
    pub target: u32,
}

impl Signal {
    /// Create a new signal
    pub fn new(kind: SignalKind, content: impl Into<String>, iteration: u32, target: u32) -> Self {
        Self {
            kind,
            content: content.into(),
            iteration,
            target,
        }
    }

    /// Create a loop marker signal
    pub fn marker(content: impl Into<String>, iteration: u32, target: u32) -> Self {
        Self::new(SignalKind::LoopMarker, content, iteration, target)
    }

    /// Create an output signal
    pub fn output(line: impl Into<String>, iteration: u32, target: u32) -> Self {
        Self::new(SignalKind::Output, line, iteration, target)
    }

    /// Create an error signal
    pub fn error(message: impl Into<String>, iteration: u32, target: u32) -> Self {
        Self::new(SignalKind::Error, message, iteration, target)
    }

    /// Create the completion signal
    pub fn complete(iteration: u32, target: u32) -> Self {
        Self::new(SignalKind::Complete, completed_text(target), iteration, target)
    }

    /// Render the signal as a display line; markers get the banner frame.
    pub fn banner(&self) -> String {
        match self.kind {
            SignalKind::LoopMarker | SignalKind::Complete => {
                format!("{LOOP_BANNER} {} {LOOP_BANNER}", self.content)
            }
            _ => self.content.clone(),
        }
    }
}

/// Marker text announcing the start of iteration `iteration` of `target`
pub fn iteration_text(iteration: u32, target: u32) -> String {
    format!("LOOP {}/{}", iteration, target)
}

/// Completion text for a run that finished `target` iterations
pub fn completed_text(target: u32) -> String {
    format!("COMPLETED {} ITERATIONS", target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_constructors() {
        let s = Signal::marker(iteration_text(2, 5), 2, 5);
        assert_eq!(s.kind, SignalKind::LoopMarker);
        assert_eq!(s.content, "LOOP 2/5");
        assert_eq!(s.target, 5);

        let s = Signal::output("{\"type\":\"system\"}", 1, 1);
        assert_eq!(s.kind, SignalKind::Output);

        let s = Signal::error("boom", 1, 1);
        assert_eq!(s.kind, SignalKind::Error);

        let s = Signal::complete(3, 3);
        assert_eq!(s.kind, SignalKind::Complete);
        assert_eq!(s.content, "COMPLETED 3 ITERATIONS");
    }

    #[test]
    fn test_banner_wraps_markers_only() {
        let marker = Signal::marker("LOOP 1/3", 1, 3);
        assert_eq!(marker.banner(), "======= LOOP 1/3 =======");

        let output = Signal::output("plain line", 1, 3);
        assert_eq!(output.banner(), "plain line");
    }

    #[test]
    fn test_signal_kind_serialization() {
        let json = serde_json::to_string(&SignalKind::LoopMarker).unwrap();
        assert_eq!(json, "\"loop_marker\"");
        let kind: SignalKind = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(kind, SignalKind::Complete);
    }
}
