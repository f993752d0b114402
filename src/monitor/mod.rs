//! Run monitor - the caller side of the engine's signal queue.
//!
//! The engine never looks inside the agent's output. The monitor classifies
//! every `output` signal and feeds what it learns back into the engine:
//! session ids go to [`Engine::set_session_id`] so a pause can resume the
//! conversation, and rate-limit rejections go to [`Engine::hibernate`]. It
//! also accumulates usage and cost, tracks running subagents and the task
//! the agent says it is working on, and hands the renderer an
//! [`Observation`] per signal.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::domain::{Signal, SignalKind};
use crate::runner::Engine;
use crate::storage::UsageStats;
use crate::stream::{
    ExtractedContent, MessageKind, ParsedMessage, TaskReference, extract_content, extract_task_reference, parse_line,
    parse_loop_marker,
};

/// What the renderer should show for one signal
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Loop marker; `position` is set for "LOOP i/n" markers
    Marker { text: String, position: Option<(u32, u32)> },
    /// Classified protocol message
    Message(MessageView),
    /// Output line that is not a protocol message
    Raw(String),
    /// Iteration or stream failure
    Error(String),
    /// Target reached
    Complete(String),
}

/// Display-relevant facts about one protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub kind: MessageKind,
    pub content: ExtractedContent,
    /// Emitted by a subagent rather than the main agent
    pub subagent: bool,
    /// Session id announced by this message
    pub session_started: Option<String>,
    /// Hibernation deadline requested because of this message
    pub rate_limited_until: Option<DateTime<Utc>>,
    /// Task reference that changed the current task
    pub task: Option<TaskReference>,
    /// Run cost reported by a result message
    pub cost: Option<f64>,
}

/// Accumulates run state from the signal stream and drives engine feedback
pub struct RunMonitor {
    engine: Engine,
    stats: UsageStats,
    subagents: HashSet<String>,
    current_task: Option<TaskReference>,
    default_backoff: Duration,
    last_usage_message_id: Option<String>,
    position: Option<(u32, u32)>,
    completed: u32,
    started: Instant,
}

impl RunMonitor {
    /// `default_backoff` is used when a rate-limit rejection carries no reset time
    pub fn new(engine: Engine, default_backoff: Duration) -> Self {
        Self {
            engine,
            stats: UsageStats::default(),
            subagents: HashSet::new(),
            current_task: None,
            default_backoff,
            last_usage_message_id: None,
            position: None,
            completed: 0,
            started: Instant::now(),
        }
    }

    /// Process one signal from the engine queue
    pub fn observe(&mut self, signal: &Signal) -> Observation {
        match signal.kind {
            SignalKind::LoopMarker => {
                let position = parse_loop_marker(&signal.banner());
                if let Some((current, _)) = position {
                    self.position = position;
                    self.mark_completed(current.saturating_sub(1));
                    // Fresh process: no subagents, no repeated message ids
                    self.subagents.clear();
                    self.last_usage_message_id = None;
                }
                Observation::Marker {
                    text: signal.content.clone(),
                    position,
                }
            }
            SignalKind::Complete => {
                self.mark_completed(signal.iteration);
                Observation::Complete(signal.content.clone())
            }
            SignalKind::Error => Observation::Error(signal.content.clone()),
            SignalKind::Output => match parse_line(&signal.content) {
                Some(msg) => Observation::Message(self.classify(&msg)),
                None => Observation::Raw(signal.content.clone()),
            },
        }
    }

    fn classify(&mut self, msg: &ParsedMessage) -> MessageView {
        let subagent = msg.is_subagent();

        let session_started = match msg.session_id() {
            "" => None,
            id => {
                if self.engine.session_id() != id {
                    info!("observe: session {}", id);
                    self.engine.set_session_id(id);
                }
                Some(id.to_string())
            }
        };

        let rate_limited_until = msg.rate_limit_rejection().map(|rejection| {
            let until = rejection.resets_at.unwrap_or_else(|| self.fallback_deadline());
            warn!("observe: rate limit rejected, hibernating until {}", until);
            self.engine.hibernate(until);
            until
        });

        if msg.kind == MessageKind::Assistant {
            self.account_usage(msg);
        }

        let cost = msg.cost();
        if let Some(cost) = cost {
            self.stats.add_cost(cost);
        }

        for id in msg.task_tool_use_ids() {
            debug!("observe: subagent {} started", id);
            self.subagents.insert(id);
        }
        if msg.kind == MessageKind::Result
            && let Some(parent) = msg.parent_tool_use_id.as_deref()
            && self.subagents.remove(parent)
        {
            debug!("observe: subagent {} finished", parent);
        }

        let content = extract_content(msg);

        let mut task = None;
        if msg.kind == MessageKind::Assistant && !subagent {
            let text = content.texts().join("\n");
            if let Some(reference) = extract_task_reference(&text)
                && self.current_task.as_ref() != Some(&reference)
            {
                info!("observe: working on task {}", reference.number);
                self.current_task = Some(reference.clone());
                task = Some(reference);
            }
        }

        MessageView {
            kind: msg.kind,
            content,
            subagent,
            session_started,
            rate_limited_until,
            task,
            cost,
        }
    }

    /// Assistant messages repeat their usage once per content block
    fn account_usage(&mut self, msg: &ParsedMessage) {
        let Some(usage) = msg.usage() else {
            return;
        };
        let id = msg.message.as_ref().and_then(|m| m.id.clone());
        if id.is_some() && id == self.last_usage_message_id {
            return;
        }
        self.last_usage_message_id = id;
        self.stats.add_usage(&usage);
    }

    fn fallback_deadline(&self) -> DateTime<Utc> {
        let backoff = chrono::Duration::from_std(self.default_backoff).unwrap_or_else(|_| chrono::Duration::minutes(5));
        Utc::now() + backoff
    }

    fn mark_completed(&mut self, completed: u32) {
        if completed > self.completed {
            self.stats.iterations += u64::from(completed - self.completed);
            self.completed = completed;
        }
    }

    /// Totals for this run so far, elapsed time included
    pub fn stats(&self) -> UsageStats {
        UsageStats {
            elapsed_secs: self.started.elapsed().as_secs(),
            ..self.stats.clone()
        }
    }

    /// Subagents started but not yet finished
    pub fn active_subagents(&self) -> usize {
        self.subagents.len()
    }

    pub fn current_task(&self) -> Option<&TaskReference> {
        self.current_task.as_ref()
    }

    /// Latest "LOOP i/n" position seen
    pub fn position(&self) -> Option<(u32, u32)> {
        self.position
    }

    /// Iteration currently executing, if any
    pub fn in_flight_iteration(&self) -> Option<u32> {
        self.position
            .map(|(current, _)| current)
            .filter(|current| *current > self.completed)
    }

    /// Lowest target a resize may set: the iteration in flight, or the count
    /// already completed when nothing is running
    pub fn resize_floor(&self) -> u32 {
        self.in_flight_iteration().unwrap_or(self.completed)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ScriptedSpawner;
    use std::sync::Arc;

    fn monitor() -> RunMonitor {
        let engine = Engine::new(3, "prompt", Arc::new(ScriptedSpawner::new(vec![])));
        RunMonitor::new(engine, Duration::from_secs(60))
    }

    fn output(line: &str) -> Signal {
        Signal::output(line, 1, 3)
    }

    #[test]
    fn test_system_message_sets_session() {
        let mut monitor = monitor();
        let obs = monitor.observe(&output(r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#));
        match obs {
            Observation::Message(view) => assert_eq!(view.session_started.as_deref(), Some("sess-1")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(monitor.engine().session_id(), "sess-1");
    }

    #[test]
    fn test_session_on_non_system_message_is_ignored() {
        let mut monitor = monitor();
        monitor.observe(&output(r#"{"type":"assistant","session_id":"sess-x","message":{"content":[]}}"#));
        assert_eq!(monitor.engine().session_id(), "");
    }

    #[test]
    fn test_rate_limit_rejection_hibernates_engine() {
        let mut monitor = monitor();
        let line = r#"{"type":"rate_limit_event","rate_limit_info":{"status":"rejected","resetsAt":4102444800}}"#;
        let Observation::Message(view) = monitor.observe(&output(line)) else {
            panic!("expected message");
        };
        let until = view.rate_limited_until.unwrap();
        assert_eq!(until.timestamp(), 4102444800);
        assert!(monitor.engine().is_hibernating());
        assert_eq!(monitor.engine().hibernate_until(), Some(until));
    }

    #[test]
    fn test_rate_limit_without_reset_uses_backoff() {
        let mut monitor = monitor();
        let before = Utc::now();
        monitor.observe(&output(r#"{"type":"rate_limit_event","rate_limit_info":{"status":"rejected"}}"#));
        let until = monitor.engine().hibernate_until().unwrap();
        assert!(until >= before + chrono::Duration::seconds(59));
    }

    #[test]
    fn test_allowed_rate_limit_does_not_hibernate() {
        let mut monitor = monitor();
        monitor.observe(&output(r#"{"type":"rate_limit_event","rate_limit_info":{"status":"allowed"}}"#));
        assert!(!monitor.engine().is_hibernating());
    }

    #[test]
    fn test_usage_deduplicated_by_message_id() {
        let mut monitor = monitor();
        let line = r#"{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"hi"}],"usage":{"input_tokens":10,"output_tokens":5}}}"#;
        monitor.observe(&output(line));
        monitor.observe(&output(line));
        let other = r#"{"type":"assistant","message":{"id":"m2","content":[],"usage":{"input_tokens":1,"output_tokens":1}}}"#;
        monitor.observe(&output(other));

        let stats = monitor.stats();
        assert_eq!(stats.input_tokens, 11);
        assert_eq!(stats.output_tokens, 6);
    }

    #[test]
    fn test_cost_from_result_messages() {
        let mut monitor = monitor();
        monitor.observe(&output(r#"{"type":"result","total_cost_usd":0.5,"result":"done"}"#));
        monitor.observe(&output(r#"{"type":"assistant","total_cost_usd":9.0,"message":{"content":[]}}"#));
        assert!((monitor.stats().total_cost_usd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_subagent_tracking() {
        let mut monitor = monitor();
        let spawn = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Task","input":{}},{"type":"tool_use","id":"toolu_2","name":"Task","input":{}},{"type":"tool_use","id":"toolu_3","name":"Bash","input":{}}]}}"#;
        monitor.observe(&output(spawn));
        assert_eq!(monitor.active_subagents(), 2);

        let Observation::Message(view) = monitor.observe(&output(
            r#"{"type":"assistant","parent_tool_use_id":"toolu_1","message":{"content":[{"type":"text","text":"TASK 9: inner"}]}}"#,
        )) else {
            panic!("expected message");
        };
        assert!(view.subagent);
        assert!(monitor.current_task().is_none());

        monitor.observe(&output(r#"{"type":"result","parent_tool_use_id":"toolu_1"}"#));
        assert_eq!(monitor.active_subagents(), 1);
    }

    #[test]
    fn test_task_reference_changes_reported_once() {
        let mut monitor = monitor();
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Starting TASK 3: Fix parser [HIGH]"}]}}"#;
        let Observation::Message(first) = monitor.observe(&output(line)) else {
            panic!("expected message");
        };
        assert_eq!(first.task.as_ref().map(|t| t.number), Some(3));
        let Observation::Message(second) = monitor.observe(&output(line)) else {
            panic!("expected message");
        };
        assert!(second.task.is_none());
        assert_eq!(monitor.current_task().unwrap().description, "Fix parser");
    }

    #[test]
    fn test_markers_count_iterations() {
        let mut monitor = monitor();
        let obs = monitor.observe(&Signal::marker("LOOP 1/3", 1, 3));
        assert_eq!(
            obs,
            Observation::Marker {
                text: "LOOP 1/3".to_string(),
                position: Some((1, 3))
            }
        );
        assert_eq!(monitor.in_flight_iteration(), Some(1));
        monitor.observe(&Signal::marker("LOOP STOPPED", 1, 3));
        monitor.observe(&Signal::marker("LOOP 1/3", 1, 3));
        monitor.observe(&Signal::marker("LOOP 2/3", 2, 3));
        assert_eq!(monitor.stats().iterations, 1);

        monitor.observe(&Signal::complete(2, 2));
        assert_eq!(monitor.stats().iterations, 2);
        assert_eq!(monitor.in_flight_iteration(), None);
    }

    #[test]
    fn test_resize_floor_tracks_in_flight_then_completed() {
        let mut monitor = monitor();
        assert_eq!(monitor.resize_floor(), 0);

        monitor.observe(&Signal::marker("LOOP 1/3", 1, 3));
        monitor.observe(&Signal::marker("LOOP 2/3", 2, 3));
        assert_eq!(monitor.resize_floor(), 2);

        monitor.observe(&Signal::complete(3, 3));
        assert_eq!(monitor.in_flight_iteration(), None);
        assert_eq!(monitor.resize_floor(), 3);
    }

    #[test]
    fn test_raw_and_error_lines() {
        let mut monitor = monitor();
        assert_eq!(monitor.observe(&output("plain text")), Observation::Raw("plain text".to_string()));
        assert_eq!(monitor.observe(&output("{broken")), Observation::Raw("{broken".to_string()));
        assert_eq!(
            monitor.observe(&Signal::error("boom", 1, 3)),
            Observation::Error("boom".to_string())
        );
    }
}
