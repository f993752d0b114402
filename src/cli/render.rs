//! Plain coloured text rendering of monitor observations.

use colored::*;

use ralphloop::domain::LOOP_BANNER;
use ralphloop::monitor::{MessageView, Observation, RunMonitor};
use ralphloop::runner::RunPhase;
use ralphloop::stream::{ContentItem, MessageKind};

/// Turns observations into display lines
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    verbose: bool,
}

impl Renderer {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Lines to print for one observation (possibly none)
    pub fn render(&self, observation: &Observation) -> Vec<String> {
        match observation {
            Observation::Marker { text, .. } => vec![format!("{LOOP_BANNER} {} {LOOP_BANNER}", text).cyan().bold().to_string()],
            Observation::Complete(text) => vec![format!("{LOOP_BANNER} {} {LOOP_BANNER}", text).green().bold().to_string()],
            Observation::Error(text) => vec![format!("error: {}", text).red().to_string()],
            Observation::Raw(line) => {
                if line.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![line.dimmed().to_string()]
                }
            }
            Observation::Message(view) => self.render_message(view),
        }
    }

    fn render_message(&self, view: &MessageView) -> Vec<String> {
        let mut lines = Vec::new();
        let prefix = if view.subagent { "  │ " } else { "" };

        if let Some(id) = &view.session_started {
            lines.push(format!("session {}", id).dimmed().to_string());
        }
        if let Some(until) = view.rate_limited_until {
            lines.push(format!("rate limited, hibernating until {}", until.to_rfc3339()).yellow().to_string());
        }
        if let Some(task) = &view.task {
            let line = if task.description.is_empty() {
                format!("▶ TASK {}", task.number)
            } else {
                format!("▶ TASK {}: {}", task.number, task.description)
            };
            lines.push(line.magenta().bold().to_string());
        }

        if self.verbose
            && let Some(thinking) = &view.content.thinking
        {
            lines.push(format!("{}{}", prefix, thinking).italic().dimmed().to_string());
        }

        for item in &view.content.items {
            match item {
                ContentItem::Text(text) if !text.is_empty() => {
                    lines.push(format!("{}{}", prefix, text));
                }
                ContentItem::Text(_) => {}
                ContentItem::ToolUse { name, preview } => {
                    lines.push(format!("{}{} {}", prefix, "⚙".blue(), name.blue().bold()));
                    if self.verbose && !preview.is_empty() {
                        lines.push(format!("{}{}", prefix, preview).dimmed().to_string());
                    }
                }
                ContentItem::ToolResult(text) => {
                    if self.verbose && !text.is_empty() {
                        lines.push(format!("{}{}", prefix, text).dimmed().to_string());
                    }
                }
            }
        }

        if view.kind == MessageKind::Result
            && !view.subagent
            && let Some(cost) = view.cost
        {
            lines.push(format!("iteration cost ${:.4}", cost).green().to_string());
        }

        lines
    }

    /// One-line status summary for the `s` command
    pub fn status(&self, monitor: &RunMonitor) -> String {
        let engine = monitor.engine();
        let stats = monitor.stats();

        let state = match engine.phase() {
            RunPhase::Idle => "idle".to_string(),
            RunPhase::Executing(i) => format!("running {}/{}", i, engine.iterations()),
            RunPhase::AwaitingResume(i) => format!("paused at {}/{}", i, engine.iterations()),
            RunPhase::Hibernating(i) => match engine.hibernate_until() {
                Some(until) => format!("hibernating before {} until {}", i, until.to_rfc3339()),
                None => format!("hibernating before {}", i),
            },
            RunPhase::Completed(n) => format!("completed {} (extend with +N)", n),
            RunPhase::Terminated => "terminated".to_string(),
        };

        let mut line = format!(
            "{} | tokens in {} out {} cache {}/{} | ${:.4} | {}s",
            state,
            stats.input_tokens,
            stats.output_tokens,
            stats.cache_creation_tokens,
            stats.cache_read_tokens,
            stats.total_cost_usd,
            stats.elapsed_secs
        );
        if monitor.active_subagents() > 0 {
            line.push_str(&format!(" | {} subagents", monitor.active_subagents()));
        }
        if let Some(task) = monitor.current_task() {
            line.push_str(&format!(" | task {}", task.number));
        }
        line.yellow().to_string()
    }
}
