//! Typed view of one stream-json protocol message.
//!
//! Only the fields the loop cares about are decoded; everything else in the
//! line is ignored so new protocol fields never break parsing.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::Usage;

/// Top-level `type` of a protocol message.
///
/// The set of kinds is open: anything unrecognised decodes as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    Assistant,
    User,
    Result,
    RateLimitEvent,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Rate-limit status block attached to `rate_limit_event` messages
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitInfo {
    pub status: Option<String>,
    /// Unix seconds at which the limit resets
    #[serde(alias = "resetsAt")]
    pub resets_at: Option<i64>,
    #[serde(alias = "rateLimitType")]
    pub rate_limit_type: Option<String>,
}

/// A rejected request, with the reset time when the agent reported one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub resets_at: Option<DateTime<Utc>>,
}

/// Inner `message` object of assistant and user messages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageBody {
    pub id: Option<String>,
    pub model: Option<String>,
    /// Either a plain string or an array of content blocks
    pub content: Option<Value>,
    pub usage: Option<Usage>,
}

/// One decoded protocol line
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParsedMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub subtype: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<MessageBody>,
    /// Top-level usage carried by `result` messages
    pub usage: Option<Usage>,
    pub total_cost_usd: Option<f64>,
    /// Set when the message belongs to a subagent; null and absent both mean "not a subagent"
    pub parent_tool_use_id: Option<String>,
    pub rate_limit_info: Option<RateLimitInfo>,
    pub result: Option<String>,
    pub is_error: Option<bool>,
    pub num_turns: Option<u32>,
    pub duration_ms: Option<u64>,
}

impl ParsedMessage {
    /// Token usage of this message, from the inner message or the top level
    pub fn usage(&self) -> Option<Usage> {
        self.message
            .as_ref()
            .and_then(|m| m.usage)
            .or(self.usage)
    }

    /// Total run cost; only `result` messages carry an authoritative value
    pub fn cost(&self) -> Option<f64> {
        if self.kind == MessageKind::Result {
            self.total_cost_usd
        } else {
            None
        }
    }

    /// Session id, authoritative only on `system` messages
    pub fn session_id(&self) -> &str {
        match (self.kind, self.session_id.as_deref()) {
            (MessageKind::System, Some(id)) => id,
            _ => "",
        }
    }

    /// Returns the rejection when the nested status is exactly `"rejected"`
    pub fn rate_limit_rejection(&self) -> Option<RateLimitRejection> {
        let info = self.rate_limit_info.as_ref()?;
        if info.status.as_deref() != Some("rejected") {
            return None;
        }
        let resets_at = info
            .resets_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        Some(RateLimitRejection { resets_at })
    }

    /// True iff the message carries a non-empty parent tool-use id
    pub fn is_subagent(&self) -> bool {
        self.parent_tool_use_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Model name reported on assistant messages
    pub fn model(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.model.as_deref())
    }

    /// Content blocks of the inner message; a plain string becomes one text block.
    pub fn content_blocks(&self) -> Vec<Value> {
        match self.message.as_ref().and_then(|m| m.content.as_ref()) {
            Some(Value::Array(blocks)) => blocks.clone(),
            Some(Value::String(text)) => vec![serde_json::json!({"type": "text", "text": text})],
            _ => Vec::new(),
        }
    }

    /// Ids of `Task` tool-use blocks; each one starts a subagent
    pub fn task_tool_use_ids(&self) -> Vec<String> {
        self.content_blocks()
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter(|block| block.get("name").and_then(Value::as_str) == Some("Task"))
            .filter_map(|block| block.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}
