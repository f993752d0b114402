//! Human-readable content extraction from protocol messages.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::message::ParsedMessage;

/// Maximum characters of a tool-use input preview
pub const TOOL_PREVIEW_MAX_CHARS: usize = 150;

static SYSTEM_REMINDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").unwrap());

static THINKING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<thinking>(.*?)</thinking>").unwrap());

/// One displayable piece of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    /// Assistant or user prose
    Text(String),
    /// Tool invocation with a truncated pretty-JSON preview of its input
    ToolUse { name: String, preview: String },
    /// Full tool output, never truncated
    ToolResult(String),
}

/// Content extracted from one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub items: Vec<ContentItem>,
    /// At most one surfaced thinking block; the last one seen wins
    pub thinking: Option<String>,
}

impl ExtractedContent {
    /// Text items only, in order
    pub fn texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.thinking.is_none()
    }
}

/// Remove every `<system-reminder>` span (inclusive, across newlines), then trim
pub fn strip_system_reminders(text: &str) -> String {
    SYSTEM_REMINDER_RE.replace_all(text, "").trim().to_string()
}

/// Content of the first `<thinking>` span, trimmed; empty when there is none
pub fn extract_thinking(text: &str) -> String {
    THINKING_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// First `max` characters of `text` (char-safe)
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Walk a message's content blocks and produce display items
pub fn extract_content(msg: &ParsedMessage) -> ExtractedContent {
    let mut extracted = ExtractedContent::default();

    for block in msg.content_blocks() {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let raw = block.get("text").and_then(Value::as_str).unwrap_or_default();
                let text = strip_system_reminders(raw);
                let thinking = extract_thinking(&text);
                if !thinking.is_empty() {
                    extracted.thinking = Some(thinking);
                } else if !text.is_empty() {
                    extracted.items.push(ContentItem::Text(text));
                }
            }
            Some("thinking") => {
                let thinking = block.get("thinking").and_then(Value::as_str).unwrap_or_default().trim();
                if !thinking.is_empty() {
                    extracted.thinking = Some(thinking.to_string());
                }
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                let pretty = serde_json::to_string_pretty(&input).unwrap_or_else(|_| input.to_string());
                extracted.items.push(ContentItem::ToolUse {
                    name,
                    preview: truncate_chars(&pretty, TOOL_PREVIEW_MAX_CHARS),
                });
            }
            Some("tool_result") => {
                let text = strip_system_reminders(&render_tool_result(block.get("content")));
                extracted.items.push(ContentItem::ToolResult(text));
            }
            _ => {}
        }
    }

    extracted
}

/// Tool results arrive as a string, an array of text blocks, or an arbitrary object
fn render_tool_result(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| match part.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parse_line;

    #[test]
    fn test_strip_system_reminders() {
        let text = "before <system-reminder>secret\nmulti-line</system-reminder> middle <system-reminder>x</system-reminder>after  ";
        assert_eq!(strip_system_reminders(text), "before  middle after");
    }

    #[test]
    fn test_strip_system_reminders_is_non_greedy() {
        let text = "<system-reminder>a</system-reminder>keep<system-reminder>b</system-reminder>";
        assert_eq!(strip_system_reminders(text), "keep");
    }

    #[test]
    fn test_extract_thinking() {
        assert_eq!(extract_thinking("x <thinking>\n first \n</thinking> <thinking>second</thinking>"), "first");
        assert_eq!(extract_thinking("no thinking here"), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 3), "hi");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_extract_text_and_thinking() {
        let msg = parse_line(
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"Working on it<system-reminder>ignore me</system-reminder>"},
                {"type":"text","text":"<thinking>plan A</thinking>"},
                {"type":"text","text":"<thinking>plan B</thinking>"}
            ]}}"#,
        )
        .unwrap();
        let extracted = extract_content(&msg);
        assert_eq!(extracted.texts(), vec!["Working on it"]);
        assert_eq!(extracted.thinking.as_deref(), Some("plan B"));
    }

    #[test]
    fn test_native_thinking_block() {
        let msg = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#)
            .unwrap();
        assert_eq!(extract_content(&msg).thinking.as_deref(), Some("hmm"));
    }

    #[test]
    fn test_reminder_only_text_is_dropped() {
        let msg = parse_line(
            r#"{"type":"user","message":{"content":[{"type":"text","text":"<system-reminder>x</system-reminder>"}]}}"#,
        )
        .unwrap();
        assert!(extract_content(&msg).is_empty());
    }

    #[test]
    fn test_tool_use_preview_capped_at_150() {
        let long = "a".repeat(400);
        let line = serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": "t1", "name": "Write", "input": {"content": long}}]}
        })
        .to_string();
        let msg = parse_line(&line).unwrap();
        let extracted = extract_content(&msg);
        match &extracted.items[0] {
            ContentItem::ToolUse { name, preview } => {
                assert_eq!(name, "Write");
                assert_eq!(preview.chars().count(), TOOL_PREVIEW_MAX_CHARS);
                assert!(preview.starts_with("{\n  \"content\""));
            }
            other => panic!("expected tool use, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_result_not_truncated() {
        let long = "b".repeat(500);
        let line = serde_json::json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "t1", "content": long.clone()}]}
        })
        .to_string();
        let msg = parse_line(&line).unwrap();
        assert_eq!(extract_content(&msg).items, vec![ContentItem::ToolResult(long)]);
    }

    #[test]
    fn test_tool_result_array_and_object_payloads() {
        let msg = parse_line(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","content":[{"type":"text","text":"line one"},{"type":"text","text":"line two<system-reminder>r</system-reminder>"}]},
                {"type":"tool_result","content":{"ok":true}}
            ]}}"#,
        )
        .unwrap();
        let extracted = extract_content(&msg);
        assert_eq!(extracted.items[0], ContentItem::ToolResult("line one\nline two".to_string()));
        assert_eq!(extracted.items[1], ContentItem::ToolResult("{\n  \"ok\": true\n}".to_string()));
    }
}
