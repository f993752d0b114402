//! Stream message classifier.
//!
//! Turns one line of the agent's stream-json output into a typed
//! [`ParsedMessage`] and provides the extraction helpers the run monitor
//! uses: usage, cost, session identity, rate-limit status, subagent and
//! task tracking, and human-readable content.
//!
//! Every function here is stateless; accumulation happens in the caller.

mod content;
mod message;
mod parser;
mod task;

pub use content::{
    ContentItem, ExtractedContent, TOOL_PREVIEW_MAX_CHARS, extract_content, extract_thinking, strip_system_reminders,
    truncate_chars,
};
pub use message::{MessageBody, MessageKind, ParsedMessage, RateLimitInfo, RateLimitRejection};
pub use parser::{parse_line, parse_loop_marker};
pub use task::{TaskReference, extract_task_reference};
