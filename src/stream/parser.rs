//! Line-level parsing of the agent's output stream.

use std::sync::LazyLock;

use regex::Regex;

use super::message::ParsedMessage;
use crate::domain::LOOP_BANNER;

static LOOP_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"LOOP (\d+)/(\d+)").unwrap());

/// Parse one output line into a protocol message.
///
/// Returns `None` for blank lines, banner lines, and anything that is not a
/// JSON object. Decode failures are swallowed so unknown or partial output
/// never interrupts the run.
pub fn parse_line(line: &str) -> Option<ParsedMessage> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(LOOP_BANNER) || !line.starts_with('{') {
        return None;
    }

    match serde_json::from_str::<ParsedMessage>(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            log::trace!("parse_line: ignoring undecodable line: {}", e);
            None
        }
    }
}

/// Parse a rendered loop banner (`======= LOOP 3/10 =======`) into `(current, total)`
pub fn parse_loop_marker(line: &str) -> Option<(u32, u32)> {
    let line = line.trim();
    if !line.starts_with(LOOP_BANNER) {
        return None;
    }
    let caps = LOOP_MARKER_RE.captures(line)?;
    let current = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((current, total))
}
