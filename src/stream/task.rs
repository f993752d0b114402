//! Task reference extraction from free text.
//!
//! Agents announce what they are working on with lines like
//! `TASK 7: Fix login bug`. When a text mentions several tasks, the last
//! statement governs.

use std::sync::LazyLock;

use regex::Regex;

static TASK_WITH_DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTASK\s+(\d+)\s*:[ \t]*([^\n\[]*)").unwrap());

static TASK_BARE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bTASK\s+(\d+)").unwrap());

/// A numbered task the agent said it is working on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReference {
    /// Task number, always > 0
    pub number: u32,
    /// Description after the colon; empty for bare references
    pub description: String,
}

/// Find the governing task reference in `text`.
///
/// `TASK N: description` matches are preferred over bare `TASK N`. Among
/// matches of the chosen form the last one wins. The description runs to the
/// end of the line or the first `[`, so a second `TASK M:` on the same line
/// belongs to the first description. Task number 0 is no match.
pub fn extract_task_reference(text: &str) -> Option<TaskReference> {
    if let Some(caps) = TASK_WITH_DESCRIPTION_RE.captures_iter(text).last() {
        let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
        let description = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        return (number > 0).then_some(TaskReference { number, description });
    }

    let caps = TASK_BARE_RE.captures_iter(text).last()?;
    let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
    (number > 0).then(|| TaskReference {
        number,
        description: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_described_task_wins() {
        let task = extract_task_reference("Starting TASK 3 now... switching to TASK 7: Fix bug [HIGH]").unwrap();
        assert_eq!(task.number, 7);
        assert_eq!(task.description, "Fix bug");
    }

    #[test]
    fn test_description_stops_at_newline() {
        let task = extract_task_reference("TASK 2: Write tests\nthen more text").unwrap();
        assert_eq!(task.number, 2);
        assert_eq!(task.description, "Write tests");
    }

    #[test]
    fn test_second_task_on_same_line_is_part_of_description() {
        // Description runs to newline or bracket, so a later TASK on the line is swallowed
        let task = extract_task_reference("TASK 3: ok then TASK 99999999999: huge").unwrap();
        assert_eq!(task.number, 3);
        assert_eq!(task.description, "ok then TASK 99999999999: huge");

        let task = extract_task_reference("TASK 3: ok then\nTASK 4: next").unwrap();
        assert_eq!(task.number, 4);
        assert_eq!(task.description, "next");
    }

    #[test]
    fn test_bare_reference_fallback() {
        let task = extract_task_reference("working on task 4 and then Task 5").unwrap();
        assert_eq!(task.number, 5);
        assert_eq!(task.description, "");
    }

    #[test]
    fn test_described_form_preferred_over_later_bare() {
        let task = extract_task_reference("TASK 1: Setup\nalso saw TASK 9").unwrap();
        assert_eq!(task.number, 1);
        assert_eq!(task.description, "Setup");
    }

    #[test]
    fn test_case_insensitive() {
        let task = extract_task_reference("task 12: refactor parser").unwrap();
        assert_eq!(task.number, 12);
        assert_eq!(task.description, "refactor parser");
    }

    #[test]
    fn test_zero_is_no_match() {
        assert!(extract_task_reference("TASK 0: nothing").is_none());
        assert!(extract_task_reference("TASK 0").is_none());
    }

    #[test]
    fn test_no_reference() {
        assert!(extract_task_reference("no tasks mentioned").is_none());
        assert!(extract_task_reference("SUBTASK 3").is_none());
        assert!(extract_task_reference("").is_none());
    }

    #[test]
    fn test_empty_description() {
        let task = extract_task_reference("TASK 8: [blocked]").unwrap();
        assert_eq!(task.number, 8);
        assert_eq!(task.description, "");
    }
}
