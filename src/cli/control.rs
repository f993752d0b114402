//! Interactive run controls read from stdin, one command per line.

/// A control command typed while the run is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    /// Add iterations (`+N`)
    Extend(u32),
    /// Remove iterations (`-N`)
    Shrink(u32),
    /// Set the target (`=N`)
    SetTarget(u32),
    Wake,
    Status,
    Quit,
}

impl ControlCommand {
    /// Parse one input line; `None` for anything unrecognised.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "p" | "pause" => return Some(Self::Pause),
            "r" | "resume" => return Some(Self::Resume),
            "w" | "wake" => return Some(Self::Wake),
            "s" | "status" => return Some(Self::Status),
            "q" | "quit" | "exit" => return Some(Self::Quit),
            _ => {}
        }

        let (op, rest) = line.split_at_checked(1)?;
        let n: u32 = rest.trim().parse().ok()?;
        match op {
            "+" => Some(Self::Extend(n)),
            "-" => Some(Self::Shrink(n)),
            "=" => Some(Self::SetTarget(n)),
            _ => None,
        }
    }

    /// New target for resize commands.
    ///
    /// The result never drops below `floor` (the iteration in flight, or the
    /// count already completed), so a resize cannot strand the current run.
    pub fn resize(&self, current: u32, floor: u32) -> Option<u32> {
        let wanted = match *self {
            Self::Extend(n) => current.saturating_add(n),
            Self::Shrink(n) => current.saturating_sub(n),
            Self::SetTarget(n) => n,
            _ => return None,
        };
        Some(wanted.max(floor).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words() {
        assert_eq!(ControlCommand::parse("p"), Some(ControlCommand::Pause));
        assert_eq!(ControlCommand::parse(" Resume \n"), Some(ControlCommand::Resume));
        assert_eq!(ControlCommand::parse("w"), Some(ControlCommand::Wake));
        assert_eq!(ControlCommand::parse("s"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse("q"), Some(ControlCommand::Quit));
        assert_eq!(ControlCommand::parse(""), None);
        assert_eq!(ControlCommand::parse("x"), None);
    }

    #[test]
    fn test_parse_resize() {
        assert_eq!(ControlCommand::parse("+3"), Some(ControlCommand::Extend(3)));
        assert_eq!(ControlCommand::parse("-2"), Some(ControlCommand::Shrink(2)));
        assert_eq!(ControlCommand::parse("= 10"), Some(ControlCommand::SetTarget(10)));
        assert_eq!(ControlCommand::parse("+"), None);
        assert_eq!(ControlCommand::parse("+x"), None);
        assert_eq!(ControlCommand::parse("*4"), None);
    }

    #[test]
    fn test_resize_clamps_to_floor() {
        assert_eq!(ControlCommand::Extend(2).resize(3, 1), Some(5));
        assert_eq!(ControlCommand::Shrink(5).resize(6, 4), Some(4));
        assert_eq!(ControlCommand::SetTarget(1).resize(6, 3), Some(3));
        assert_eq!(ControlCommand::Shrink(9).resize(2, 0), Some(1));
        assert_eq!(ControlCommand::Pause.resize(2, 0), None);
    }

    #[test]
    fn test_shrink_after_completion_keeps_completed_count() {
        // Run finished 4 iterations; floor is the completed count
        assert_eq!(ControlCommand::Shrink(3).resize(4, 4), Some(4));
        assert_eq!(ControlCommand::SetTarget(2).resize(4, 4), Some(4));
        assert_eq!(ControlCommand::Extend(1).resize(4, 4), Some(5));
    }
}
