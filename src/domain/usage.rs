//! Token usage counters reported by the agent

use serde::{Deserialize, Serialize};

/// Token counts carried by assistant and result messages.
///
/// Field names follow the agent's wire format. Missing counters decode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(rename = "cache_creation_input_tokens")]
    pub cache_creation_tokens: u64,
    #[serde(rename = "cache_read_input_tokens")]
    pub cache_read_tokens: u64,
}

impl Usage {
    /// Add another usage record to this one
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    /// Sum of all four counters
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// True when every counter is zero
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_from_wire_format() {
        let usage: Usage = serde_json::from_str(
            r#"{"input_tokens":10,"output_tokens":20,"cache_creation_input_tokens":30,"cache_read_input_tokens":40}"#,
        )
        .unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 20);
        assert_eq!(usage.cache_creation_tokens, 30);
        assert_eq!(usage.cache_read_tokens, 40);
        assert_eq!(usage.total(), 100);
    }

    #[test]
    fn test_usage_missing_fields_default_to_zero() {
        let usage: Usage = serde_json::from_str(r#"{"output_tokens":7,"service_tier":"standard"}"#).unwrap();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 7);
    }

    #[test]
    fn test_usage_add() {
        let mut total = Usage::default();
        assert!(total.is_empty());
        total.add(&Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_tokens: 3,
            cache_read_tokens: 4,
        });
        total.add(&Usage {
            input_tokens: 1,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 2);
        assert_eq!(total.total(), 11);
    }
}
