//! Cumulative usage statistics persisted as a small JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::Usage;
use crate::error::Result;

/// Token, cost, and time totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_cost_usd: f64,
    pub elapsed_secs: u64,
    pub iterations: u64,
}

impl UsageStats {
    pub fn add_usage(&mut self, usage: &Usage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cache_creation_tokens += usage.cache_creation_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;
    }

    pub fn add_cost(&mut self, cost: f64) {
        self.total_cost_usd += cost;
    }

    /// Fold another set of totals into this one
    pub fn merge(&mut self, other: &UsageStats) {
        self.add_usage(&other.usage());
        self.add_cost(other.total_cost_usd);
        self.elapsed_secs += other.elapsed_secs;
        self.iterations += other.iterations;
    }

    /// Token counters as a `Usage`
    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage().total()
    }
}

/// Reads and writes `UsageStats` at a fixed path
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored totals; a missing file yields zeroed stats.
    pub fn load(&self) -> Result<UsageStats> {
        if !self.path.exists() {
            debug!("StatsStore::load: {} missing, starting from zero", self.path.display());
            return Ok(UsageStats::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(UsageStats::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `stats`, replacing the file atomically
    pub fn save(&self, stats: &UsageStats) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(stats)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("StatsStore::save: wrote {}", self.path.display());
        Ok(())
    }

    /// Load, merge `run`, and save; returns the new totals
    pub fn accumulate(&self, run: &UsageStats) -> Result<UsageStats> {
        let mut totals = self.load()?;
        totals.merge(run);
        self.save(&totals)?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> UsageStats {
        UsageStats {
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_tokens: 10,
            cache_read_tokens: 5,
            total_cost_usd: 0.25,
            elapsed_secs: 60,
            iterations: 2,
        }
    }

    #[test]
    fn test_load_missing_is_zero() {
        let temp = TempDir::new().unwrap();
        let store = StatsStore::new(temp.path().join("stats.json"));
        assert_eq!(store.load().unwrap(), UsageStats::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = StatsStore::new(temp.path().join("nested/dir/stats.json"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
        assert!(!temp.path().join("nested/dir/stats.json.tmp").exists());
    }

    #[test]
    fn test_load_tolerates_missing_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stats.json");
        fs::write(&path, r#"{"input_tokens": 7}"#).unwrap();
        let stats = StatsStore::new(&path).load().unwrap();
        assert_eq!(stats.input_tokens, 7);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stats.json");
        fs::write(&path, "{not json").unwrap();
        assert!(StatsStore::new(&path).load().is_err());
    }

    #[test]
    fn test_accumulate_adds_to_existing_totals() {
        let temp = TempDir::new().unwrap();
        let store = StatsStore::new(temp.path().join("stats.json"));
        store.accumulate(&sample()).unwrap();
        let totals = store.accumulate(&sample()).unwrap();

        assert_eq!(totals.input_tokens, 200);
        assert_eq!(totals.iterations, 4);
        assert_eq!(totals.elapsed_secs, 120);
        assert!((totals.total_cost_usd - 0.5).abs() < 1e-9);
        assert_eq!(store.load().unwrap(), totals);
    }

    #[test]
    fn test_add_usage_and_total() {
        let mut stats = UsageStats::default();
        stats.add_usage(&Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_tokens: 3,
            cache_read_tokens: 4,
        });
        assert_eq!(stats.total_tokens(), 10);
    }
}
