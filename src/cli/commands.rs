//! CLI argument definitions using clap.

use clap::Parser;
use eyre::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;

/// ralphloop - run an AI agent CLI in a pausable, resumable loop
#[derive(Parser, Debug)]
#[command(name = "ralphloop")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Controls (type + Enter while running): p pause, r resume, +N/-N/=N resize, w wake, s status, q quit")]
pub struct Cli {
    /// File containing the prompt sent to every iteration
    pub prompt_file: Option<PathBuf>,

    /// Prompt text (instead of a prompt file)
    #[arg(long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Number of iterations
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Pause between iterations in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// Agent binary to run
    #[arg(long)]
    pub command: Option<String>,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Apply flag overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(n) = self.iterations {
            config.engine.iterations = n;
        }
        if let Some(ms) = self.sleep_ms {
            config.engine.sleep_ms = ms;
        }
        if let Some(command) = &self.command {
            config.agent.command = command.clone();
        }
    }

    /// Prompt text from --prompt or the prompt file
    pub fn read_prompt(&self) -> Result<String> {
        let prompt = match (&self.prompt, &self.prompt_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => {
                fs::read_to_string(path).context(format!("Failed to read prompt file {}", path.display()))?
            }
            (None, None) => eyre::bail!("no prompt given: pass a PROMPT_FILE or --prompt"),
        };
        if prompt.trim().is_empty() {
            eyre::bail!("prompt is empty");
        }
        Ok(prompt)
    }
}
