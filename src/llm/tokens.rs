//! Token accounting for LLM calls, with an optional JSONL audit trail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
struct TokenRecord<'a> {
    timestamp: String,
    model: &'a str,
    task: &'a str,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
}

/// Accumulates prompt/completion token counts across a run.
#[derive(Debug, Default)]
pub struct TokenUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    log_file: Option<PathBuf>,
}

impl TokenUsage {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        Self {
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            log_file,
        }
    }

    /// Adds one call's counts to the running totals and, when configured,
    /// appends a JSONL record. Logging failures are reported, not fatal.
    pub fn record(&self, model: &str, task: &str, input_tokens: u64, output_tokens: u64) {
        self.prompt_tokens.fetch_add(input_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(output_tokens, Ordering::Relaxed);

        let Some(path) = &self.log_file else {
            return;
        };
        let record = TokenRecord {
            timestamp: Utc::now().to_rfc3339(),
            model,
            task,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        };
        if let Err(e) = append_jsonl(path, &record) {
            warn!("Failed to write token usage record: {}", e);
        }
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

fn append_jsonl(path: &PathBuf, record: &TokenRecord<'_>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    writeln!(file, "{}", line)
}
