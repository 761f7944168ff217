use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Runtime configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpiscopeConfig {
    /// Base data directory; issue records and summaries live below it.
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,

    /// A cached issue record younger than this many days is considered
    /// fresh and is not re-fetched.
    pub check_days: i64,
    /// Follow children whose resolution is Rejected/Withdrawn.
    pub include_rejected: bool,
    /// Capacity of the per-run issue memo.
    pub memo_size: usize,

    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
}

impl EpiscopeConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            logs_dir: data_dir.join("logs"),
            data_dir,
            check_days: crate::DEFAULT_CHECK_DAYS,
            include_rejected: false,
            memo_size: crate::DEFAULT_MEMO_SIZE,
            llm_base_url: crate::DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: crate::DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_temperature: 0.2,
            llm_max_tokens: 10_000,
        }
    }

    /// Directory holding one JSON record per issue key.
    pub fn issues_dir(&self) -> PathBuf {
        self.data_dir.join("issues")
    }

    /// Directory for the merged per-epic summary documents.
    pub fn summary_dir(&self) -> PathBuf {
        self.data_dir.join("json_summary")
    }

    /// Keys that still failed after the retry pass end up here.
    pub fn failed_issues_log(&self) -> PathBuf {
        self.logs_dir.join("failed_issues.log")
    }

    pub fn token_log_file(&self) -> PathBuf {
        self.logs_dir.join("token_usage.jsonl")
    }

    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("EPISCOPE_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        );

        if let Ok(dir) = std::env::var("EPISCOPE_LOGS_DIR") {
            config.logs_dir = PathBuf::from(dir);
        }
        if let Some(days) = read_env_parsed("EPISCOPE_CHECK_DAYS") {
            config.check_days = days;
        }
        if let Some(flag) = read_env_parsed::<bool>("EPISCOPE_INCLUDE_REJECTED") {
            config.include_rejected = flag;
        }
        if let Some(size) = read_env_parsed("EPISCOPE_MEMO_SIZE") {
            config.memo_size = size;
        }
        if let Ok(url) = std::env::var("EPISCOPE_LLM_BASE_URL") {
            config.llm_base_url = url;
        }
        if let Ok(model) = std::env::var("EPISCOPE_LLM_MODEL") {
            config.llm_model = model;
        }
        if let Ok(key) = std::env::var("EPISCOPE_LLM_API_KEY") {
            config.llm_api_key = Some(key);
        }
        if let Some(temperature) = read_env_parsed("EPISCOPE_LLM_TEMPERATURE") {
            config.llm_temperature = temperature;
        }
        if let Some(max_tokens) = read_env_parsed("EPISCOPE_LLM_MAX_TOKENS") {
            config.llm_max_tokens = max_tokens;
        }

        config
    }

    /// Creates the directories a run writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.issues_dir(),
            self.summary_dir(),
            self.logs_dir.clone(),
        ] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for EpiscopeConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = EpiscopeConfig::new("/tmp/episcope-data");
        assert_eq!(config.issues_dir(), PathBuf::from("/tmp/episcope-data/issues"));
        assert_eq!(
            config.failed_issues_log(),
            PathBuf::from("/tmp/episcope-data/logs/failed_issues.log")
        );
        assert!(!config.include_rejected);
        assert_eq!(config.check_days, crate::DEFAULT_CHECK_DAYS);
    }
}
