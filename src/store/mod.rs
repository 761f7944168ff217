use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::core::config::EpiscopeConfig;
use crate::core::error::{EpiscopeError, Result};
use crate::core::models::Issue;

/// Durable per-issue storage: one JSON record per key, plus the
/// remediation log for keys that stayed unfetchable after the retry pass.
#[derive(Debug, Clone)]
pub struct IssueStore {
    dir: PathBuf,
    failed_log: PathBuf,
}

impl IssueStore {
    pub fn new(dir: impl Into<PathBuf>, failed_log: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            failed_log: failed_log.into(),
        }
    }

    pub fn open(config: &EpiscopeConfig) -> Self {
        Self::new(config.issues_dir(), config.failed_issues_log())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Loads a record. A missing file is a `MissingSource`, an unreadable
    /// or unparsable one a `MalformedRecord`; callers treat both as the
    /// same thing for traversal purposes.
    pub fn load(&self, key: &str) -> Result<Issue> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EpiscopeError::MissingSource(key.to_string()));
            }
            Err(e) => {
                return Err(EpiscopeError::MalformedRecord {
                    key: key.to_string(),
                    cause: e.to_string(),
                });
            }
        };
        serde_json::from_str(&raw).map_err(|e| EpiscopeError::MalformedRecord {
            key: key.to_string(),
            cause: e.to_string(),
        })
    }

    /// Persists a record, overwriting any previous version.
    pub fn save(&self, issue: &Issue) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&issue.key);
        let raw = serde_json::to_string_pretty(issue)?;
        std::fs::write(&path, raw)?;
        debug!("Stored issue record {}", issue.key);
        Ok(())
    }

    /// Freshness policy: a cached record is fresh if its status is the
    /// terminal "closed" state, or if the file is younger than
    /// `check_days`. Wall clock is read exactly once per decision.
    pub fn is_fresh(&self, key: &str, check_days: i64) -> bool {
        let issue = match self.load(key) {
            Ok(issue) => issue,
            Err(_) => return false,
        };

        if issue.is_closed() {
            debug!("Issue {key} is closed, cached record stays authoritative");
            return true;
        }

        let now = Utc::now();
        match file_modified_at(&self.path_for(key)) {
            Some(modified) => now - modified < Duration::days(check_days),
            None => false,
        }
    }

    /// Appends keys to the remediation log, skipping ones already listed.
    pub fn record_failures(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.failed_log.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut seen: HashSet<String> = match std::fs::read_to_string(&self.failed_log) {
            Ok(content) => content.lines().map(|l| l.trim().to_string()).collect(),
            Err(_) => HashSet::new(),
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failed_log)?;
        let mut written = 0usize;
        for key in keys {
            if seen.insert(key.clone()) {
                writeln!(file, "{key}")?;
                written += 1;
            }
        }
        if written > 0 {
            info!(
                "Recorded {written} permanently failed issue(s) in {}",
                self.failed_log.display()
            );
        }
        Ok(())
    }
}

fn file_modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified());
    match modified {
        Ok(time) => Some(DateTime::<Utc>::from(time)),
        Err(e) => {
            warn!("Could not read mtime of {}: {e}", path.display());
            None
        }
    }
}
