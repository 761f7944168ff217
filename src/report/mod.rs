//! Merged per-epic summary document and its persistence.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::analysis::runner::AnalysisReport;
use crate::core::error::Result;

/// The merged analysis document written once per root issue.
#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub epic_id: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: AnalysisReport,
}

impl ProjectSummary {
    pub fn new(epic_id: impl Into<String>, report: AnalysisReport) -> Self {
        Self {
            epic_id: epic_id.into(),
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            report,
        }
    }

    /// Writes the summary as `<epic>_json_summary.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_json_summary.json", self.epic_id));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Summary for {} written to {}", self.epic_id, path.display());
        Ok(path)
    }
}
