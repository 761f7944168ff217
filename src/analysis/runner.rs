//! Orchestrates all analyzers over one project tree. A failing analyzer
//! contributes an error entry instead of aborting its siblings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::backlog::{self, BacklogAnalysis};
use crate::analysis::scope::{self, ScopeAnalysis};
use crate::analysis::status::{self, StatusAnalysis};
use crate::analysis::time_creep::{self, TimeCreepAnalysis};
use crate::llm::Summarizer;
use crate::tree::provider::ProjectData;

pub const STATUS_ANALYZER: &str = "StatusAnalyzer";
pub const BACKLOG_ANALYZER: &str = "BacklogAnalyzer";
pub const TIME_CREEP_ANALYZER: &str = "TimeCreepAnalyzer";
pub const SCOPE_ANALYZER: &str = "ScopeAnalyzer";

/// Results of one full analysis run, keyed by analyzer.
#[derive(Debug, Serialize, Default)]
pub struct AnalysisReport {
    pub status: Option<StatusAnalysis>,
    pub backlog: Option<BacklogAnalysis>,
    pub time_creep: Option<TimeCreepAnalysis>,
    pub scope: Option<ScopeAnalysis>,
    /// Analyzer name to failure reason, for analyzers that did not produce
    /// a result.
    pub errors: BTreeMap<String, String>,
}

pub struct AnalysisRunner<'a> {
    summarizer: &'a dyn Summarizer,
}

impl<'a> AnalysisRunner<'a> {
    pub fn new(summarizer: &'a dyn Summarizer) -> Self {
        Self { summarizer }
    }

    /// Runs every analyzer against `data`. Time-creep results are written
    /// back onto the graph nodes.
    pub async fn run(&self, data: &mut ProjectData, now: DateTime<Utc>) -> AnalysisReport {
        let mut report = AnalysisReport::default();

        info!("Running analysis for {}", data.epic_id);

        match status::analyze(data, now) {
            Ok(result) => report.status = Some(result),
            Err(e) => record_failure(&mut report, STATUS_ANALYZER, e),
        }

        match backlog::analyze(data, now) {
            Ok(result) => report.backlog = Some(result),
            Err(e) => record_failure(&mut report, BACKLOG_ANALYZER, e),
        }

        match time_creep::analyze(data, self.summarizer).await {
            Ok(result) => {
                time_creep::annotate_graph(&mut data.graph, &data.epic_id, &result);
                report.time_creep = Some(result);
            }
            Err(e) => record_failure(&mut report, TIME_CREEP_ANALYZER, e),
        }

        match scope::analyze(data) {
            Ok(result) => report.scope = Some(result),
            Err(e) => record_failure(&mut report, SCOPE_ANALYZER, e),
        }

        info!(
            epic = %data.epic_id,
            failed = report.errors.len(),
            "analysis run finished"
        );
        report
    }
}

fn record_failure(
    report: &mut AnalysisReport,
    analyzer: &str,
    error: crate::core::error::EpiscopeError,
) {
    warn!("{} failed: {}", analyzer, error);
    report.errors.insert(analyzer.to_string(), error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::IssueGraph;
    use crate::core::models::{Issue, IssueType};
    use crate::llm::StaticSummarizer;
    use crate::tree::BuiltTree;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_failed_analyzers_do_not_abort_siblings() {
        // An epic without stories or activities trips the status and
        // backlog preconditions; scope and time creep still run.
        let mut graph = IssueGraph::new();
        graph.add_node("BE-1");
        let mut data = ProjectData::from_built(
            "BE-1",
            BuiltTree {
                graph,
                issues: HashMap::from([(
                    "BE-1".to_string(),
                    Issue::new("BE-1", IssueType::BusinessEpic),
                )]),
                missing: vec![],
            },
        );

        let summarizer = StaticSummarizer::new("x");
        let report = AnalysisRunner::new(&summarizer)
            .run(&mut data, Utc::now())
            .await;

        assert!(report.status.is_none());
        assert!(report.backlog.is_none());
        assert!(report.errors.contains_key(STATUS_ANALYZER));
        assert!(report.errors.contains_key(BACKLOG_ANALYZER));

        assert!(report.time_creep.is_some());
        let scope = report.scope.expect("scope analyzer has no preconditions");
        assert_eq!(scope.total_issues, 1);
    }

    #[tokio::test]
    async fn test_time_creep_results_are_written_to_graph() {
        use crate::core::models::ActivityEvent;

        let mut graph = IssueGraph::new();
        graph.add_node("BE-1");
        let mut epic = Issue::new("BE-1", IssueType::BusinessEpic);
        epic.activities = vec![ActivityEvent {
            user: "tester".to_string(),
            field_name: "Target end".to_string(),
            old_value: None,
            new_value: Some("2025-06-30".to_string()),
            timestamp: chrono::DateTime::parse_from_rfc3339("2025-01-05T09:00:00+00:00")
                .unwrap(),
        }];
        let mut data = ProjectData::from_built(
            "BE-1",
            BuiltTree {
                graph,
                issues: HashMap::from([("BE-1".to_string(), epic)]),
                missing: vec![],
            },
        );

        let summarizer = StaticSummarizer::new("x");
        let report = AnalysisRunner::new(&summarizer)
            .run(&mut data, Utc::now())
            .await;

        assert!(report.time_creep.is_some());
        assert!(data.graph.attr("BE-1", "time_creep_events").is_some());
        assert!(data.graph.attr("BE-1", "llm_time_creep_summary").is_some());
    }
}
