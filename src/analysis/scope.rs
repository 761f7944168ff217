//! Scope breakdown of a built tree: story points, per-Epic contents and the
//! distribution of contributing projects.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::error::Result;
use crate::core::models::{Issue, IssueType};
use crate::tree::provider::ProjectData;

#[derive(Debug, Clone, Serialize)]
pub struct EpicChild {
    pub key: String,
    pub issue_type: IssueType,
    pub story_points: Option<f64>,
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeAnalysis {
    pub total_issues: usize,
    pub total_epics: usize,
    pub total_stories: usize,
    pub total_story_points: f64,
    /// Stories and Bugs reachable from each Epic in the tree.
    pub epic_breakdown: BTreeMap<String, Vec<EpicChild>>,
    /// Issue counts per project key prefix, planning containers excluded.
    pub project_distribution: BTreeMap<String, usize>,
}

pub fn analyze(data: &ProjectData) -> Result<ScopeAnalysis> {
    let epics = data.keys_of_type(&IssueType::Epic);
    let stories = data.keys_of_type(&IssueType::Story);

    let total_story_points = stories
        .iter()
        .filter_map(|key| data.issues.get(*key))
        .map(Issue::points)
        .sum();

    let mut epic_breakdown = BTreeMap::new();
    for epic in &epics {
        let children: Vec<EpicChild> = data
            .graph
            .successors(epic)
            .iter()
            .filter_map(|key| data.issues.get(key))
            .filter(|issue| {
                matches!(issue.issue_type, IssueType::Story | IssueType::Bug)
            })
            .map(|issue| EpicChild {
                key: issue.key.clone(),
                issue_type: issue.issue_type.clone(),
                story_points: issue.story_points,
                resolution: issue
                    .resolution
                    .clone()
                    .unwrap_or_else(|| "N/A".to_string()),
            })
            .collect();
        epic_breakdown.insert((*epic).to_string(), children);
    }

    let root = data.root_node().to_string();
    let mut project_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for key in data.graph.nodes() {
        if key == root {
            continue;
        }
        if matches!(
            data.issue_type_of(key),
            Some(IssueType::BusinessEpic | IssueType::Bug)
        ) {
            continue;
        }
        let prefix = key.split('-').next().unwrap_or(key);
        *project_distribution.entry(prefix.to_string()).or_insert(0) += 1;
    }

    Ok(ScopeAnalysis {
        total_issues: data.graph.node_count(),
        total_epics: epics.len(),
        total_stories: stories.len(),
        total_story_points,
        epic_breakdown,
        project_distribution,
    })
}
