use std::collections::HashMap;

use tracing::{info, warn};

use crate::core::graph::IssueGraph;
use crate::core::models::{Issue, IssueType, TaggedActivity};
use crate::store::IssueStore;
use crate::tree::BuiltTree;

/// Central data hub for one root's analyses: the built graph, the issue
/// details of every node, and the globally time-sorted activity stream.
#[derive(Debug)]
pub struct ProjectData {
    pub epic_id: String,
    pub graph: IssueGraph,
    pub issues: HashMap<String, Issue>,
    /// All nodes' activities, tagged with their issue key and sorted
    /// ascending by timestamp. Ties keep the per-issue extraction order
    /// (the sort is stable).
    pub all_activities: Vec<TaggedActivity>,
}

impl ProjectData {
    /// Assembles the hub from a finished traversal.
    pub fn from_built(epic_id: impl Into<String>, built: BuiltTree) -> Self {
        let epic_id = epic_id.into();
        let all_activities = gather_activities(&built.graph, &built.issues);
        let data = Self {
            epic_id,
            graph: built.graph,
            issues: built.issues,
            all_activities,
        };
        info!(
            "Project data for '{}' initialized with {} issue(s) and {} activities",
            data.epic_id,
            data.graph.node_count(),
            data.all_activities.len()
        );
        data
    }

    /// Assembles the hub for a previously built graph by re-reading every
    /// node's record from the store. Nodes whose record is missing or
    /// unreadable keep their place in the graph but contribute no details
    /// or activities.
    pub fn load(epic_id: impl Into<String>, graph: IssueGraph, store: &IssueStore) -> Self {
        let epic_id = epic_id.into();
        let mut issues = HashMap::new();
        for key in graph.nodes() {
            match store.load(key) {
                Ok(issue) => {
                    issues.insert(key.to_string(), issue);
                }
                Err(e) => {
                    warn!("Record for issue '{key}' not readable: {e}");
                }
            }
        }
        let all_activities = gather_activities(&graph, &issues);
        Self {
            epic_id,
            graph,
            issues,
            all_activities,
        }
    }

    /// The in-degree-0 node of the graph, falling back to the epic id.
    pub fn root_node(&self) -> &str {
        self.graph.root().unwrap_or(&self.epic_id)
    }

    pub fn is_valid(&self) -> bool {
        !self.graph.is_empty()
    }

    pub fn issue_type_of(&self, key: &str) -> Option<&IssueType> {
        self.issues.get(key).map(|i| &i.issue_type)
    }

    /// Keys of all issues of one type, in graph insertion order.
    pub fn keys_of_type(&self, issue_type: &IssueType) -> Vec<&str> {
        self.graph
            .nodes()
            .filter(|k| self.issue_type_of(k) == Some(issue_type))
            .collect()
    }
}

fn gather_activities(graph: &IssueGraph, issues: &HashMap<String, Issue>) -> Vec<TaggedActivity> {
    let mut all: Vec<TaggedActivity> = Vec::new();
    for key in graph.nodes() {
        let Some(issue) = issues.get(key) else {
            continue;
        };
        for event in &issue.activities {
            all.push(TaggedActivity {
                issue_key: key.to_string(),
                event: event.clone(),
            });
        }
    }
    all.sort_by_key(|a| a.event.timestamp);
    all
}
