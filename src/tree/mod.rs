pub mod provider;

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::core::error::{EpiscopeError, Result};
use crate::core::graph::IssueGraph;
use crate::core::models::{Issue, IssueType, RelationMap, RelationType};
use crate::fetch::IssueFetcher;

/// Pop discipline of the work list. Graph membership is identical either
/// way; the knob exists so that property can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    #[default]
    DepthFirst,
    BreadthFirst,
}

/// Result of one traversal: the discovered graph plus the keys that stayed
/// unfetchable even after the retry pass.
#[derive(Debug)]
pub struct BuiltTree {
    pub graph: IssueGraph,
    pub issues: HashMap<String, Issue>,
    pub missing: Vec<String>,
}

/// Builds an [`IssueGraph`] from a root key by following whitelisted
/// relations through an [`IssueFetcher`].
///
/// The walk is strictly iterative: an explicit work list with a `seen` set
/// (pushed at most once) and a separate `expanded` set (relations examined
/// at most once) keeps cycles and duplicate references harmless. A child
/// that cannot be fetched never aborts the traversal; its edge is parked
/// and retried once after the main walk.
pub struct TreeBuilder<'a, F: IssueFetcher> {
    fetcher: &'a F,
    whitelist: RelationMap,
    include_rejected: bool,
    order: TraversalOrder,
}

struct WalkState {
    graph: IssueGraph,
    issues: HashMap<String, Issue>,
    seen: HashSet<String>,
    expanded: HashSet<String>,
    work: VecDeque<String>,
    failed_edges: Vec<(String, String, RelationType)>,
}

impl<'a, F: IssueFetcher> TreeBuilder<'a, F> {
    pub fn new(fetcher: &'a F, whitelist: RelationMap) -> Self {
        Self {
            fetcher,
            whitelist,
            include_rejected: false,
            order: TraversalOrder::DepthFirst,
        }
    }

    pub fn include_rejected(mut self, include: bool) -> Self {
        self.include_rejected = include;
        self
    }

    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    pub async fn build(&self, root_key: &str) -> Result<BuiltTree> {
        let root = self.fetch_root(root_key).await?;

        if root.issue_type.is_unknown() {
            return Err(EpiscopeError::InvalidRoot {
                key: root_key.to_string(),
                reason: "empty or unrecognized issue type".to_string(),
            });
        }
        if !self.include_rejected && root.has_excluded_resolution() {
            return Err(EpiscopeError::InvalidRoot {
                key: root_key.to_string(),
                reason: format!(
                    "excluded resolution '{}'",
                    root.resolution.as_deref().unwrap_or_default()
                ),
            });
        }

        let mut state = WalkState {
            graph: IssueGraph::new(),
            issues: HashMap::new(),
            seen: HashSet::new(),
            expanded: HashSet::new(),
            work: VecDeque::new(),
            failed_edges: Vec::new(),
        };
        state.graph.add_node(root_key);
        state.issues.insert(root_key.to_string(), root);
        state.seen.insert(root_key.to_string());
        state.work.push_back(root_key.to_string());

        self.walk(&mut state).await;

        // second pass: one retry per distinct failed key, then expand
        // whatever the retries brought in; failures surfacing below a
        // retried subtree are terminal
        let mut missing = Vec::new();
        let parked = std::mem::take(&mut state.failed_edges);
        if !parked.is_empty() {
            info!(
                "Retrying {} unfetched edge(s) below root {root_key}",
                parked.len()
            );
            let mut grouped: Vec<(String, Vec<(String, RelationType)>)> = Vec::new();
            for (parent, child, relation) in parked {
                match grouped.iter_mut().find(|(key, _)| *key == child) {
                    Some((_, edges)) => edges.push((parent, relation)),
                    None => grouped.push((child, vec![(parent, relation)])),
                }
            }

            for (child_key, edges) in grouped {
                match self.fetcher.fetch(&child_key).await {
                    Ok(child) => {
                        for (parent_key, relation) in edges {
                            self.admit_child(&mut state, &parent_key, &child_key, relation, &child);
                        }
                    }
                    Err(e) => {
                        warn!("Issue {child_key} still unfetchable after retry: {e}");
                        missing.push(child_key);
                    }
                }
            }
            self.walk(&mut state).await;
            for (_, child, _) in std::mem::take(&mut state.failed_edges) {
                if !missing.contains(&child) {
                    missing.push(child);
                }
            }
        }

        info!(
            "Tree for {root_key} built: {} node(s), {} edge(s), {} missing",
            state.graph.node_count(),
            state.graph.edge_count(),
            missing.len()
        );

        Ok(BuiltTree {
            graph: state.graph,
            issues: state.issues,
            missing,
        })
    }

    async fn fetch_root(&self, root_key: &str) -> Result<Issue> {
        self.fetcher.fetch(root_key).await.map_err(|e| match e {
            EpiscopeError::MissingSource(_) | EpiscopeError::MalformedRecord { .. } => {
                EpiscopeError::InvalidRoot {
                    key: root_key.to_string(),
                    reason: format!("root record could not be fetched: {e}"),
                }
            }
            other => other,
        })
    }

    async fn walk(&self, state: &mut WalkState) {
        while let Some(parent_key) = self.take_next(state) {
            if !state.expanded.insert(parent_key.clone()) {
                continue;
            }
            let parent = match state.issues.get(&parent_key) {
                Some(parent) => parent.clone(),
                None => continue,
            };
            debug!(
                "Expanding {parent_key} (type: {})",
                parent.issue_type
            );
            for (child_key, relation) in self.outgoing_edges(&parent) {
                self.follow_edge(state, &parent_key, &child_key, relation)
                    .await;
            }
        }
    }

    fn take_next(&self, state: &mut WalkState) -> Option<String> {
        match self.order {
            TraversalOrder::DepthFirst => state.work.pop_back(),
            TraversalOrder::BreadthFirst => state.work.pop_front(),
        }
    }

    /// Candidate children of a node: whitelisted relations, plus the
    /// structurally distinct "issues in epic" list on Epics, which counts
    /// as an implicit `issue_in_epic` edge.
    fn outgoing_edges(&self, parent: &Issue) -> Vec<(String, RelationType)> {
        let allowed = self.whitelist.allowed_for(&parent.issue_type);
        let mut edges: Vec<(String, RelationType)> = parent
            .relations
            .iter()
            .filter(|r| allowed.contains(&r.relation_type))
            .map(|r| (r.target_key.clone(), r.relation_type.clone()))
            .collect();

        if parent.issue_type == IssueType::Epic {
            for key in &parent.issues_in_epic {
                edges.push((key.clone(), RelationType::IssueInEpic));
            }
        }
        edges
    }

    async fn follow_edge(
        &self,
        state: &mut WalkState,
        parent_key: &str,
        child_key: &str,
        relation: RelationType,
    ) {
        let child = match self.fetcher.fetch(child_key).await {
            Ok(child) => child,
            Err(e) => {
                warn!("Child {child_key} of {parent_key} not fetchable: {e}");
                state
                    .failed_edges
                    .push((parent_key.to_string(), child_key.to_string(), relation));
                return;
            }
        };

        self.admit_child(state, parent_key, child_key, relation, &child);
    }

    /// Adds a fetched child (node + edge) unless its resolution excludes
    /// it; pushes it onto the work list the first time it is seen.
    fn admit_child(
        &self,
        state: &mut WalkState,
        parent_key: &str,
        child_key: &str,
        relation: RelationType,
        child: &Issue,
    ) {
        if !self.include_rejected && child.has_excluded_resolution() {
            debug!(
                "Skipping {child_key}: resolution '{}' is excluded",
                child.resolution.as_deref().unwrap_or_default()
            );
            return;
        }

        state.graph.add_edge(parent_key, child_key, relation);
        state
            .issues
            .entry(child_key.to_string())
            .or_insert_with(|| child.clone());
        if state.seen.insert(child_key.to_string()) {
            state.work.push_back(child_key.to_string());
        }
    }
}
