use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::core::models::RelationType;

/// One discovered `(parent, child)` pair with its relation label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub parent: String,
    pub child: String,
    pub relation: RelationType,
}

/// Directed graph of issue keys produced by the tree builder.
///
/// Nodes keep insertion order and carry an attribute bag for analyzer
/// results. Repeated `(parent, child)` pairs collapse into one edge; the
/// last relation label wins. Cycle safety lives in the builder, not here.
#[derive(Debug, Clone, Default)]
pub struct IssueGraph {
    order: Vec<String>,
    attrs: HashMap<String, BTreeMap<String, Value>>,
    children: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(String, String), usize>,
}

impl IssueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, key: &str) {
        if !self.attrs.contains_key(key) {
            self.order.push(key.to_string());
            self.attrs.insert(key.to_string(), BTreeMap::new());
            self.children.insert(key.to_string(), Vec::new());
            self.in_degree.insert(key.to_string(), 0);
        }
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn add_edge(&mut self, parent: &str, child: &str, relation: RelationType) {
        self.add_node(parent);
        self.add_node(child);

        let pair = (parent.to_string(), child.to_string());
        if let Some(&idx) = self.edge_index.get(&pair) {
            self.edges[idx].relation = relation;
            return;
        }

        self.edge_index.insert(pair, self.edges.len());
        self.edges.push(GraphEdge {
            parent: parent.to_string(),
            child: child.to_string(),
            relation,
        });
        self.children
            .get_mut(parent)
            .map(|c| c.push(child.to_string()));
        *self.in_degree.entry(child.to_string()).or_insert(0) += 1;
    }

    pub fn successors(&self, key: &str) -> &[String] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_degree(&self, key: &str) -> usize {
        self.in_degree.get(key).copied().unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node keys in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// First node with no incoming edge, used to re-derive the epic id.
    pub fn root(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|k| self.in_degree(k) == 0)
            .map(String::as_str)
    }

    /// Attaches an analyzer result to a node. Returns false if the node is
    /// not in the graph.
    pub fn set_attr(&mut self, key: &str, name: &str, value: Value) -> bool {
        match self.attrs.get_mut(key) {
            Some(bag) => {
                bag.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn attr(&self, key: &str, name: &str) -> Option<&Value> {
        self.attrs.get(key).and_then(|bag| bag.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_creates_nodes() {
        let mut graph = IssueGraph::new();
        graph.add_edge("A", "B", RelationType::Child);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.successors("A"), &["B".to_string()]);
        assert!(graph.successors("B").is_empty());
    }

    #[test]
    fn test_duplicate_edge_collapses() {
        let mut graph = IssueGraph::new();
        graph.add_edge("A", "B", RelationType::Child);
        graph.add_edge("A", "B", RelationType::Linked);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].relation, RelationType::Linked);
        assert_eq!(graph.in_degree("B"), 1);
    }

    #[test]
    fn test_root_is_first_in_degree_zero() {
        let mut graph = IssueGraph::new();
        graph.add_edge("ROOT-1", "A", RelationType::RealizedBy);
        graph.add_edge("ROOT-1", "B", RelationType::Child);
        graph.add_edge("A", "B", RelationType::Linked);
        assert_eq!(graph.root(), Some("ROOT-1"));
    }

    #[test]
    fn test_attrs_bag() {
        let mut graph = IssueGraph::new();
        graph.add_node("A");
        assert!(graph.set_attr("A", "note", serde_json::json!("hello")));
        assert!(!graph.set_attr("missing", "note", serde_json::json!(1)));
        assert_eq!(graph.attr("A", "note"), Some(&serde_json::json!("hello")));
        assert_eq!(graph.attr("A", "other"), None);
    }
}
