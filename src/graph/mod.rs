//! Project dependency graph
//!
//! Nodes are project-relative file paths; edges are resolved local imports.
//! Centrality rewards files that are widely depended upon (in-degree,
//! weighted double) and files that integrate broadly (out-degree).

pub mod builder;

pub use builder::GraphBuilder;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
}

/// One resolved dependency between two project files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub strength: f32,
}

/// Per-file node: raw imports/exports plus resolved local links
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyNode {
    pub path: String,
    /// Import paths as written in the source
    pub imports: Vec<String>,
    /// Top-level exported symbol names
    pub exports: Vec<String>,
    /// Resolved local files this file imports
    pub dependencies: Vec<String>,
    /// Files that import this one (back-references)
    pub dependents: Vec<String>,
}

impl DependencyNode {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }
}

/// Import/export graph over the dominant language's files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: IndexMap<String, DependencyNode>,
    pub edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if absent
    pub fn ensure_node(&mut self, path: &str) -> &mut DependencyNode {
        self.nodes
            .entry(path.to_string())
            .or_insert_with(|| DependencyNode::new(path))
    }

    pub fn node(&self, path: &str) -> Option<&DependencyNode> {
        self.nodes.get(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record a resolved local import as a bidirectional link.
    /// Duplicate edges between the same pair are collapsed.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        {
            let node = self.ensure_node(from);
            if node.dependencies.iter().any(|d| d == to) {
                return;
            }
            node.dependencies.push(to.to_string());
        }
        self.ensure_node(to).dependents.push(from.to_string());
        self.edges.push(DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Import,
            strength: 1.0,
        });
    }

    /// Normalized connectedness of a file.
    ///
    /// `clamp01((2*in + out) / (3*(n-1)))`; defined as 0.5 for graphs with a
    /// single node and 0.0 for files absent from the graph.
    pub fn centrality(&self, path: &str) -> f32 {
        let n = self.nodes.len();
        let Some(node) = self.nodes.get(path) else {
            return 0.0;
        };
        if n <= 1 {
            return 0.5;
        }
        let in_degree = node.dependents.len() as f32;
        let out_degree = node.dependencies.len() as f32;
        let raw = (2.0 * in_degree + out_degree) / (3.0 * (n - 1) as f32);
        raw.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_nodes(paths: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for path in paths {
            graph.ensure_node(path);
        }
        graph
    }

    #[test]
    fn test_centrality_single_node() {
        let graph = graph_with_nodes(&["a.go"]);
        assert_eq!(graph.centrality("a.go"), 0.5);
    }

    #[test]
    fn test_centrality_absent_file() {
        let graph = graph_with_nodes(&["a.go", "b.go"]);
        assert_eq!(graph.centrality("missing.go"), 0.0);
    }

    #[test]
    fn test_edge_raises_both_endpoints() {
        let mut graph = graph_with_nodes(&["a.go", "b.go", "c.go"]);
        let a_before = graph.centrality("a.go");
        let b_before = graph.centrality("b.go");

        graph.add_edge("a.go", "b.go");

        // a gains out-degree, b gains (double-weighted) in-degree
        assert!(graph.centrality("a.go") > a_before);
        assert!(graph.centrality("b.go") > b_before);
        assert!(graph.centrality("b.go") > graph.centrality("a.go"));
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = graph_with_nodes(&["a.go", "b.go"]);
        graph.add_edge("a.go", "b.go");
        graph.add_edge("a.go", "b.go");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.node("b.go").unwrap().dependents.len(), 1);
    }

    #[test]
    fn test_centrality_is_clamped() {
        let mut graph = graph_with_nodes(&["hub.go", "a.go"]);
        for i in 0..10 {
            let path = format!("user{i}.go");
            graph.ensure_node(&path);
            graph.add_edge(&path, "hub.go");
        }
        let c = graph.centrality("hub.go");
        assert!(c > 0.0 && c <= 1.0);
    }

    #[test]
    fn test_self_edge_ignored() {
        let mut graph = graph_with_nodes(&["a.go"]);
        graph.add_edge("a.go", "a.go");
        assert!(graph.edges.is_empty());
    }
}
