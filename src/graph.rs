//! Graph handle - the engine's only view of the topology canvas
//!
//! The canvas itself lives elsewhere; the engine needs three operations from
//! it. `MemoryGraph` is a plain in-memory implementation for tooling and tests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Add;

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// Property bag carried by nodes and edges.
pub type Properties = Map<String, Value>;

pub trait GraphHandle {
    fn existing_node_ids(&self) -> BTreeSet<String>;
    fn add_node(&mut self, id: &str, props: Properties, position: Position);
    fn add_edge(&mut self, id: &str, source: &str, target: &str, props: Properties);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub props: Properties,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub props: Properties,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, GraphEdge>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl GraphHandle for MemoryGraph {
    fn existing_node_ids(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    fn add_node(&mut self, id: &str, props: Properties, position: Position) {
        self.nodes.insert(
            id.to_string(),
            GraphNode { id: id.to_string(), props, position },
        );
    }

    fn add_edge(&mut self, id: &str, source: &str, target: &str, props: Properties) {
        self.edges.insert(
            id.to_string(),
            GraphEdge {
                id: id.to_string(),
                source: source.to_string(),
                target: target.to_string(),
                props,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_graph_tracks_ids() {
        let mut graph = MemoryGraph::new();
        graph.add_node("a", Properties::new(), Position::new(0.0, 0.0));
        graph.add_node("b", Properties::new(), Position::new(10.0, 0.0));
        graph.add_edge("a:e1--b:e1", "a", "b", Properties::new());

        let ids = graph.existing_node_ids();
        assert!(ids.contains("a") && ids.contains("b"));
        assert_eq!(graph.edge("a:e1--b:e1").map(|e| e.target.as_str()), Some("b"));
    }

    #[test]
    fn test_position_add() {
        assert_eq!(Position::new(1.0, 2.0) + Position::new(3.0, 4.0), Position::new(4.0, 6.0));
    }
}
