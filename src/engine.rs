//! Instantiation Engine - Single Entry Point
//!
//! Expands one template into graph mutations at a drop position. Pure in
//! memory: no disk, no retained state, no errors raised. Anything wrong with
//! the template degrades to fewer elements plus a diagnostic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::graph::{GraphHandle, Position, Properties};
use crate::naming::unique_node_id;
use crate::templates::{split_endpoint, NodeTemplate, StackTemplate, Template, TemplateDescriptor};

/// Role given to node-template instances that do not declare one.
pub const DEFAULT_ROLE: &str = "router";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Stack members per grid row. Zero is treated as one.
    pub nodes_per_row: usize,
    /// Distance between neighbouring grid cells, both axes.
    pub spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            nodes_per_row: 3,
            spacing: 120.0,
        }
    }
}

impl LayoutConfig {
    /// Offset of the `index`-th stack member from the drop position.
    pub fn cell_offset(&self, index: usize) -> Position {
        let per_row = self.nodes_per_row.max(1);
        let row = index / per_row;
        let column = index % per_row;
        Position::new(column as f64 * self.spacing, row as f64 * self.spacing)
    }
}

/// What one instantiation added to the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instantiation {
    pub added_node_ids: BTreeSet<String>,
    pub added_edge_ids: BTreeSet<String>,
    pub diagnostics: Vec<String>,
}

impl Instantiation {
    pub fn is_empty(&self) -> bool {
        self.added_node_ids.is_empty() && self.added_edge_ids.is_empty()
    }

    fn diagnose(&mut self, message: String) {
        warn!("{}", message);
        self.diagnostics.push(message);
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstantiationEngine {
    layout: LayoutConfig,
}

impl InstantiationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Realize `template` on `graph` at `position`.
    pub fn instantiate<G: GraphHandle + ?Sized>(
        &self,
        template: &Template,
        position: Position,
        graph: &mut G,
    ) -> Instantiation {
        let mut out = Instantiation::default();
        let mut taken = graph.existing_node_ids();

        match &template.descriptor {
            TemplateDescriptor::Node(node) => {
                self.place_node(node, position, graph, &mut taken, &mut out)
            }
            TemplateDescriptor::Stack(stack) => {
                self.place_stack(stack, position, graph, &mut taken, &mut out)
            }
        }

        debug!(
            "Instantiated '{}': {} nodes, {} edges",
            template.id,
            out.added_node_ids.len(),
            out.added_edge_ids.len()
        );
        out
    }

    /// Look `id` up in `catalog` and instantiate it. An unknown id places nothing.
    pub fn instantiate_by_id<G: GraphHandle + ?Sized>(
        &self,
        catalog: &Catalog,
        id: &str,
        position: Position,
        graph: &mut G,
    ) -> Instantiation {
        match catalog.get(id) {
            Some(template) => self.instantiate(template, position, graph),
            None => {
                let mut out = Instantiation::default();
                out.diagnose(format!("Template '{}' is not in the catalog", id));
                out
            }
        }
    }

    fn place_node<G: GraphHandle + ?Sized>(
        &self,
        node: &NodeTemplate,
        position: Position,
        graph: &mut G,
        taken: &mut BTreeSet<String>,
        out: &mut Instantiation,
    ) {
        let id = unique_node_id(&node.name, |c| taken.contains(c));
        graph.add_node(&id, node_properties(node), position);
        debug!("Added node '{}' at ({}, {})", id, position.x, position.y);
        taken.insert(id.clone());
        out.added_node_ids.insert(id);
    }

    fn place_stack<G: GraphHandle + ?Sized>(
        &self,
        stack: &StackTemplate,
        base: Position,
        graph: &mut G,
        taken: &mut BTreeSet<String>,
        out: &mut Instantiation,
    ) {
        let Some(nodes) = &stack.topology.nodes else {
            out.diagnose(format!(
                "Stack '{}' has no topology.nodes mapping; nothing placed",
                stack.name
            ));
            return;
        };

        // Stack-local key -> graph node id. Dropped when this call returns.
        let mut resolved: HashMap<&str, String> = HashMap::with_capacity(nodes.len());

        for (index, (key, config)) in nodes.iter().enumerate() {
            let props = match config {
                Value::Object(map) => map.clone(),
                Value::Null => Map::new(),
                _ => {
                    out.diagnose(format!(
                        "Stack '{}' node '{}' has a non-mapping configuration; placed without properties",
                        stack.name, key
                    ));
                    Map::new()
                }
            };

            let position = base + self.layout.cell_offset(index);
            let id = unique_node_id(key, |c| taken.contains(c));
            graph.add_node(&id, props, position);
            debug!("Added stack node '{}' as '{}' at ({}, {})", key, id, position.x, position.y);

            taken.insert(id.clone());
            out.added_node_ids.insert(id.clone());
            resolved.insert(key.as_str(), id);
        }

        for (index, link) in stack.topology.links.iter().flatten().enumerate() {
            let [a, b] = link.endpoints.as_slice() else {
                debug!("Skipping link #{} of '{}': expected 2 endpoints", index, stack.name);
                continue;
            };
            let ends = split_endpoint(a).zip(split_endpoint(b));
            let Some(((a_key, a_iface), (b_key, b_iface))) = ends else {
                debug!("Skipping link #{} of '{}': malformed endpoint", index, stack.name);
                continue;
            };
            let (Some(source), Some(target)) = (resolved.get(a_key), resolved.get(b_key)) else {
                debug!("Skipping link #{} of '{}': unknown node", index, stack.name);
                continue;
            };

            let edge_id = format!("{}:{}--{}:{}", source, a_iface, target, b_iface);
            if out.added_edge_ids.contains(&edge_id) {
                debug!("Skipping duplicate link '{}'", edge_id);
                continue;
            }

            let mut props = Properties::new();
            props.insert("sourceEndpoint".to_string(), Value::from(a_iface));
            props.insert("targetEndpoint".to_string(), Value::from(b_iface));
            graph.add_edge(&edge_id, source, target, props);
            debug!("Added edge '{}'", edge_id);
            out.added_edge_ids.insert(edge_id);
        }
    }
}

/// Copy the fields a node template declares. Absent fields stay absent;
/// `role` falls back to `DEFAULT_ROLE`.
fn node_properties(node: &NodeTemplate) -> Properties {
    let mut props = Properties::new();
    props.insert("kind".to_string(), Value::from(node.kind.as_str()));
    put(&mut props, "image", &node.image);
    put(&mut props, "type", &node.node_type);
    put(&mut props, "group", &node.group);
    props.insert(
        "role".to_string(),
        Value::from(node.role.as_deref().unwrap_or(DEFAULT_ROLE)),
    );
    put(&mut props, "env", &node.env);
    put(&mut props, "cmd", &node.cmd);
    put(&mut props, "exec", &node.exec);
    put(&mut props, "binds", &node.binds);
    put(&mut props, "ports", &node.ports);
    put(&mut props, "labels", &node.labels);
    props
}

fn put<T: Serialize>(props: &mut Properties, key: &str, value: &Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            props.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::templates::{decode_descriptor, NodeTemplate};

    fn node_template(name: &str) -> Template {
        let mut node = NodeTemplate::new(name, "nokia_srlinux");
        node.image = Some("ghcr.io/nokia/srlinux".to_string());
        Template::new("t", TemplateDescriptor::Node(node))
    }

    fn stack_template(yaml: &str) -> Template {
        Template::new("s", decode_descriptor(yaml).unwrap())
    }

    #[test]
    fn test_node_props_omit_absent_fields() {
        let mut graph = MemoryGraph::new();
        let out = InstantiationEngine::new().instantiate(
            &node_template("SR Linux"),
            Position::new(5.0, 7.0),
            &mut graph,
        );

        assert_eq!(out.added_node_ids.iter().collect::<Vec<_>>(), vec!["srlinux"]);
        let node = graph.node("srlinux").unwrap();
        assert_eq!(node.position, Position::new(5.0, 7.0));
        assert_eq!(node.props["kind"], "nokia_srlinux");
        assert_eq!(node.props["role"], DEFAULT_ROLE);
        assert!(!node.props.contains_key("group"));
        assert!(!node.props.contains_key("env"));
    }

    #[test]
    fn test_declared_role_is_kept() {
        let mut node = NodeTemplate::new("Host", "linux");
        node.role = Some("client".to_string());
        let template = Template::new("h", TemplateDescriptor::Node(node));
        let mut graph = MemoryGraph::new();
        InstantiationEngine::new().instantiate(&template, Position::default(), &mut graph);
        assert_eq!(graph.node("host").unwrap().props["role"], "client");
    }

    #[test]
    fn test_grid_wraps_rows() {
        let layout = LayoutConfig { nodes_per_row: 2, spacing: 50.0 };
        assert_eq!(layout.cell_offset(0), Position::new(0.0, 0.0));
        assert_eq!(layout.cell_offset(1), Position::new(50.0, 0.0));
        assert_eq!(layout.cell_offset(2), Position::new(0.0, 50.0));
        let degenerate = LayoutConfig { nodes_per_row: 0, spacing: 10.0 };
        assert_eq!(degenerate.cell_offset(2), Position::new(0.0, 20.0));
    }

    #[test]
    fn test_stack_ids_avoid_existing_nodes() {
        let mut graph = MemoryGraph::new();
        graph.add_node("a", Properties::new(), Position::default());

        let stack = stack_template(
            "name: S\ntopology:\n  name: s\n  nodes: { a: { kind: linux }, b: { kind: linux } }\n  links:\n    - endpoints: [\"a:eth1\", \"b:eth1\"]\n",
        );
        let out = InstantiationEngine::new().instantiate(&stack, Position::default(), &mut graph);

        assert!(out.added_node_ids.contains("a1"));
        assert!(out.added_node_ids.contains("b"));
        let edge = graph.edge("a1:eth1--b:eth1").unwrap();
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("a1", "b"));
    }

    #[test]
    fn test_missing_nodes_mapping_places_nothing() {
        let stack = stack_template("name: Empty\ntopology:\n  name: empty\n");
        let mut graph = MemoryGraph::new();
        let out = InstantiationEngine::new().instantiate(&stack, Position::default(), &mut graph);

        assert!(out.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_malformed_links_are_skipped_quietly() {
        let stack = stack_template(
            r#"
name: Messy
topology:
  name: messy
  nodes: { a: {}, b: {} }
  links:
    - endpoints: ["a:eth1"]
    - endpoints: ["a-eth2", "b:eth2"]
    - endpoints: ["a:eth3", "b:eth3"]
    - endpoints: ["a:eth3", "b:eth3"]
"#,
        );
        let mut graph = MemoryGraph::new();
        let out = InstantiationEngine::new().instantiate(&stack, Position::default(), &mut graph);

        assert_eq!(out.added_node_ids.len(), 2);
        assert_eq!(out.added_edge_ids.len(), 1);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_catalog_id() {
        let mut graph = MemoryGraph::new();
        let out = InstantiationEngine::new().instantiate_by_id(
            &Catalog::default(),
            "nope",
            Position::default(),
            &mut graph,
        );
        assert!(out.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
    }
}
