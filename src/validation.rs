//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy: errors block create/update/import and skip the entry on load;
//! warnings are recorded and never block. Link problems are always warnings
//! because the engine places the valid subset of a stack regardless.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::templates::{split_endpoint, NodeTemplate, StackTemplate, TemplateDescriptor};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub remediation: Option<String>,
}

impl ValidationViolation {
    fn error(rule: &str, message: String, remediation: &str) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Error,
            message,
            remediation: Some(remediation.to_string()),
        }
    }

    fn warning(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Warning,
            message,
            remediation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub template_name: String,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Error)
    }

    /// All error messages joined into one line.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation>;
}

/// Join `rel` under `base`, refusing anything that could land outside it.
pub fn safe_join(base: &Path, rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    let mut joined = base.to_path_buf();
    let mut pushed = false;

    for component in rel_path.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    pushed.then_some(joined)
}

fn is_safe_relative(rel: &str) -> bool {
    safe_join(Path::new(""), rel).is_some()
}

// --- Concrete Rules ---

pub struct NameRule;

impl ValidationRule for NameRule {
    fn name(&self) -> &'static str { "name" }

    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation> {
        if descriptor.name().trim().is_empty() {
            vec![ValidationViolation::error(
                self.name(),
                "Template name is empty".to_string(),
                "Give the template a name; its id is derived from it",
            )]
        } else {
            vec![]
        }
    }
}

pub struct NodeKindRule;

impl ValidationRule for NodeKindRule {
    fn name(&self) -> &'static str { "node_kind" }

    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation> {
        match descriptor {
            TemplateDescriptor::Node(NodeTemplate { kind, .. }) if kind.trim().is_empty() => {
                vec![ValidationViolation::error(
                    self.name(),
                    "Node template kind is empty".to_string(),
                    "Set `kind` to a device kind such as nokia_srlinux or linux",
                )]
            }
            _ => vec![],
        }
    }
}

pub struct ContentPathRule;

impl ValidationRule for ContentPathRule {
    fn name(&self) -> &'static str { "content_path" }

    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation> {
        let paths: Vec<&str> = match descriptor {
            TemplateDescriptor::Node(node) => {
                node.startup_config_rel_path.as_deref().into_iter().collect()
            }
            TemplateDescriptor::Stack(stack) => stack
                .configs
                .as_ref()
                .map(|configs| configs.keys().map(String::as_str).collect())
                .unwrap_or_default(),
        };

        paths
            .into_iter()
            .filter(|p| !is_safe_relative(p))
            .map(|p| {
                ValidationViolation::error(
                    self.name(),
                    format!("Path '{}' escapes the template directory", p),
                    "Use a relative path without `..` components",
                )
            })
            .collect()
    }
}

pub struct StackNodeShapeRule;

impl ValidationRule for StackNodeShapeRule {
    fn name(&self) -> &'static str { "stack_nodes" }

    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation> {
        let TemplateDescriptor::Stack(StackTemplate { topology, .. }) = descriptor else {
            return vec![];
        };
        let Some(nodes) = &topology.nodes else {
            return vec![ValidationViolation::warning(
                self.name(),
                "Stack has no `topology.nodes` mapping; it will place nothing".to_string(),
            )];
        };

        nodes
            .iter()
            .filter(|(_, config)| !(config.is_object() || config.is_null()))
            .map(|(key, _)| {
                ValidationViolation::error(
                    self.name(),
                    format!("Configuration of stack node '{}' is not a mapping", key),
                    "Write each stack node as a mapping of node properties",
                )
            })
            .collect()
    }
}

pub struct LinkShapeRule;

impl ValidationRule for LinkShapeRule {
    fn name(&self) -> &'static str { "stack_links" }

    fn validate(&self, descriptor: &TemplateDescriptor) -> Vec<ValidationViolation> {
        let TemplateDescriptor::Stack(StackTemplate { topology, .. }) = descriptor else {
            return vec![];
        };
        let Some(links) = &topology.links else {
            return vec![];
        };
        let empty = BTreeMap::new();
        let nodes = topology.nodes.as_ref().unwrap_or(&empty);

        let mut violations = vec![];
        for (index, link) in links.iter().enumerate() {
            if link.endpoints.len() != 2 {
                violations.push(ValidationViolation::warning(
                    self.name(),
                    format!("Link #{} has {} endpoints, expected 2", index, link.endpoints.len()),
                ));
                continue;
            }
            for endpoint in &link.endpoints {
                match split_endpoint(endpoint) {
                    None => violations.push(ValidationViolation::warning(
                        self.name(),
                        format!("Link #{} endpoint '{}' is not of the form node:interface", index, endpoint),
                    )),
                    Some((node, _)) if !nodes.contains_key(node) => {
                        violations.push(ValidationViolation::warning(
                            self.name(),
                            format!("Link #{} references unknown node '{}'", index, node),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }
        violations
    }
}

/// Validator orchestrates rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule + Send + Sync>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(NameRule),
                Box::new(NodeKindRule),
                Box::new(ContentPathRule),
                Box::new(StackNodeShapeRule),
                Box::new(LinkShapeRule),
            ],
        }
    }

    pub fn validate(&self, descriptor: &TemplateDescriptor) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(descriptor))
            .collect();

        ValidationResult {
            valid: !violations.iter().any(|v| v.severity == ViolationSeverity::Error),
            template_name: descriptor.name().to_string(),
            violations,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{decode_descriptor, NodeTemplate};

    #[test]
    fn test_empty_kind_is_error() {
        let desc = TemplateDescriptor::Node(NodeTemplate::new("Blank", "  "));
        let result = Validator::new().validate(&desc);
        assert!(!result.valid);
        assert!(result.error_summary().contains("node_kind"));
    }

    #[test]
    fn test_traversal_is_error() {
        let mut node = NodeTemplate::new("Srl", "nokia_srlinux");
        node.startup_config_rel_path = Some("../../etc/passwd".to_string());
        let result = Validator::new().validate(&TemplateDescriptor::Node(node));
        assert!(result.has_errors());
    }

    #[test]
    fn test_stack_config_traversal_is_error() {
        let yaml = r#"
name: Escape
topology: { name: x, nodes: { a: {} } }
configs:
  "/abs/path.cfg": "x"
  "ok/leaf.cfg": "y"
"#;
        let result = Validator::new().validate(&decode_descriptor(yaml).unwrap());
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn test_dangling_link_is_only_warning() {
        let yaml = r#"
name: Pair
topology:
  name: pair
  nodes: { a: { kind: linux }, b: { kind: linux } }
  links:
    - endpoints: ["a:eth1", "b:eth1"]
    - endpoints: ["c:eth1", "b:eth2"]
    - endpoints: ["a-eth3"]
"#;
        let result = Validator::new().validate(&decode_descriptor(yaml).unwrap());
        assert!(result.valid);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn test_scalar_stack_node_is_error() {
        let yaml = "name: Bad\ntopology:\n  name: bad\n  nodes:\n    a: 42\n";
        let result = Validator::new().validate(&decode_descriptor(yaml).unwrap());
        assert!(!result.valid);
    }

    #[test]
    fn test_safe_join() {
        let base = Path::new("/store/unit");
        assert_eq!(safe_join(base, "configs/a.cfg"), Some(base.join("configs/a.cfg")));
        assert_eq!(safe_join(base, "./a.cfg"), Some(base.join("a.cfg")));
        assert_eq!(safe_join(base, "../a.cfg"), None);
        assert_eq!(safe_join(base, "/a.cfg"), None);
        assert_eq!(safe_join(base, ""), None);
    }
}
