//! Template Descriptors - Node & Stack Shapes
//!
//! Descriptors are hand-authored YAML with no explicit type tag. The shape is
//! decided here, once, from which discriminating field is present (`topology`
//! for stacks, `kind` for nodes). Everything downstream matches on the variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub type TemplateId = String;

/// Descriptor file written into every storage unit.
pub const DESCRIPTOR_FILE: &str = "template.yml";
/// Also accepted when loading.
pub const DESCRIPTOR_FILE_ALT: &str = "template.yaml";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("descriptor is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Shape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Node,
    Stack,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Node => write!(f, "node"),
            TemplateKind::Stack => write!(f, "stack"),
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" => Ok(TemplateKind::Node),
            "stack" => Ok(TemplateKind::Stack),
            other => Err(format!("unknown template kind '{}' (expected node or stack)", other)),
        }
    }
}

/// A single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "scalar_map", skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binds: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar_map", skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_config_rel_path: Option<String>,
    /// Fields this version does not know about, kept for round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeTemplate {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: kind.into(),
            image: None,
            node_type: None,
            group: None,
            role: None,
            env: None,
            cmd: None,
            exec: None,
            binds: None,
            ports: None,
            labels: None,
            startup_config_rel_path: None,
            extra: Map::new(),
        }
    }
}

/// `env` and `labels` values are strings downstream, but YAML authors write
/// `MTU: 9000` or `enabled: true`. Scalars are taken as their text.
fn scalar_map<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    raw.map(|map| {
        map.into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => String::new(),
                    other => {
                        return Err(serde::de::Error::custom(format!(
                            "value of '{}' must be a scalar, found {}",
                            key, other
                        )))
                    }
                };
                Ok((key, text))
            })
            .collect::<Result<BTreeMap<String, String>, D::Error>>()
    })
    .transpose()
}

/// A group of devices with links between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub topology: StackTopology,
    /// Relative path -> file body, written verbatim into the storage unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackTopology {
    #[serde(default)]
    pub name: String,
    /// Node key -> opaque node configuration. `None` when the document omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<StackLink>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackLink {
    /// Two `node:interface` strings.
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StackLink {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            endpoints: vec![a.into(), b.into()],
            extra: Map::new(),
        }
    }
}

/// Split `node:iface` into its two parts. Anything else is malformed.
pub fn split_endpoint(endpoint: &str) -> Option<(&str, &str)> {
    let mut parts = endpoint.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(node), Some(iface), None) if !node.is_empty() && !iface.is_empty() => {
            Some((node, iface))
        }
        _ => None,
    }
}

/// A template body without its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateDescriptor {
    Node(NodeTemplate),
    Stack(StackTemplate),
}

impl TemplateDescriptor {
    pub fn kind(&self) -> TemplateKind {
        match self {
            TemplateDescriptor::Node(_) => TemplateKind::Node,
            TemplateDescriptor::Stack(_) => TemplateKind::Stack,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TemplateDescriptor::Node(n) => &n.name,
            TemplateDescriptor::Stack(s) => &s.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            TemplateDescriptor::Node(n) => n.name = name.into(),
            TemplateDescriptor::Stack(s) => s.name = name.into(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TemplateDescriptor::Node(n) => n.description.as_deref(),
            TemplateDescriptor::Stack(s) => s.description.as_deref(),
        }
    }

    /// Serialize to a JSON object, the form patches are merged into.
    pub fn to_map(&self) -> Result<Map<String, Value>, DescriptorError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DescriptorError::Shape("descriptor did not serialize to a mapping".into())),
            Err(e) => Err(DescriptorError::Shape(e.to_string())),
        }
    }
}

impl TryFrom<Value> for TemplateDescriptor {
    type Error = DescriptorError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut map = match value {
            Value::Object(map) => map,
            _ => return Err(DescriptorError::Shape("descriptor must be a mapping".into())),
        };

        // The id is the directory name; a stray `id` key must not ride along in `extra`.
        if let Some(id) = map.remove("id") {
            debug!("Ignoring `id: {}` written inside a descriptor", id);
        }

        // `topology` wins when both discriminators are present.
        if map.contains_key("topology") {
            serde_json::from_value(Value::Object(map))
                .map(TemplateDescriptor::Stack)
                .map_err(|e| DescriptorError::Shape(format!("malformed stack template: {}", e)))
        } else if map.contains_key("kind") {
            serde_json::from_value(Value::Object(map))
                .map(TemplateDescriptor::Node)
                .map_err(|e| DescriptorError::Shape(format!("malformed node template: {}", e)))
        } else {
            Err(DescriptorError::Shape(
                "descriptor has neither `kind` nor `topology`".into(),
            ))
        }
    }
}

/// Parse and classify one descriptor document.
pub fn decode_descriptor(text: &str) -> Result<TemplateDescriptor, DescriptorError> {
    let value: Value = serde_yaml::from_str(text)?;
    TemplateDescriptor::try_from(value)
}

/// Render a descriptor as it is stored on disk. The id is never part of it.
pub fn encode_descriptor(descriptor: &TemplateDescriptor) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(descriptor)
}

/// A descriptor together with the id the store assigned it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: TemplateId,
    #[serde(flatten)]
    pub descriptor: TemplateDescriptor,
}

impl Template {
    pub fn new(id: impl Into<TemplateId>, descriptor: TemplateDescriptor) -> Self {
        Self { id: id.into(), descriptor }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn kind(&self) -> TemplateKind {
        self.descriptor.kind()
    }
}

pub fn is_node_template(template: &Template) -> bool {
    matches!(template.descriptor, TemplateDescriptor::Node(_))
}

pub fn is_stack_template(template: &Template) -> bool {
    matches!(template.descriptor, TemplateDescriptor::Stack(_))
}
