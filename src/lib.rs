//! TopoForge Core - Topology Template Store & Instantiation Engine
//!
//! # Ground Rules
//! 1. The Store owns the catalog, the Engine owns nothing
//! 2. The Store never touches the graph, the Engine never touches disk
//! 3. Descriptors are classified once, at the storage boundary
//! 4. A corrupt template never blocks the rest of the catalog
//! 5. A drop never fails loudly; it places what it can

pub mod templates;
pub mod naming;
pub mod validation;
pub mod hashing;
pub mod store;
pub mod defaults;
pub mod graph;
pub mod engine;
pub mod catalog;

pub use templates::{
    Template, TemplateId, TemplateDescriptor, TemplateKind, NodeTemplate, StackTemplate,
    StackTopology, StackLink, is_node_template, is_stack_template,
};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use hashing::{canonical_json, fingerprint};
pub use store::{TemplateStore, StoreError, PartialLoadError, LoadReport, TemplatePatch};
pub use graph::{GraphHandle, MemoryGraph, Position, Properties};
pub use engine::{InstantiationEngine, Instantiation, LayoutConfig};
pub use catalog::Catalog;
