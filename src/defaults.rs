//! Built-in catalog seeded into an empty store.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::templates::{NodeTemplate, StackLink, StackTemplate, StackTopology, TemplateDescriptor};

struct DefaultNode {
    name: &'static str,
    description: &'static str,
    kind: &'static str,
    image: &'static str,
    node_type: Option<&'static str>,
    role: &'static str,
    startup_config: Option<&'static str>,
}

fn default_nodes() -> Vec<DefaultNode> {
    vec![
        DefaultNode {
            name: "SR Linux",
            description: "Nokia SR Linux data center switch",
            kind: "nokia_srlinux",
            image: "ghcr.io/nokia/srlinux:latest",
            node_type: Some("ixrd3"),
            role: "router",
            startup_config: Some("configs/srlinux.cfg"),
        },
        DefaultNode {
            name: "Arista cEOS",
            description: "Arista containerized EOS",
            kind: "arista_ceos",
            image: "ceos:latest",
            node_type: None,
            role: "router",
            startup_config: Some("configs/ceos.cfg"),
        },
        DefaultNode {
            name: "Juniper cRPD",
            description: "Juniper containerized routing protocol daemon",
            kind: "juniper_crpd",
            image: "crpd:latest",
            node_type: None,
            role: "router",
            startup_config: None,
        },
        DefaultNode {
            name: "Cisco XRd",
            description: "Cisco IOS XR control plane",
            kind: "cisco_xrd",
            image: "ios-xr/xrd-control-plane:latest",
            node_type: None,
            role: "router",
            startup_config: None,
        },
        DefaultNode {
            name: "SONiC VS",
            description: "SONiC virtual switch",
            kind: "sonic-vs",
            image: "docker-sonic-vs:latest",
            node_type: None,
            role: "switch",
            startup_config: None,
        },
        DefaultNode {
            name: "FRR Router",
            description: "Free Range Routing on Linux",
            kind: "linux",
            image: "frrouting/frr:latest",
            node_type: None,
            role: "router",
            startup_config: None,
        },
        DefaultNode {
            name: "Linux Host",
            description: "Generic Linux client",
            kind: "linux",
            image: "alpine:latest",
            node_type: None,
            role: "client",
            startup_config: None,
        },
    ]
}

fn node_descriptor(d: DefaultNode) -> TemplateDescriptor {
    let mut node = NodeTemplate::new(d.name, d.kind);
    node.description = Some(d.description.to_string());
    node.image = Some(d.image.to_string());
    node.node_type = d.node_type.map(str::to_string);
    node.role = Some(d.role.to_string());
    node.startup_config_rel_path = d.startup_config.map(str::to_string);
    TemplateDescriptor::Node(node)
}

fn leaf_spine_stack() -> TemplateDescriptor {
    let srl = |role: &str| -> Value {
        json!({
            "kind": "nokia_srlinux",
            "image": "ghcr.io/nokia/srlinux:latest",
            "type": "ixrd3",
            "role": role,
        })
    };
    let host = json!({ "kind": "linux", "image": "alpine:latest", "role": "client" });

    // Members are laid out in key order, so the tier prefix keeps the spine first
    // and the clients last.
    let nodes: BTreeMap<String, Value> = [
        ("t1-spine1", srl("router")),
        ("t2-leaf1", srl("router")),
        ("t2-leaf2", srl("router")),
        ("t3-client1", host.clone()),
        ("t3-client2", host),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let links = vec![
        StackLink::new("t1-spine1:e1-1", "t2-leaf1:e1-49"),
        StackLink::new("t1-spine1:e1-2", "t2-leaf2:e1-49"),
        StackLink::new("t2-leaf1:e1-1", "t3-client1:eth1"),
        StackLink::new("t2-leaf2:e1-1", "t3-client2:eth1"),
    ];

    let configs: BTreeMap<String, String> = ["t1-spine1", "t2-leaf1", "t2-leaf2"]
        .into_iter()
        .map(|n| (format!("configs/{}.cfg", n), format!("# {} configuration\n", n)))
        .collect();

    TemplateDescriptor::Stack(StackTemplate {
        name: "Leaf Spine Lab".to_string(),
        description: Some("One spine, two leaves, one client per leaf".to_string()),
        topology: StackTopology {
            name: "leaf-spine".to_string(),
            nodes: Some(nodes),
            links: Some(links),
            extra: Default::default(),
        },
        configs: Some(configs),
        extra: Default::default(),
    })
}

/// One node template per common device family plus one linked stack.
pub fn default_catalog() -> Vec<TemplateDescriptor> {
    let mut catalog: Vec<_> = default_nodes().into_iter().map(node_descriptor).collect();
    catalog.push(leaf_spine_stack());
    catalog
}
