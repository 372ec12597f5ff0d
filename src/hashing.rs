//! Content fingerprints - SHA-256 over canonical JSON
//!
//! A fingerprint identifies what a template *is*, independent of what it is
//! called: the id is never part of a descriptor and the name is stripped, so
//! an exported-then-imported template fingerprints identically to its source.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::templates::TemplateDescriptor;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of a descriptor's content, ignoring its name.
pub fn fingerprint(descriptor: &TemplateDescriptor) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(descriptor)?;
    if let Value::Object(map) = &mut value {
        map.remove("name");
    }
    Ok(sha256_hex(canonical_json(&value)?.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::NodeTemplate;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 0}});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":{"b":0,"y":1},"z":1}"#);
    }

    #[test]
    fn test_fingerprint_ignores_name() {
        let a = TemplateDescriptor::Node(NodeTemplate::new("Leaf", "nokia_srlinux"));
        let b = TemplateDescriptor::Node(NodeTemplate::new("Leaf (copy)", "nokia_srlinux"));
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = TemplateDescriptor::Node(NodeTemplate::new("Leaf", "nokia_srlinux"));
        let b = TemplateDescriptor::Node(NodeTemplate::new("Leaf", "arista_ceos"));
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_eq!(fingerprint(&a).unwrap().len(), 64);
    }
}
