//! Identifier allocation
//!
//! Two schemes share one collision strategy (append an increasing counter):
//! template ids are hyphenated slugs (`sr-linux`, `sr-linux-1`), graph node
//! ids are squashed alphanumerics (`srlinux`, `srlinux1`).

/// Used when a name has no alphanumeric characters at all.
const FALLBACK_SLUG: &str = "template";
const FALLBACK_NODE_ID: &str = "node";

/// Lower-case `name` and collapse every run of non-alphanumerics into one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Lower-case `name` and drop everything that is not alphanumeric.
pub fn node_id_base(name: &str) -> String {
    let base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if base.is_empty() {
        FALLBACK_NODE_ID.to_string()
    } else {
        base
    }
}

/// First slug for `name` not claimed by `taken`: `foo`, `foo-1`, `foo-2`, ...
pub fn unique_slug(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = slugify(name);
    if !taken(&base) {
        return base;
    }
    let mut n = 1u64;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// First graph node id for `name` not claimed by `taken`: `foo`, `foo1`, `foo2`, ...
pub fn unique_node_id(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = node_id_base(name);
    if !taken(&base) {
        return base;
    }
    let mut n = 1u64;
    loop {
        let candidate = format!("{}{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("SR Linux"), "sr-linux");
        assert_eq!(slugify("  Arista  cEOS -- Lab "), "arista-ceos-lab");
        assert_eq!(slugify("FRR/BGP"), "frr-bgp");
    }

    #[test]
    fn test_slugify_fallback() {
        assert_eq!(slugify("!!!"), "template");
    }

    #[test]
    fn test_unique_slug_suffixes() {
        let taken: HashSet<&str> = ["sr-linux", "sr-linux-1"].into_iter().collect();
        assert_eq!(unique_slug("SR Linux", |c| taken.contains(c)), "sr-linux-2");
        assert_eq!(unique_slug("cEOS", |c| taken.contains(c)), "ceos");
    }

    #[test]
    fn test_node_id_base_strips() {
        assert_eq!(node_id_base("SR Linux"), "srlinux");
        assert_eq!(node_id_base("leaf-01"), "leaf01");
        assert_eq!(node_id_base("---"), "node");
    }

    #[test]
    fn test_unique_node_id_suffixes() {
        let taken: HashSet<&str> = ["srlinux", "srlinux1"].into_iter().collect();
        assert_eq!(unique_node_id("SR Linux", |c| taken.contains(c)), "srlinux2");
    }
}
