//! The list of templates the engine can draw from.
//!
//! A `Catalog` is a point-in-time copy taken from the store. The engine reads
//! from it at drop time and never keeps anything, so a stale catalog is only
//! ever out of date, never inconsistent.

use crate::templates::{Template, TemplateKind};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: Vec<Template>,
}

impl Catalog {
    /// Sorted by name, then id, for stable listings.
    pub fn new(mut templates: Vec<Template>) -> Self {
        templates.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id.cmp(&b.id)));
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn of_kind(&self, kind: TemplateKind) -> impl Iterator<Item = &Template> {
        self.templates.iter().filter(move |t| t.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl FromIterator<Template> for Catalog {
    fn from_iter<I: IntoIterator<Item = Template>>(iter: I) -> Self {
        Catalog::new(iter.into_iter().collect())
    }
}
