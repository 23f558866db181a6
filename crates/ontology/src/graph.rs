//! Resolved type graph
//!
//! Nodes are keyed by `(base URL, version)`. Each node's outgoing edges are
//! the resolved references in its body; incoming edges are indexed so
//! callers can ask which types depend on a given version.

use crate::builtin;
use crate::model::{OntologyType, Reference};
use crate::url::{BaseUrl, VersionRange, VersionedUrl};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    nodes: BTreeMap<BaseUrl, BTreeMap<u32, OntologyType>>,
    referenced_by: BTreeMap<VersionedUrl, BTreeSet<VersionedUrl>>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing any node with the same versioned URL
    pub fn insert(&mut self, node: OntologyType) -> Option<OntologyType> {
        let previous = self.remove(&node.id);
        for (reference, _) in node.body.references() {
            self.referenced_by
                .entry(reference.url.clone())
                .or_default()
                .insert(node.id.clone());
        }
        self.nodes
            .entry(node.base().clone())
            .or_default()
            .insert(node.version(), node);
        previous
    }

    pub fn remove(&mut self, url: &VersionedUrl) -> Option<OntologyType> {
        let versions = self.nodes.get_mut(&url.base)?;
        let node = versions.remove(&url.version)?;
        if versions.is_empty() {
            self.nodes.remove(&url.base);
        }
        for (reference, _) in node.body.references() {
            if let Some(sources) = self.referenced_by.get_mut(&reference.url) {
                sources.remove(&node.id);
                if sources.is_empty() {
                    self.referenced_by.remove(&reference.url);
                }
            }
        }
        Some(node)
    }

    pub fn get(&self, url: &VersionedUrl) -> Option<&OntologyType> {
        self.nodes.get(&url.base)?.get(&url.version)
    }

    pub fn contains(&self, url: &VersionedUrl) -> bool {
        self.get(url).is_some()
    }

    pub fn contains_base(&self, base: &BaseUrl) -> bool {
        self.nodes.contains_key(base)
    }

    /// All versions of a type, oldest first
    pub fn versions(&self, base: &BaseUrl) -> impl Iterator<Item = &OntologyType> {
        self.nodes.get(base).into_iter().flat_map(BTreeMap::values)
    }

    pub fn latest(&self, base: &BaseUrl) -> Option<&OntologyType> {
        self.nodes.get(base)?.values().next_back()
    }

    pub fn latest_version(&self, base: &BaseUrl) -> Option<u32> {
        self.latest(base).map(OntologyType::version)
    }

    /// Highest version of `base` inside `range`, including built-ins
    pub fn highest_in_range(&self, base: &BaseUrl, range: &VersionRange) -> Option<u32> {
        let local = range.highest(self.nodes.get(base).into_iter().flat_map(|v| v.keys().copied()));
        local.or_else(|| {
            builtin::find(base)
                .map(OntologyType::version)
                .filter(|v| range.contains(*v))
        })
    }

    /// Whether `reference` can be satisfied by this graph or a built-in
    pub fn satisfies(&self, reference: &Reference) -> bool {
        self.contains(&reference.url) || builtin::get(&reference.url).is_some()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &BaseUrl> {
        self.nodes.keys()
    }

    /// Every node, grouped by identifier and ordered by version
    pub fn nodes(&self) -> impl Iterator<Item = &OntologyType> {
        self.nodes.values().flat_map(BTreeMap::values)
    }

    /// Versions that reference `url`
    pub fn referenced_by(&self, url: &VersionedUrl) -> impl Iterator<Item = &VersionedUrl> {
        self.referenced_by.get(url).into_iter().flatten()
    }

    /// Number of nodes (type versions)
    pub fn len(&self) -> usize {
        self.nodes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<OntologyType> for TypeGraph {
    fn from_iter<I: IntoIterator<Item = OntologyType>>(iter: I) -> Self {
        let mut graph = Self::new();
        for node in iter {
            graph.insert(node);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Primitive, PropertyType, PropertyValues, TypeBody};

    fn property(base: &str, version: u32) -> OntologyType {
        let text = builtin::data_type(Primitive::Text).at(1);
        OntologyType {
            id: BaseUrl::new(base).unwrap().at(version),
            title: base.to_string(),
            description: None,
            archived: false,
            body: TypeBody::PropertyType(PropertyType {
                one_of: [PropertyValues::DataType(Reference::exact(text))].into(),
            }),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let graph: TypeGraph = [
            property("https://example.com/name/", 1),
            property("https://example.com/name/", 2),
            property("https://example.com/email/", 1),
        ]
        .into_iter()
        .collect();

        let name = BaseUrl::new("https://example.com/name/").unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.latest_version(&name), Some(2));
        assert_eq!(graph.versions(&name).count(), 2);
        assert_eq!(graph.identifiers().count(), 2);
        assert!(graph.contains(&name.at(1)));
        assert!(!graph.contains(&name.at(3)));
    }

    #[test]
    fn test_reverse_edges() {
        let mut graph = TypeGraph::new();
        graph.insert(property("https://example.com/name/", 1));
        graph.insert(property("https://example.com/email/", 1));

        let text = builtin::data_type(Primitive::Text).at(1);
        assert_eq!(graph.referenced_by(&text).count(), 2);

        graph.remove(&BaseUrl::new("https://example.com/name/").unwrap().at(1));
        assert_eq!(graph.referenced_by(&text).count(), 1);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_highest_in_range_falls_back_to_builtins() {
        let graph = TypeGraph::new();
        let text = builtin::data_type(Primitive::Text);
        assert_eq!(graph.highest_in_range(&text, &VersionRange::any()), Some(1));
        assert_eq!(graph.highest_in_range(&text, &VersionRange::at_least(2)), None);
    }
}
