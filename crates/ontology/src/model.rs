//! Ontology type model
//!
//! The model is generic over the reference representation `R`:
//!
//! - [`TypeRef`]: as authored in declaration files (base URL + version range)
//! - [`Reference`]: resolved by the graph builder to a concrete version
//! - [`VersionedUrl`]: exact version, as sent to and read from the registry

use crate::constraint::NumericConstraint;
use crate::url::{BaseUrl, TypeRef, VersionRange, VersionedUrl};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::fmt;

/// The three kinds of ontology type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeKind {
    DataType,
    PropertyType,
    EntityType,
}

impl TypeKind {
    /// Path segment used in type URLs and registry endpoints
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::DataType => "data-type",
            Self::PropertyType => "property-type",
            Self::EntityType => "entity-type",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DataType => "data type",
            Self::PropertyType => "property type",
            Self::EntityType => "entity type",
        })
    }
}

/// How one type refers to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Property type to data type
    Value,
    /// Property or entity type to property type
    Composition,
    /// Entity type to the entity type it extends
    Inheritance,
    /// Entity type to a link destination
    Link,
}

impl EdgeKind {
    /// Kind of type an edge of this kind must point at
    pub fn expected_kind(self) -> TypeKind {
        match self {
            Self::Value => TypeKind::DataType,
            Self::Composition => TypeKind::PropertyType,
            Self::Inheritance | Self::Link => TypeKind::EntityType,
        }
    }

    /// Link edges are the only ones allowed to form cycles
    pub fn is_link(self) -> bool {
        matches!(self, Self::Link)
    }
}

/// Anything that points at a type by its base URL
pub trait Referent {
    fn base(&self) -> &BaseUrl;
}

impl Referent for BaseUrl {
    fn base(&self) -> &BaseUrl {
        self
    }
}

impl Referent for TypeRef {
    fn base(&self) -> &BaseUrl {
        &self.base
    }
}

impl Referent for VersionedUrl {
    fn base(&self) -> &BaseUrl {
        &self.base
    }
}

/// A reference resolved to the version chosen by the graph builder
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub url: VersionedUrl,
    pub range: VersionRange,
}

impl Reference {
    pub fn new(url: VersionedUrl, range: VersionRange) -> Self {
        Self { url, range }
    }

    /// A reference pinned to exactly `url`
    pub fn exact(url: VersionedUrl) -> Self {
        let range = VersionRange::exact(url.version);
        Self { url, range }
    }

    pub fn accepts(&self, url: &VersionedUrl) -> bool {
        self.url.base == url.base && self.range.contains(url.version)
    }
}

impl Referent for Reference {
    fn base(&self) -> &BaseUrl {
        &self.url.base
    }
}

/// Primitive value kinds a data type can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Primitive {
    Text,
    Number,
    Boolean,
    Null,
    Object,
    EmptyList,
}

impl Primitive {
    pub const ALL: [Self; 6] = [
        Self::Text,
        Self::Number,
        Self::Boolean,
        Self::Null,
        Self::Object,
        Self::EmptyList,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Object => "object",
            Self::EmptyList => "empty-list",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Null => "Null",
            Self::Object => "Object",
            Self::EmptyList => "Empty List",
        }
    }
}

/// A leaf type describing a primitive value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataType {
    #[serde(rename = "type")]
    pub primitive: Primitive,
}

/// A property value, either a single reference or an array of them
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueOrArray<R> {
    Value(R),
    Array {
        items: R,
        #[serde(default, skip_serializing_if = "NumericConstraint::is_unbounded")]
        length: NumericConstraint,
    },
}

impl<R> ValueOrArray<R> {
    pub fn target(&self) -> &R {
        match self {
            Self::Value(r) | Self::Array { items: r, .. } => r,
        }
    }

    fn try_map<S, E>(&self, f: &mut impl FnMut(&R) -> Result<S, E>) -> Result<ValueOrArray<S>, E> {
        Ok(match self {
            Self::Value(r) => ValueOrArray::Value(f(r)?),
            Self::Array { items, length } => ValueOrArray::Array {
                items: f(items)?,
                length: *length,
            },
        })
    }
}

/// One alternative of a property type's `oneOf`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyValues<R: Ord> {
    /// A data type value
    DataType(R),
    /// A nested object keyed by property type base URL
    Object {
        properties: BTreeMap<BaseUrl, ValueOrArray<R>>,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        required: BTreeSet<BaseUrl>,
    },
    /// An array whose items match any of the alternatives
    Array {
        items: BTreeSet<PropertyValues<R>>,
        #[serde(default, skip_serializing_if = "NumericConstraint::is_unbounded")]
        length: NumericConstraint,
    },
}

impl<R: Ord> PropertyValues<R> {
    fn visit<'a>(&'a self, out: &mut Vec<(&'a R, EdgeKind)>) {
        match self {
            Self::DataType(r) => out.push((r, EdgeKind::Value)),
            Self::Object { properties, .. } => {
                out.extend(properties.values().map(|v| (v.target(), EdgeKind::Composition)));
            }
            Self::Array { items, .. } => items.iter().for_each(|item| item.visit(out)),
        }
    }

    fn try_map<S: Ord, E>(
        &self,
        f: &mut impl FnMut(&R, EdgeKind) -> Result<S, E>,
    ) -> Result<PropertyValues<S>, E> {
        Ok(match self {
            Self::DataType(r) => PropertyValues::DataType(f(r, EdgeKind::Value)?),
            Self::Object {
                properties,
                required,
            } => PropertyValues::Object {
                properties: properties
                    .iter()
                    .map(|(key, value)| {
                        Ok((
                            key.clone(),
                            value.try_map(&mut |r| f(r, EdgeKind::Composition))?,
                        ))
                    })
                    .collect::<Result<_, E>>()?,
                required: required.clone(),
            },
            Self::Array { items, length } => PropertyValues::Array {
                items: items
                    .iter()
                    .map(|item| item.try_map(f))
                    .collect::<Result<_, E>>()?,
                length: *length,
            },
        })
    }
}

/// A named property whose value is one of several alternatives
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyType<R: Ord> {
    pub one_of: BTreeSet<PropertyValues<R>>,
}

/// An outgoing link from an entity type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link<R> {
    pub to: R,
    #[serde(default, skip_serializing_if = "NumericConstraint::is_unbounded")]
    pub length: NumericConstraint,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ordered: bool,
}

/// A type describing an entity: its properties, links and parents
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "R: Ord + Deserialize<'de>")
)]
pub struct EntityType<R: Ord> {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub inherits_from: BTreeSet<R>,
    #[serde(default)]
    pub properties: BTreeMap<BaseUrl, ValueOrArray<R>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<BaseUrl>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub links: BTreeSet<Link<R>>,
}

impl<R: Ord + Clone> EntityType<R> {
    /// The same entity type with every link removed
    pub fn without_links(&self) -> Self {
        Self {
            inherits_from: self.inherits_from.clone(),
            properties: self.properties.clone(),
            required: self.required.clone(),
            links: BTreeSet::new(),
        }
    }
}

/// Kind-specific content of a type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeBody<R: Ord> {
    DataType(DataType),
    PropertyType(PropertyType<R>),
    EntityType(EntityType<R>),
}

impl<R: Ord> TypeBody<R> {
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::DataType(_) => TypeKind::DataType,
            Self::PropertyType(_) => TypeKind::PropertyType,
            Self::EntityType(_) => TypeKind::EntityType,
        }
    }

    /// Every outgoing reference with the kind of edge it forms
    pub fn references(&self) -> Vec<(&R, EdgeKind)> {
        let mut out = Vec::new();
        match self {
            Self::DataType(_) => {}
            Self::PropertyType(property) => {
                property.one_of.iter().for_each(|v| v.visit(&mut out));
            }
            Self::EntityType(entity) => {
                out.extend(entity.inherits_from.iter().map(|r| (r, EdgeKind::Inheritance)));
                out.extend(
                    entity
                        .properties
                        .values()
                        .map(|v| (v.target(), EdgeKind::Composition)),
                );
                out.extend(entity.links.iter().map(|l| (&l.to, EdgeKind::Link)));
            }
        }
        out
    }

    /// Rewrite every reference, stopping at the first error
    pub fn try_map<S: Ord, E>(
        &self,
        mut f: impl FnMut(&R, EdgeKind) -> Result<S, E>,
    ) -> Result<TypeBody<S>, E> {
        Ok(match self {
            Self::DataType(data) => TypeBody::DataType(data.clone()),
            Self::PropertyType(property) => TypeBody::PropertyType(PropertyType {
                one_of: property
                    .one_of
                    .iter()
                    .map(|v| v.try_map(&mut f))
                    .collect::<Result<_, E>>()?,
            }),
            Self::EntityType(entity) => TypeBody::EntityType(EntityType {
                inherits_from: entity
                    .inherits_from
                    .iter()
                    .map(|r| f(r, EdgeKind::Inheritance))
                    .collect::<Result<_, E>>()?,
                properties: entity
                    .properties
                    .iter()
                    .map(|(key, value)| {
                        Ok((
                            key.clone(),
                            value.try_map(&mut |r| f(r, EdgeKind::Composition))?,
                        ))
                    })
                    .collect::<Result<_, E>>()?,
                required: entity.required.clone(),
                links: entity
                    .links
                    .iter()
                    .map(|link| {
                        Ok(Link {
                            to: f(&link.to, EdgeKind::Link)?,
                            length: link.length,
                            ordered: link.ordered,
                        })
                    })
                    .collect::<Result<_, E>>()?,
            }),
        })
    }

    pub fn map<S: Ord>(&self, mut f: impl FnMut(&R, EdgeKind) -> S) -> TypeBody<S> {
        match self.try_map::<S, Infallible>(|r, edge| Ok(f(r, edge))) {
            Ok(body) => body,
            Err(never) => match never {},
        }
    }
}

impl<R: Ord + Referent> TypeBody<R> {
    /// The shape of this type with versions erased
    pub fn erased(&self) -> TypeBody<BaseUrl> {
        self.map(|r, _| r.base().clone())
    }
}

/// A single version of an ontology type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyType<R: Ord = Reference> {
    #[serde(rename = "$id")]
    pub id: VersionedUrl,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub archived: bool,
    #[serde(flatten)]
    pub body: TypeBody<R>,
}

/// A type as written in a declaration file
pub type Declaration = OntologyType<TypeRef>;

/// A type as published to the registry, with every reference pinned
pub type PublishedType = OntologyType<VersionedUrl>;

impl<R: Ord> OntologyType<R> {
    pub fn base(&self) -> &BaseUrl {
        &self.id.base
    }

    pub fn version(&self) -> u32 {
        self.id.version
    }

    pub fn kind(&self) -> TypeKind {
        self.body.kind()
    }

    pub fn label(&self) -> String {
        format!("{} v{}", self.title, self.id.version)
    }

    pub fn map_refs<S: Ord>(&self, f: impl FnMut(&R, EdgeKind) -> S) -> OntologyType<S> {
        OntologyType {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            archived: self.archived,
            body: self.body.map(f),
        }
    }
}

impl OntologyType<Reference> {
    /// Pin every reference to its resolved version
    pub fn published(&self) -> PublishedType {
        self.map_refs(|r, _| r.url.clone())
    }
}

impl PublishedType {
    /// A remote type as a graph node whose references accept exactly one version
    pub fn into_node(self) -> OntologyType {
        self.map_refs(|url, _| Reference::exact(url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = r#"{
        "$id": "https://example.com/@acme/types/property-type/name/v/1",
        "title": "Name",
        "kind": "propertyType",
        "oneOf": [
            {"dataType": {"$ref": "https://blockprotocol.org/@blockprotocol/types/data-type/text/v/1"}}
        ]
    }"#;

    const PERSON: &str = r#"{
        "$id": "https://example.com/@acme/types/entity-type/person/v/1",
        "title": "Person",
        "kind": "entityType",
        "properties": {
            "https://example.com/@acme/types/property-type/name/": {
                "$ref": "https://example.com/@acme/types/property-type/name/"
            },
            "https://example.com/@acme/types/property-type/nickname/": {
                "items": {"$ref": "https://example.com/@acme/types/property-type/nickname/"},
                "length": {"lessThanOrEqualTo": 3}
            }
        },
        "required": ["https://example.com/@acme/types/property-type/name/"],
        "links": [
            {"to": {"$ref": "https://example.com/@acme/types/entity-type/company/"}, "length": {"min": 0, "max": 1}}
        ]
    }"#;

    #[test]
    fn test_parse_property_type_declaration() {
        let decl: Declaration = serde_json::from_str(NAME).unwrap();
        assert_eq!(decl.kind(), TypeKind::PropertyType);
        assert_eq!(decl.version(), 1);
        assert_eq!(decl.title, "Name");

        let refs = decl.body.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].1, EdgeKind::Value);
        assert_eq!(refs[0].0.range, VersionRange::exact(1));
    }

    #[test]
    fn test_parse_entity_type_declaration() {
        let decl: Declaration = serde_json::from_str(PERSON).unwrap();
        let TypeBody::EntityType(entity) = &decl.body else {
            panic!("expected entity type");
        };
        assert_eq!(entity.properties.len(), 2);
        assert_eq!(entity.required.len(), 1);
        assert_eq!(entity.links.len(), 1);

        let nickname = entity
            .properties
            .values()
            .find(|v| matches!(v, ValueOrArray::Array { .. }))
            .unwrap();
        let ValueOrArray::Array { length, .. } = nickname else {
            unreachable!()
        };
        assert_eq!(*length, NumericConstraint::at_most(3));

        let edges: Vec<EdgeKind> = decl.body.references().into_iter().map(|(_, e)| e).collect();
        assert_eq!(edges.iter().filter(|e| e.is_link()).count(), 1);
        assert_eq!(
            edges.iter().filter(|e| **e == EdgeKind::Composition).count(),
            2
        );
    }

    #[test]
    fn test_published_round_trips_through_json() {
        let decl: Declaration = serde_json::from_str(PERSON).unwrap();
        let published: PublishedType = decl.map_refs(|r, _| r.base.at(r.range.min));
        let json = serde_json::to_string(&published).unwrap();
        let back: PublishedType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, published);
    }

    #[test]
    fn test_erased_ignores_versions() {
        let decl: Declaration = serde_json::from_str(NAME).unwrap();
        let v1: PublishedType = decl.map_refs(|r, _| r.base.at(1));
        let v2: PublishedType = decl.map_refs(|r, _| r.base.at(2));
        assert_ne!(v1.body, v2.body);
        assert_eq!(v1.body.erased(), v2.body.erased());
    }

    #[test]
    fn test_without_links() {
        let decl: Declaration = serde_json::from_str(PERSON).unwrap();
        let TypeBody::EntityType(entity) = decl.body else {
            panic!("expected entity type");
        };
        let shell = entity.without_links();
        assert!(shell.links.is_empty());
        assert_eq!(shell.properties, entity.properties);
    }

    #[test]
    fn test_parse_bare_entity_type() {
        let json = r#"{
            "$id": "https://example.com/@acme/types/entity-type/thing/v/1",
            "title": "Thing",
            "kind": "entityType"
        }"#;
        let decl: Declaration = serde_json::from_str(json).unwrap();
        let TypeBody::EntityType(entity) = &decl.body else {
            panic!("expected entity type");
        };
        assert!(entity.inherits_from.is_empty());
        assert!(entity.properties.is_empty());
        assert!(entity.links.is_empty());

        let published: PublishedType = serde_json::from_str(json).unwrap();
        assert!(published.body.references().is_empty());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"$id": "https://example.com/x/v/1", "title": "X", "kind": "linkType"}"#;
        assert!(serde_json::from_str::<Declaration>(json).is_err());
    }
}
