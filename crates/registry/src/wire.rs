//! Request and response bodies exchanged with the registry.

use crate::error::{Error, Result};
use ontology::{BaseUrl, PublishedType, VersionedUrl};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /ontology-types/query`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub filter: Filter,
    pub include_archived: bool,
}

/// Snapshot filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    /// Matches every type (an empty conjunction)
    All(Vec<Filter>),
    /// Matches any of the nested filters
    Any(Vec<Filter>),
    /// Base URL starts with the given prefix
    StartsWith(BaseUrl),
}

impl QueryRequest {
    /// Query everything, or only identifiers under the given prefixes
    pub fn new(scope: Option<&[BaseUrl]>) -> Self {
        let filter = match scope {
            None => Filter::All(Vec::new()),
            Some(prefixes) => Filter::Any(prefixes.iter().cloned().map(Filter::StartsWith).collect()),
        };
        Self {
            filter,
            include_archived: true,
        }
    }
}

/// Body of `POST /ontology-types/query`
///
/// Vertices are keyed by base URL, then by version number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub vertices: BTreeMap<String, BTreeMap<String, Vertex>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vertex {
    pub inner: VertexInner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VertexInner {
    pub schema: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub archived: bool,
}

impl QueryResponse {
    /// Decode every vertex into a published type
    ///
    /// The vertex keys are informational; the `$id` inside the schema is
    /// authoritative.
    pub fn into_types(self) -> Result<Vec<PublishedType>> {
        let mut types = Vec::new();
        for (base, versions) in self.vertices {
            for (version, vertex) in versions {
                let mut published: PublishedType = serde_json::from_value(vertex.inner.schema)
                    .map_err(|e| {
                        Error::InvalidResponse(format!("vertex {base} v{version}: {e}"))
                    })?;
                published.archived = vertex.inner.metadata.archived;
                types.push(published);
            }
        }
        Ok(types)
    }
}

/// Body of the create endpoint
#[derive(Debug, Serialize)]
pub struct CreateRequest<'a> {
    pub schema: &'a PublishedType,
}

/// Body of the update endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest<'a> {
    pub type_to_update: &'a VersionedUrl,
    pub schema: &'a PublishedType,
}

/// Body of `PUT /ontology-types/archive`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest<'a> {
    pub type_to_archive: &'a VersionedUrl,
}
