//! Remote snapshot fetching
//!
//! The registry's published types are normalized into the same
//! [`TypeGraph`] shape as the local graph so the differ compares like with
//! like. Remote references are exact, so every reference accepts only the
//! version it names.

use crate::builtin;
use crate::error::RemoteError;
use crate::graph::TypeGraph;
use crate::model::PublishedType;
use crate::remote::{Remote, in_scope};
use crate::url::BaseUrl;

/// Fetch the registry's current state, optionally limited to `scope`
///
/// The whole snapshot is fetched before anything is returned; a failed
/// fetch yields no partial graph.
pub fn fetch(remote: &dyn Remote, scope: Option<&[BaseUrl]>) -> Result<TypeGraph, RemoteError> {
    log::debug!("fetching snapshot from {}", remote.describe());
    let published = remote.fetch_snapshot(scope)?;
    let graph = normalize(
        published
            .into_iter()
            .filter(|t| in_scope(t.base(), scope)),
    );
    log::info!(
        "remote snapshot: {} types, {} versions",
        graph.identifiers().count(),
        graph.len()
    );
    Ok(graph)
}

/// Turn published types into a graph, dropping built-ins and duplicates
pub fn normalize(published: impl IntoIterator<Item = PublishedType>) -> TypeGraph {
    let mut graph = TypeGraph::new();
    for published in published {
        if builtin::is_builtin(published.base()) {
            continue;
        }
        if graph.contains(&published.id) {
            log::warn!("registry returned {} more than once", published.id);
            continue;
        }
        graph.insert(published.into_node());
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, OntologyType, Primitive, TypeBody};
    use crate::remote::MemoryRemote;

    fn data(base: &str, version: u32) -> PublishedType {
        OntologyType {
            id: BaseUrl::new(base).unwrap().at(version),
            title: "Data".to_string(),
            description: None,
            archived: false,
            body: TypeBody::DataType(DataType {
                primitive: Primitive::Text,
            }),
        }
    }

    #[test]
    fn test_normalize_drops_builtins_and_duplicates() {
        let text = builtin::all()[0].published();
        let graph = normalize([
            text,
            data("https://example.com/data-type/slug/", 1),
            data("https://example.com/data-type/slug/", 1),
            data("https://example.com/data-type/slug/", 2),
        ]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.identifiers().count(), 1);
    }

    #[test]
    fn test_fetch_scoped() {
        let remote = MemoryRemote::new();
        remote.publish(data("https://example.com/@acme/types/data-type/slug/", 1));
        remote.publish(data("https://example.com/@other/types/data-type/slug/", 1));

        let scope = [BaseUrl::new("https://example.com/@acme/").unwrap()];
        let graph = fetch(&remote, Some(&scope)).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(fetch(&remote, None).unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_failure_returns_error() {
        let remote = MemoryRemote::new();
        remote.fail_snapshot(RemoteError::network("unreachable", None));
        assert!(fetch(&remote, None).is_err());
    }
}
