//! Blocking HTTP implementation of [`Remote`].

use crate::error::{Error, Result};
use crate::wire::{ArchiveRequest, CreateRequest, QueryRequest, QueryResponse, UpdateRequest};
use ontology::{BaseUrl, PublishedType, Remote, RemoteError, TypeKind, VersionedUrl};
use serde::Serialize;
use std::time::Duration;
use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Body, RequestBuilder};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ontosync/", env!("CARGO_PKG_VERSION"));

/// Registry client over HTTP.
///
/// # Example
///
/// ```no_run
/// use ontology::Remote;
/// use registry::RegistryClient;
///
/// let client = RegistryClient::new("http://localhost:4000");
/// let types = client.fetch_snapshot(None).unwrap();
/// println!("{} published type versions", types.len());
/// ```
pub struct RegistryClient {
    agent: ureq::Agent,
    url: String,
}

impl RegistryClient {
    /// Create a client with the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    #[must_use]
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        // Error statuses come back as responses so their bodies can be read
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the registry base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn query_url(&self) -> String {
        format!("{}/ontology-types/query", self.url)
    }

    fn kind_url(&self, kind: TypeKind) -> String {
        format!("{}/{}s", self.url, kind.path_segment())
    }

    fn archive_url(&self) -> String {
        format!("{}/ontology-types/archive", self.url)
    }

    fn query(&self, scope: Option<&[BaseUrl]>) -> Result<QueryResponse> {
        let request = self.agent.post(&self.query_url());
        let mut response = send(request, &QueryRequest::new(scope))?;
        Ok(response.body_mut().read_json()?)
    }
}

impl Remote for RegistryClient {
    fn fetch_snapshot(&self, scope: Option<&[BaseUrl]>) -> std::result::Result<Vec<PublishedType>, RemoteError> {
        log::debug!("querying {}", self.query_url());
        let types = self.query(scope).and_then(QueryResponse::into_types)?;
        log::debug!("registry returned {} type versions", types.len());
        Ok(types)
    }

    fn create_type(&self, payload: &PublishedType) -> std::result::Result<(), RemoteError> {
        let request = self.agent.post(&self.kind_url(payload.kind()));
        send(request, &CreateRequest { schema: payload })
            .map(drop)
            .map_err(|e| e.for_target(&payload.id))
    }

    fn update_type(&self, target: &VersionedUrl, payload: &PublishedType) -> std::result::Result<(), RemoteError> {
        let request = self.agent.put(&self.kind_url(payload.kind()));
        let body = UpdateRequest {
            type_to_update: target,
            schema: payload,
        };
        send(request, &body)
            .map(drop)
            .map_err(|e| e.for_target(target))
    }

    fn archive_type(&self, target: &VersionedUrl) -> std::result::Result<(), RemoteError> {
        let request = self.agent.put(&self.archive_url());
        send(request, &ArchiveRequest { type_to_archive: target })
            .map(drop)
            .map_err(|e| e.for_target(target))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Send a JSON body and turn error statuses into [`Error::Status`]
fn send(request: RequestBuilder<WithBody>, body: &impl Serialize) -> Result<Response<Body>> {
    let mut response = request
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .send_json(body)?;

    let status = response.status().as_u16();
    if status >= 400 {
        let text = response.body_mut().read_to_string().unwrap_or_default();
        return Err(Error::status(status, &text));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = RegistryClient::new("http://localhost:4000/");
        assert_eq!(client.url(), "http://localhost:4000");
        assert_eq!(client.query_url(), "http://localhost:4000/ontology-types/query");
        assert_eq!(
            client.kind_url(TypeKind::EntityType),
            "http://localhost:4000/entity-types"
        );
        assert_eq!(
            client.kind_url(TypeKind::DataType),
            "http://localhost:4000/data-types"
        );
        assert_eq!(client.archive_url(), "http://localhost:4000/ontology-types/archive");
    }

    #[test]
    fn test_describe_is_the_url() {
        let client = RegistryClient::with_timeout("https://types.example.com", Duration::from_secs(1));
        assert_eq!(client.describe(), "https://types.example.com");
    }

    #[test]
    fn test_unreachable_registry_is_a_network_error() {
        // Port 9 (discard) is not expected to accept HTTP connections
        let client = RegistryClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500));
        let err = client.fetch_snapshot(None).unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }
}
