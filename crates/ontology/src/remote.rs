//! Registry abstraction and in-process implementations
//!
//! [`Remote`] is the seam between the reconcile pipeline and a concrete
//! registry. The HTTP client lives in its own crate; this module provides
//! [`MemoryRemote`] for tests and offline use, and [`DryRun`], which
//! reads through to another remote but only records writes.
//!
//! # Testing
//!
//! ```
//! use ontology::{MemoryRemote, Remote};
//!
//! let remote = MemoryRemote::new();
//! assert!(remote.fetch_snapshot(None).unwrap().is_empty());
//! ```

use crate::builtin;
use crate::error::RemoteError;
use crate::model::PublishedType;
use crate::url::{BaseUrl, VersionedUrl};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// A type registry the pipeline can read from and publish to.
///
/// Implementations must be safe to call from several worker threads at
/// once; the executor never issues two calls for the same identifier
/// concurrently.
pub trait Remote: Send + Sync {
    /// Every published type version, optionally limited to identifiers
    /// under the given base URL prefixes.
    fn fetch_snapshot(&self, scope: Option<&[BaseUrl]>) -> Result<Vec<PublishedType>, RemoteError>;

    /// Publish the first version of a new type.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AlreadyExists` if that exact version is
    /// already published.
    fn create_type(&self, payload: &PublishedType) -> Result<(), RemoteError>;

    /// Publish `target`, the version following the current latest one.
    fn update_type(&self, target: &VersionedUrl, payload: &PublishedType) -> Result<(), RemoteError>;

    /// Mark a published version as archived.
    fn archive_type(&self, target: &VersionedUrl) -> Result<(), RemoteError>;

    /// Short human-readable name for logs and summaries
    fn describe(&self) -> String {
        "registry".to_string()
    }
}

/// Whether `base` falls inside `scope` (no scope means everything)
pub fn in_scope(base: &BaseUrl, scope: Option<&[BaseUrl]>) -> bool {
    scope.is_none_or(|prefixes| prefixes.iter().any(|prefix| base.starts_with(prefix)))
}

/// A write issued against a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(VersionedUrl),
    Update(VersionedUrl),
    Archive(VersionedUrl),
}

impl RemoteCall {
    pub fn target(&self) -> &VersionedUrl {
        match self {
            Self::Create(url) | Self::Update(url) | Self::Archive(url) => url,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    types: BTreeMap<VersionedUrl, PublishedType>,
    failures: BTreeMap<VersionedUrl, (RemoteError, Option<usize>)>,
    snapshot_failure: Option<RemoteError>,
    calls: Vec<RemoteCall>,
    in_flight: BTreeSet<BaseUrl>,
    overlapped: bool,
    active: usize,
    peak: usize,
}

impl MemoryState {
    fn take_failure(&mut self, target: &VersionedUrl) -> Option<RemoteError> {
        let (error, remaining) = self.failures.get_mut(target)?;
        let error = error.clone();
        match remaining {
            None => {}
            Some(0) => return None,
            Some(n) => *n -= 1,
        }
        Some(error)
    }

    fn check_references(&self, payload: &PublishedType) -> Result<(), RemoteError> {
        for (url, _) in payload.body.references() {
            if !self.types.contains_key(url) && builtin::get(url).is_none() {
                return Err(RemoteError::rejected(
                    &payload.id,
                    format!("unknown reference {url}"),
                ));
            }
        }
        Ok(())
    }

    fn latest_version(&self, base: &BaseUrl) -> Option<u32> {
        self.types
            .keys()
            .filter(|url| &url.base == base)
            .map(|url| url.version)
            .max()
    }
}

/// In-memory registry with fault injection, for tests and offline runs.
///
/// Writes are validated the way a registry would: versions must be
/// published in order and every reference must already be published.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
    latency: Duration,
}

impl MemoryRemote {
    /// Create a new empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every write by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a published type without recording a call.
    pub fn publish(&self, published: PublishedType) {
        self.lock().types.insert(published.id.clone(), published);
    }

    /// Fail every write to `target` with `error`
    pub fn fail(&self, target: VersionedUrl, error: RemoteError) {
        self.lock().failures.insert(target, (error, None));
    }

    /// Fail the next `times` writes to `target` with `error`
    pub fn fail_times(&self, target: VersionedUrl, error: RemoteError, times: usize) {
        self.lock().failures.insert(target, (error, Some(times)));
    }

    pub fn fail_snapshot(&self, error: RemoteError) {
        self.lock().snapshot_failure = Some(error);
    }

    pub fn get(&self, url: &VersionedUrl) -> Option<PublishedType> {
        self.lock().types.get(url).cloned()
    }

    pub fn latest_version(&self, base: &BaseUrl) -> Option<u32> {
        self.lock().latest_version(base)
    }

    /// Every published version
    pub fn types(&self) -> Vec<PublishedType> {
        self.lock().types.values().cloned().collect()
    }

    /// Writes received so far, in arrival order
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Highest number of writes that were in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.lock().peak
    }

    /// Whether two writes for the same identifier ever overlapped
    pub fn overlapped(&self) -> bool {
        self.lock().overlapped
    }

    fn write<F>(&self, call: RemoteCall, apply: F) -> Result<(), RemoteError>
    where
        F: FnOnce(&mut MemoryState) -> Result<(), RemoteError>,
    {
        let base = call.target().base.clone();
        {
            let mut state = self.lock();
            state.calls.push(call.clone());
            state.active += 1;
            state.peak = state.peak.max(state.active);
            if !state.in_flight.insert(base.clone()) {
                state.overlapped = true;
            }
        }

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut state = self.lock();
        state.active -= 1;
        state.in_flight.remove(&base);
        if let Some(error) = state.take_failure(call.target()) {
            return Err(error);
        }
        apply(&mut state)
    }
}

impl Remote for MemoryRemote {
    fn fetch_snapshot(&self, scope: Option<&[BaseUrl]>) -> Result<Vec<PublishedType>, RemoteError> {
        let state = self.lock();
        if let Some(error) = &state.snapshot_failure {
            return Err(error.clone());
        }
        Ok(state
            .types
            .values()
            .filter(|t| in_scope(t.base(), scope))
            .cloned()
            .collect())
    }

    fn create_type(&self, payload: &PublishedType) -> Result<(), RemoteError> {
        let target = payload.id.clone();
        self.write(RemoteCall::Create(target.clone()), |state| {
            if state.types.contains_key(&target) {
                return Err(RemoteError::AlreadyExists { target });
            }
            if target.version != 1 {
                return Err(RemoteError::rejected(&target, "new types start at version 1"));
            }
            state.check_references(payload)?;
            state.types.insert(target, payload.clone());
            Ok(())
        })
    }

    fn update_type(&self, target: &VersionedUrl, payload: &PublishedType) -> Result<(), RemoteError> {
        let target = target.clone();
        self.write(RemoteCall::Update(target.clone()), |state| {
            if state.types.contains_key(&target) {
                return Err(RemoteError::AlreadyExists { target });
            }
            match state.latest_version(&target.base) {
                None => {
                    return Err(RemoteError::NotFound {
                        target: target.base.to_string(),
                    });
                }
                Some(latest) if latest + 1 != target.version => {
                    return Err(RemoteError::rejected(
                        &target,
                        format!("latest published version is {latest}"),
                    ));
                }
                Some(_) => {}
            }
            state.check_references(payload)?;
            let mut published = payload.clone();
            published.id = target.clone();
            state.types.insert(target, published);
            Ok(())
        })
    }

    fn archive_type(&self, target: &VersionedUrl) -> Result<(), RemoteError> {
        let target = target.clone();
        self.write(RemoteCall::Archive(target.clone()), |state| {
            let published = state
                .types
                .get_mut(&target)
                .ok_or_else(|| RemoteError::NotFound {
                    target: target.to_string(),
                })?;
            published.archived = true;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        "in-memory registry".to_string()
    }
}

/// Reads through to another remote and records writes instead of sending them
pub struct DryRun {
    inner: Option<Arc<dyn Remote>>,
    recorded: Mutex<Vec<RemoteCall>>,
}

impl DryRun {
    pub fn new(inner: Arc<dyn Remote>) -> Self {
        Self {
            inner: Some(inner),
            recorded: Mutex::default(),
        }
    }

    /// A dry run with no remote behind it; the snapshot is empty
    pub fn detached() -> Self {
        Self {
            inner: None,
            recorded: Mutex::default(),
        }
    }

    /// Writes that would have been sent
    pub fn recorded(&self) -> Vec<RemoteCall> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: RemoteCall) {
        log::info!("dry run: {call:?}");
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Remote for DryRun {
    fn fetch_snapshot(&self, scope: Option<&[BaseUrl]>) -> Result<Vec<PublishedType>, RemoteError> {
        match &self.inner {
            Some(inner) => inner.fetch_snapshot(scope),
            None => Ok(Vec::new()),
        }
    }

    fn create_type(&self, payload: &PublishedType) -> Result<(), RemoteError> {
        self.record(RemoteCall::Create(payload.id.clone()));
        Ok(())
    }

    fn update_type(&self, target: &VersionedUrl, _payload: &PublishedType) -> Result<(), RemoteError> {
        self.record(RemoteCall::Update(target.clone()));
        Ok(())
    }

    fn archive_type(&self, target: &VersionedUrl) -> Result<(), RemoteError> {
        self.record(RemoteCall::Archive(target.clone()));
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.inner {
            Some(inner) => format!("dry run against {}", inner.describe()),
            None => "dry run".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OntologyType, Primitive, PropertyType, PropertyValues, TypeBody};

    fn name(version: u32) -> PublishedType {
        OntologyType {
            id: BaseUrl::new("https://example.com/property-type/name/")
                .unwrap()
                .at(version),
            title: "Name".to_string(),
            description: None,
            archived: false,
            body: TypeBody::PropertyType(PropertyType {
                one_of: [PropertyValues::DataType(
                    builtin::data_type(Primitive::Text).at(1),
                )]
                .into(),
            }),
        }
    }

    #[test]
    fn test_create_then_already_exists() {
        let remote = MemoryRemote::new();
        remote.create_type(&name(1)).unwrap();
        assert!(matches!(
            remote.create_type(&name(1)),
            Err(RemoteError::AlreadyExists { .. })
        ));
        assert_eq!(remote.calls().len(), 2);
    }

    #[test]
    fn test_update_must_follow_latest() {
        let remote = MemoryRemote::new();
        let v2 = name(2);
        assert!(matches!(
            remote.update_type(&v2.id, &v2),
            Err(RemoteError::NotFound { .. })
        ));

        remote.create_type(&name(1)).unwrap();
        let v3 = name(3);
        assert!(matches!(
            remote.update_type(&v3.id, &v3),
            Err(RemoteError::Rejected { .. })
        ));
        remote.update_type(&v2.id, &v2).unwrap();
        assert_eq!(remote.latest_version(v2.base()), Some(2));
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let remote = MemoryRemote::new();
        let mut payload = name(1);
        payload.body = TypeBody::PropertyType(PropertyType {
            one_of: [PropertyValues::DataType(
                BaseUrl::new("https://example.com/data-type/custom/").unwrap().at(1),
            )]
            .into(),
        });
        assert!(matches!(
            remote.create_type(&payload),
            Err(RemoteError::Rejected { .. })
        ));
    }

    #[test]
    fn test_archive() {
        let remote = MemoryRemote::new();
        let v1 = name(1);
        assert!(matches!(
            remote.archive_type(&v1.id),
            Err(RemoteError::NotFound { .. })
        ));
        remote.publish(v1.clone());
        remote.archive_type(&v1.id).unwrap();
        assert!(remote.get(&v1.id).unwrap().archived);
    }

    #[test]
    fn test_injected_failures() {
        let remote = MemoryRemote::new();
        let v1 = name(1);
        remote.fail_times(v1.id.clone(), RemoteError::network("reset", None), 1);
        assert!(remote.create_type(&v1).is_err());
        assert!(remote.create_type(&v1).is_ok());

        remote.fail_snapshot(RemoteError::network("down", Some(503)));
        assert!(remote.fetch_snapshot(None).is_err());
    }

    #[test]
    fn test_snapshot_scope() {
        let remote = MemoryRemote::new();
        remote.publish(name(1));
        let inside = [BaseUrl::new("https://example.com/property-type/").unwrap()];
        let outside = [BaseUrl::new("https://other.example/").unwrap()];
        assert_eq!(remote.fetch_snapshot(Some(&inside)).unwrap().len(), 1);
        assert!(remote.fetch_snapshot(Some(&outside)).unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_records_without_writing() {
        let inner = MemoryRemote::new();
        inner.publish(name(1));
        let dry = DryRun::new(Arc::new(inner.clone()));

        assert_eq!(dry.fetch_snapshot(None).unwrap().len(), 1);
        let v2 = name(2);
        dry.update_type(&v2.id, &v2).unwrap();
        dry.archive_type(&name(1).id).unwrap();

        assert_eq!(dry.recorded().len(), 2);
        assert!(inner.calls().is_empty());
        assert_eq!(inner.latest_version(v2.base()), Some(1));
    }
}
