//! Diff computation between the local and remote graphs
//!
//! Types are compared by their latest versions using structural equality
//! with version numbers erased, so re-publishing the same content never
//! shows up as a change. A local reference whose accepted range no longer
//! covers the version the remote type points at counts as a change.

use crate::builtin;
use crate::graph::TypeGraph;
use crate::model::{OntologyType, PropertyValues, TypeBody, TypeKind};
use crate::url::BaseUrl;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What has to happen to one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "camelCase")]
pub enum Change {
    /// Only exists locally; every local version is created in order
    Create { versions: Vec<u32> },
    /// Content differs; publish local version `local` as remote version `to`
    ///
    /// `to` moves up when older local versions are published first.
    Update { from: u32, to: u32, local: u32 },
    /// Nothing to do
    Unchanged { version: u32 },
    /// Only exists remotely; archive its latest version
    Remove { version: u32 },
}

impl Change {
    pub fn is_addition(&self) -> bool {
        matches!(self, Self::Create { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }
}

/// Members added to and removed from a set-valued field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for Membership<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T: Ord + Clone> Membership<T> {
    fn between<'a>(
        local: impl IntoIterator<Item = &'a T>,
        remote: impl IntoIterator<Item = &'a T>,
    ) -> Self
    where
        T: 'a,
    {
        let local: BTreeSet<&T> = local.into_iter().collect();
        let remote: BTreeSet<&T> = remote.into_iter().collect();
        Self {
            added: local.difference(&remote).map(|t| (*t).clone()).collect(),
            removed: remote.difference(&local).map(|t| (*t).clone()).collect(),
        }
    }
}

impl<T> Membership<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Field-level differences behind an update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChanges {
    /// Scalar fields that differ: `title`, `description`, `kind`, `type`, `archived`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,
    #[serde(default, skip_serializing_if = "Membership::is_empty")]
    pub one_of: Membership<PropertyValues<BaseUrl>>,
    #[serde(default, skip_serializing_if = "Membership::is_empty")]
    pub properties: Membership<BaseUrl>,
    /// Properties present on both sides with a different value shape
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_properties: Vec<BaseUrl>,
    #[serde(default, skip_serializing_if = "Membership::is_empty")]
    pub required: Membership<BaseUrl>,
    #[serde(default, skip_serializing_if = "Membership::is_empty")]
    pub links: Membership<BaseUrl>,
    /// Links present on both sides with different cardinality or ordering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_links: Vec<BaseUrl>,
    #[serde(default, skip_serializing_if = "Membership::is_empty")]
    pub inherits_from: Membership<BaseUrl>,
    /// References whose accepted range excludes the version the remote uses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repinned: Vec<BaseUrl>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
            && self.one_of.is_empty()
            && self.properties.is_empty()
            && self.changed_properties.is_empty()
            && self.required.is_empty()
            && self.links.is_empty()
            && self.changed_links.is_empty()
            && self.inherits_from.is_empty()
            && self.repinned.is_empty()
    }

    /// Compare a local type with the remote's latest version of it
    pub fn between(local: &OntologyType, remote: &OntologyType) -> Self {
        let mut changes = Self::default();
        if local.title != remote.title {
            changes.metadata.push("title".to_string());
        }
        if local.description != remote.description {
            changes.metadata.push("description".to_string());
        }
        if remote.archived {
            changes.metadata.push("archived".to_string());
        }

        match (local.body.erased(), remote.body.erased()) {
            (TypeBody::DataType(l), TypeBody::DataType(r)) => {
                if l != r {
                    changes.metadata.push("type".to_string());
                }
            }
            (TypeBody::PropertyType(l), TypeBody::PropertyType(r)) => {
                changes.one_of = Membership::between(&l.one_of, &r.one_of);
            }
            (TypeBody::EntityType(l), TypeBody::EntityType(r)) => {
                changes.properties = Membership::between(l.properties.keys(), r.properties.keys());
                changes.changed_properties = l
                    .properties
                    .iter()
                    .filter(|(key, value)| r.properties.get(*key).is_some_and(|other| other != *value))
                    .map(|(key, _)| key.clone())
                    .collect();
                changes.required = Membership::between(&l.required, &r.required);
                changes.inherits_from = Membership::between(&l.inherits_from, &r.inherits_from);

                let local_links: BTreeMap<_, _> = l.links.iter().map(|link| (&link.to, link)).collect();
                let remote_links: BTreeMap<_, _> = r.links.iter().map(|link| (&link.to, link)).collect();
                changes.links = Membership::between(
                    local_links.keys().copied(),
                    remote_links.keys().copied(),
                );
                changes.changed_links = local_links
                    .iter()
                    .filter(|(to, link)| remote_links.get(*to).is_some_and(|other| other != *link))
                    .map(|(to, _)| (*to).clone())
                    .collect();
            }
            _ => changes.metadata.push("kind".to_string()),
        }

        let remote_refs = remote.body.references();
        let repinned: BTreeSet<BaseUrl> = local
            .body
            .references()
            .into_iter()
            .filter(|(local_ref, _)| {
                let mut same_base = remote_refs
                    .iter()
                    .filter(|(r, _)| r.url.base == local_ref.url.base)
                    .peekable();
                same_base.peek().is_some()
                    && !same_base.any(|(r, _)| local_ref.range.contains(r.url.version))
            })
            .map(|(r, _)| r.url.base.clone())
            .collect();
        changes.repinned = repinned.into_iter().collect();

        changes
    }
}

/// Diff for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDiff {
    pub id: BaseUrl,
    pub kind: TypeKind,
    pub title: String,
    #[serde(flatten)]
    pub change: Change,
    #[serde(default, skip_serializing_if = "FieldChanges::is_empty")]
    pub fields: FieldChanges,
}

/// Diffs for every identifier known on either side, ordered by kind then identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub diffs: Vec<TypeDiff>,
}

impl ChangeSet {
    /// True when every identifier is unchanged
    pub fn is_empty(&self) -> bool {
        self.diffs.iter().all(|d| d.change.is_unchanged())
    }

    /// Diffs that require action
    pub fn changes(&self) -> impl Iterator<Item = &TypeDiff> {
        self.diffs.iter().filter(|d| !d.change.is_unchanged())
    }

    pub fn get(&self, id: &BaseUrl) -> Option<&TypeDiff> {
        self.diffs.iter().find(|d| &d.id == id)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(&self.diffs)
    }

    /// Pending changes grouped by type kind
    pub fn group_by_kind(&self) -> BTreeMap<TypeKind, Vec<&TypeDiff>> {
        let mut groups: BTreeMap<TypeKind, Vec<&TypeDiff>> = BTreeMap::new();
        for diff in self.changes() {
            groups.entry(diff.kind).or_default().push(diff);
        }
        groups
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Number of types to create
    pub additions: usize,
    /// Number of types to publish a new version of
    pub updates: usize,
    /// Number of types to archive
    pub removals: usize,
    /// Number of types already in sync
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[TypeDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                Change::Create { .. } => summary.additions += 1,
                Change::Update { .. } => summary.updates += 1,
                Change::Remove { .. } => summary.removals += 1,
                Change::Unchanged { .. } => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.updates + self.removals
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Compares a local graph against a remote snapshot
pub struct Differ<'a> {
    local: &'a TypeGraph,
    remote: &'a TypeGraph,
    ignored: BTreeSet<BaseUrl>,
}

impl<'a> Differ<'a> {
    pub fn new(local: &'a TypeGraph, remote: &'a TypeGraph) -> Self {
        Self {
            local,
            remote,
            ignored: BTreeSet::new(),
        }
    }

    /// Leave these identifiers out of the change set entirely
    ///
    /// Used for identifiers with rejected local versions, which must
    /// not be mistaken for remote-only types.
    #[must_use]
    pub fn ignore(mut self, ids: impl IntoIterator<Item = BaseUrl>) -> Self {
        self.ignored.extend(ids);
        self
    }

    pub fn diff(&self) -> ChangeSet {
        let ids: BTreeSet<&BaseUrl> = self
            .local
            .identifiers()
            .chain(self.remote.identifiers())
            .filter(|id| !self.ignored.contains(*id) && !builtin::is_builtin(id))
            .collect();

        let mut diffs: Vec<TypeDiff> = ids.into_iter().filter_map(|id| self.diff_one(id)).collect();
        diffs.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));
        diffs
            .iter()
            .filter(|d| !d.change.is_unchanged())
            .for_each(|d| log::debug!("{} {:?}", d.id, d.change));
        ChangeSet { diffs }
    }

    fn diff_one(&self, id: &BaseUrl) -> Option<TypeDiff> {
        let entry = |node: &OntologyType, change: Change, fields: FieldChanges| TypeDiff {
            id: id.clone(),
            kind: node.kind(),
            title: node.title.clone(),
            change,
            fields,
        };

        match (self.local.latest(id), self.remote.latest(id)) {
            (Some(local), None) => {
                let versions = self.local.versions(id).map(OntologyType::version).collect();
                Some(entry(local, Change::Create { versions }, FieldChanges::default()))
            }
            (Some(local), Some(remote)) => {
                let fields = FieldChanges::between(local, remote);
                let change = if fields.is_empty() {
                    Change::Unchanged {
                        version: remote.version(),
                    }
                } else {
                    Change::Update {
                        from: remote.version(),
                        to: remote.version() + 1,
                        local: local.version(),
                    }
                };
                Some(entry(local, change, fields))
            }
            (None, Some(remote)) if remote.archived => Some(entry(
                remote,
                Change::Unchanged {
                    version: remote.version(),
                },
                FieldChanges::default(),
            )),
            (None, Some(remote)) => Some(entry(
                remote,
                Change::Remove {
                    version: remote.version(),
                },
                FieldChanges::default(),
            )),
            (None, None) => None,
        }
    }
}

/// Diff `local` against `remote`
pub fn diff(local: &TypeGraph, remote: &TypeGraph) -> ChangeSet {
    Differ::new(local, remote).diff()
}
