//! Execution planning
//!
//! Turns a [`ChangeSet`] into an ordered list of registry operations. Each
//! operation only runs after everything it references has been published.
//!
//! Entity types that link to each other in a cycle cannot all be published
//! first. Each entity on such a cycle is published in two steps: a shell
//! version without its links, then a following version that attaches them.
//! Cycles that do not go through a link are an error.

use crate::builder::find_cycles;
use crate::diff::{Change, ChangeSet};
use crate::error::PlanError;
use crate::graph::TypeGraph;
use crate::model::{EdgeKind, OntologyType, PublishedType, Reference, TypeBody, TypeKind};
use crate::url::{BaseUrl, TypeRef, VersionedUrl};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single registry write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    CreateType {
        target: VersionedUrl,
        payload: PublishedType,
    },
    UpdateType {
        target: VersionedUrl,
        payload: PublishedType,
    },
    ArchiveType {
        target: VersionedUrl,
    },
}

impl Operation {
    pub fn target(&self) -> &VersionedUrl {
        match self {
            Self::CreateType { target, .. }
            | Self::UpdateType { target, .. }
            | Self::ArchiveType { target } => target,
        }
    }

    pub fn payload(&self) -> Option<&PublishedType> {
        match self {
            Self::CreateType { payload, .. } | Self::UpdateType { payload, .. } => Some(payload),
            Self::ArchiveType { .. } => None,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::CreateType { .. } => "create",
            Self::UpdateType { .. } => "update",
            Self::ArchiveType { .. } => "archive",
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::ArchiveType { .. })
    }
}

/// Why an operation is in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Purpose {
    /// Publish a local version as is
    Publish,
    /// Publish an entity type without its links
    Shell,
    /// Publish the version that adds links to a shell
    AttachLinks,
    /// Archive a type no longer declared locally
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedOperation {
    pub index: usize,
    #[serde(flatten)]
    pub op: Operation,
    pub purpose: Purpose,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,
}

/// Ordered operations; every operation comes after all of its dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub operations: Vec<PlannedOperation>,
}

/// Plan summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub archives: usize,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedOperation> {
        self.operations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&PlannedOperation> {
        self.operations.get(index)
    }

    fn push(&mut self, op: Operation, purpose: Purpose, depends_on: Vec<usize>) -> usize {
        let index = self.operations.len();
        self.operations.push(PlannedOperation {
            index,
            op,
            purpose,
            depends_on,
        });
        index
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for planned in &self.operations {
            match planned.op {
                Operation::CreateType { .. } => summary.creates += 1,
                Operation::UpdateType { .. } => summary.updates += 1,
                Operation::ArchiveType { .. } => summary.archives += 1,
            }
        }
        summary
    }

    /// Check a plan read from disk before executing it
    pub fn validate(&self) -> Result<(), PlanError> {
        for (position, planned) in self.operations.iter().enumerate() {
            if planned.index != position {
                return Err(PlanError::Malformed {
                    index: position,
                    reason: format!("recorded index is {}", planned.index),
                });
            }
            if let Some(&dependency) = planned.depends_on.iter().find(|&&d| d >= position) {
                return Err(PlanError::InvalidOrder {
                    index: position,
                    dependency,
                });
            }
            if let Some(payload) = planned.op.payload()
                && &payload.id != planned.op.target()
            {
                return Err(PlanError::Malformed {
                    index: position,
                    reason: format!("payload {} does not match target", payload.id),
                });
            }
        }
        Ok(())
    }
}

/// A local type version that has to be published
struct Step<'a> {
    node: &'a OntologyType,
    /// Step for the previous version of the same type
    previous: Option<usize>,
    /// Planned steps this one references
    refs: Vec<(usize, EdgeKind)>,
    /// Link targets that also have an accepted version in the registry
    published_links: BTreeSet<usize>,
    /// Link destinations pinned to their registry version rather than the planned one
    remote_links: BTreeSet<BaseUrl>,
    split: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Full,
    Shell,
    Attach,
}

struct PendingOp {
    step: usize,
    stage: Stage,
    version: u32,
    deps: BTreeSet<usize>,
}

/// Plans changes against a local graph and the remote snapshot it was diffed with
pub struct Planner<'a> {
    local: &'a TypeGraph,
    remote: &'a TypeGraph,
}

impl<'a> Planner<'a> {
    pub fn new(local: &'a TypeGraph, remote: &'a TypeGraph) -> Self {
        Self { local, remote }
    }

    pub fn plan(&self, changes: &ChangeSet) -> Result<Plan, PlanError> {
        let (mut steps, archives) = self.collect(changes)?;
        let planned: BTreeMap<VersionedUrl, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.node.id.clone(), i))
            .collect();

        self.link(&mut steps, &planned)?;
        split_link_cycles(&mut steps)?;
        let (ops, first) = self.expand(&steps);
        let order = order(&steps, &ops)?;

        let mut plan = Plan::new();
        let mut position = vec![0; ops.len()];
        for &o in &order {
            let op = &ops[o];
            let payload = self.payload(&steps, &ops, &first, &planned, o);
            let target = payload.id.clone();
            let operation = if op.version == 1 {
                Operation::CreateType { target, payload }
            } else {
                Operation::UpdateType { target, payload }
            };
            let purpose = match op.stage {
                Stage::Full => Purpose::Publish,
                Stage::Shell => Purpose::Shell,
                Stage::Attach => Purpose::AttachLinks,
            };
            let depends_on = op.deps.iter().map(|d| position[*d]).collect::<BTreeSet<_>>();
            position[o] = plan.push(operation, purpose, depends_on.into_iter().collect());
        }

        for target in archives.into_iter().rev() {
            plan.push(Operation::ArchiveType { target }, Purpose::Archive, Vec::new());
        }

        let summary = plan.summary();
        log::info!(
            "planned {} operations ({} create, {} update, {} archive)",
            plan.len(),
            summary.creates,
            summary.updates,
            summary.archives
        );
        Ok(plan)
    }

    fn collect(&self, changes: &ChangeSet) -> Result<(Vec<Step<'a>>, Vec<VersionedUrl>), PlanError> {
        let mut publish: Vec<(&BaseUrl, BTreeSet<u32>)> = Vec::new();
        let mut updated: BTreeMap<&BaseUrl, usize> = BTreeMap::new();
        let mut archives = Vec::new();
        for diff in changes.changes() {
            match &diff.change {
                Change::Create { versions } => {
                    publish.push((&diff.id, versions.iter().copied().collect()));
                }
                Change::Update { local, .. } => {
                    updated.insert(&diff.id, publish.len());
                    publish.push((&diff.id, BTreeSet::from([*local])));
                }
                Change::Remove { version } => archives.push(diff.id.at(*version)),
                Change::Unchanged { .. } => {}
            }
        }
        self.include_pinned_versions(&mut publish, &updated);

        let mut steps = Vec::new();
        for (base, versions) in publish {
            let mut previous = None;
            for version in versions {
                let id = base.at(version);
                let node = self.local.get(&id).ok_or(PlanError::MissingLocal { id })?;
                steps.push(Step {
                    node,
                    previous,
                    refs: Vec::new(),
                    published_links: BTreeSet::new(),
                    remote_links: BTreeSet::new(),
                    split: false,
                });
                previous = Some(steps.len() - 1);
            }
        }
        Ok((steps, archives))
    }

    /// Add older local versions of updated types that planned types pin to
    ///
    /// An update only publishes the latest local version. A reference whose
    /// range excludes it resolves to an older local version, which has to be
    /// published too unless the registry already has one in range.
    fn include_pinned_versions(
        &self,
        publish: &mut [(&BaseUrl, BTreeSet<u32>)],
        updated: &BTreeMap<&BaseUrl, usize>,
    ) {
        let mut pending: Vec<VersionedUrl> = publish
            .iter()
            .flat_map(|(base, versions)| versions.iter().map(|v| base.at(*v)))
            .collect();
        while let Some(id) = pending.pop() {
            let Some(node) = self.local.get(&id) else {
                continue;
            };
            for (reference, _) in node.body.references() {
                let Some(&slot) = updated.get(&reference.url.base) else {
                    continue;
                };
                if self.published_version(reference).is_some() || !self.local.contains(&reference.url) {
                    continue;
                }
                if publish[slot].1.insert(reference.url.version) {
                    log::debug!("{} pins {}, publishing it before the update", id, reference.url);
                    pending.push(reference.url.clone());
                }
            }
        }
    }

    /// Record planned targets; everything else must already be published
    fn link(&self, steps: &mut [Step<'a>], planned: &BTreeMap<VersionedUrl, usize>) -> Result<(), PlanError> {
        for (i, step) in steps.iter_mut().enumerate() {
            for (reference, edge) in step.node.body.references() {
                match planned.get(&reference.url) {
                    Some(&target) if target == i => {}
                    Some(&target) => {
                        if edge.is_link() && self.published_version(reference).is_some() {
                            step.published_links.insert(target);
                        }
                        step.refs.push((target, edge));
                    }
                    None if self.published_version(reference).is_some() => {}
                    None => {
                        return Err(PlanError::UnpublishedReference {
                            from: step.node.id.clone(),
                            reference: TypeRef::new(reference.url.base.clone(), reference.range),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn published_version(&self, reference: &Reference) -> Option<u32> {
        self.remote
            .highest_in_range(&reference.url.base, &reference.range)
    }

    /// Allocate operations and registry versions for every step
    fn expand(&self, steps: &[Step<'_>]) -> (Vec<PendingOp>, Vec<usize>) {
        let mut ops = Vec::new();
        let mut first = Vec::with_capacity(steps.len());
        let mut last = Vec::with_capacity(steps.len());
        let mut next_version: BTreeMap<&BaseUrl, u32> = BTreeMap::new();

        for (i, step) in steps.iter().enumerate() {
            let base = step.node.base();
            let version = next_version
                .entry(base)
                .or_insert_with(|| self.remote.latest_version(base).unwrap_or(0) + 1);

            let stages: &[Stage] = if step.split {
                &[Stage::Shell, Stage::Attach]
            } else {
                &[Stage::Full]
            };
            first.push(ops.len());
            for stage in stages {
                ops.push(PendingOp {
                    step: i,
                    stage: *stage,
                    version: *version,
                    deps: BTreeSet::new(),
                });
                *version += 1;
            }
            last.push(ops.len() - 1);
        }

        for (i, step) in steps.iter().enumerate() {
            let chain = step.previous.map(|p| last[p]);
            let (head, tail) = (first[i], last[i]);
            ops[head].deps.extend(chain);
            for (target, edge) in &step.refs {
                let holder = if step.split && edge.is_link() { tail } else { head };
                ops[holder].deps.insert(first[*target]);
            }
            if step.split {
                ops[tail].deps.insert(head);
            }
        }

        (ops, first)
    }

    fn payload(
        &self,
        steps: &[Step<'_>],
        ops: &[PendingOp],
        first: &[usize],
        planned: &BTreeMap<VersionedUrl, usize>,
        o: usize,
    ) -> PublishedType {
        let op = &ops[o];
        let step = &steps[op.step];
        let node = step.node;
        let resolve = |reference: &Reference, edge: EdgeKind| -> VersionedUrl {
            let version = match planned.get(&reference.url) {
                Some(_) if edge.is_link() && step.remote_links.contains(&reference.url.base) => self
                    .published_version(reference)
                    .unwrap_or(reference.url.version),
                Some(&target) => ops[first[target]].version,
                None => self
                    .published_version(reference)
                    .unwrap_or(reference.url.version),
            };
            reference.url.base.at(version)
        };

        let body = match (&node.body, op.stage) {
            (TypeBody::EntityType(entity), Stage::Shell) => {
                TypeBody::EntityType(entity.without_links()).map(resolve)
            }
            (body, _) => body.map(resolve),
        };

        PublishedType {
            id: node.base().at(op.version),
            title: node.title.clone(),
            description: node.description.clone(),
            archived: false,
            body,
        }
    }
}

/// Plan `changes`, computed by diffing `local` against `remote`
pub fn plan(changes: &ChangeSet, local: &TypeGraph, remote: &TypeGraph) -> Result<Plan, PlanError> {
    Planner::new(local, remote).plan(changes)
}

/// Break link cycles among planned steps
///
/// A link into the cycle that the registry can already satisfy is pinned to
/// the registry version. Entity types on cycles that remain are marked for
/// two-step publishing.
fn split_link_cycles(steps: &mut [Step<'_>]) -> Result<(), PlanError> {
    loop {
        let adjacency: Vec<Vec<usize>> = steps
            .iter()
            .map(|step| {
                step.previous
                    .into_iter()
                    .chain(step.refs.iter().map(|(target, _)| *target))
                    .collect()
            })
            .collect();

        let mut retargeted = false;
        for component in strongly_connected(&adjacency) {
            if component.len() < 2 {
                continue;
            }
            let members: BTreeSet<usize> = component.iter().copied().collect();

            let structural: BTreeMap<VersionedUrl, Vec<VersionedUrl>> = component
                .iter()
                .map(|&i| {
                    let step = &steps[i];
                    let targets = step
                        .previous
                        .into_iter()
                        .chain(
                            step.refs
                                .iter()
                                .filter(|(_, edge)| !edge.is_link())
                                .map(|(target, _)| *target),
                        )
                        .filter(|target| members.contains(target))
                        .map(|target| steps[target].node.id.clone())
                        .collect();
                    (step.node.id.clone(), targets)
                })
                .collect();
            if let Some(cycle) = find_cycles(&structural).into_iter().next() {
                return Err(PlanError::UnsatisfiableDependency { cycle });
            }

            let (published, unpublished): (Vec<_>, Vec<_>) = component
                .iter()
                .map(|&i| {
                    let targets: BTreeSet<usize> = steps[i]
                        .refs
                        .iter()
                        .filter(|(target, edge)| edge.is_link() && members.contains(target))
                        .map(|(target, _)| *target)
                        .collect();
                    (i, targets)
                })
                .filter(|(_, targets)| !targets.is_empty())
                .partition(|(i, targets)| targets.is_subset(&steps[*i].published_links));

            if !published.is_empty() {
                for (i, targets) in published {
                    log::debug!("{} links into a cycle of published types", steps[i].node.id);
                    let bases: Vec<BaseUrl> = targets
                        .iter()
                        .map(|&target| steps[target].node.base().clone())
                        .collect();
                    let step = &mut steps[i];
                    step.refs
                        .retain(|(target, edge)| !(edge.is_link() && targets.contains(target)));
                    step.remote_links.extend(bases);
                }
                retargeted = true;
                continue;
            }

            for (i, _) in unpublished {
                log::debug!("{} links into a cycle, publishing links separately", steps[i].node.id);
                steps[i].split = true;
            }
        }

        if !retargeted {
            return Ok(());
        }
    }
}

/// Topological order over operations, preferring data, then property, then entity types
fn order(steps: &[Step<'_>], ops: &[PendingOp]) -> Result<Vec<usize>, PlanError> {
    let key = |i: usize| -> (TypeKind, BaseUrl, u32, usize) {
        let node = steps[ops[i].step].node;
        (node.kind(), node.base().clone(), ops[i].version, i)
    };

    let mut remaining: Vec<usize> = ops.iter().map(|op| op.deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
    for (i, op) in ops.iter().enumerate() {
        for &dependency in &op.deps {
            dependents[dependency].push(i);
        }
    }

    let mut ready: BTreeSet<_> = (0..ops.len())
        .filter(|&i| remaining[i] == 0)
        .map(key)
        .collect();
    let mut order = Vec::with_capacity(ops.len());
    while let Some((_, _, _, i)) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(key(dependent));
            }
        }
    }

    if order.len() < ops.len() {
        let publish_url = |i: usize| steps[ops[i].step].node.base().at(ops[i].version);
        let stuck: BTreeMap<VersionedUrl, Vec<VersionedUrl>> = (0..ops.len())
            .filter(|&i| remaining[i] > 0)
            .map(|i| {
                let deps = ops[i]
                    .deps
                    .iter()
                    .filter(|&&d| remaining[d] > 0)
                    .map(|&d| publish_url(d))
                    .collect();
                (publish_url(i), deps)
            })
            .collect();
        let cycle = find_cycles(&stuck)
            .into_iter()
            .next()
            .unwrap_or_else(|| stuck.keys().cloned().collect());
        return Err(PlanError::UnsatisfiableDependency { cycle });
    }
    Ok(order)
}

/// Tarjan's strongly connected components over index adjacency lists
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct Tarjan<'g> {
        adjacency: &'g [Vec<usize>],
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        components: Vec<Vec<usize>>,
    }

    impl Tarjan<'_> {
        fn connect(&mut self, v: usize) {
            self.index[v] = Some(self.next);
            self.low[v] = self.next;
            self.next += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            let adjacency = self.adjacency;
            for &w in &adjacency[v] {
                match self.index[w] {
                    None => {
                        self.connect(w);
                        self.low[v] = self.low[v].min(self.low[w]);
                    }
                    Some(index) if self.on_stack[w] => {
                        self.low[v] = self.low[v].min(index);
                    }
                    Some(_) => {}
                }
            }

            if self.index[v] == Some(self.low[v]) {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let n = adjacency.len();
    let mut tarjan = Tarjan {
        adjacency,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in 0..n {
        if tarjan.index[v].is_none() {
            tarjan.connect(v);
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::diff::diff;
    use crate::model::{EntityType, Link, Primitive, PropertyType, PropertyValues, ValueOrArray};
    use crate::url::VersionRange;

    fn url(kind: &str, name: &str) -> BaseUrl {
        BaseUrl::new(format!("https://example.com/{kind}/{name}/")).unwrap()
    }

    fn any(base: BaseUrl, version: u32) -> Reference {
        Reference::new(base.at(version), VersionRange::any())
    }

    fn property(name: &str, version: u32) -> OntologyType {
        OntologyType {
            id: url("property-type", name).at(version),
            title: name.to_string(),
            description: None,
            archived: false,
            body: TypeBody::PropertyType(PropertyType {
                one_of: [PropertyValues::DataType(any(
                    builtin::data_type(Primitive::Text),
                    1,
                ))]
                .into(),
            }),
        }
    }

    fn nested(name: &str, inner: &str) -> OntologyType {
        let inner = url("property-type", inner);
        OntologyType {
            id: url("property-type", name).at(1),
            title: name.to_string(),
            description: None,
            archived: false,
            body: TypeBody::PropertyType(PropertyType {
                one_of: [PropertyValues::Object {
                    properties: [(inner.clone(), ValueOrArray::Value(any(inner, 1)))].into(),
                    required: BTreeSet::new(),
                }]
                .into(),
            }),
        }
    }

    fn entity(name: &str, properties: &[(&str, u32)], links: &[&str]) -> OntologyType {
        OntologyType {
            id: url("entity-type", name).at(1),
            title: name.to_string(),
            description: None,
            archived: false,
            body: TypeBody::EntityType(EntityType {
                inherits_from: BTreeSet::new(),
                properties: properties
                    .iter()
                    .map(|(p, v)| {
                        let base = url("property-type", p);
                        (base.clone(), ValueOrArray::Value(any(base, *v)))
                    })
                    .collect(),
                required: BTreeSet::new(),
                links: links
                    .iter()
                    .map(|l| Link {
                        to: any(url("entity-type", l), 1),
                        length: Default::default(),
                        ordered: false,
                    })
                    .collect(),
            }),
        }
    }

    fn graph(nodes: Vec<OntologyType>) -> TypeGraph {
        nodes.into_iter().collect()
    }

    fn plan_for(local: &TypeGraph, remote: &TypeGraph) -> Result<Plan, PlanError> {
        plan(&diff(local, remote), local, remote)
    }

    fn targets(plan: &Plan) -> Vec<String> {
        plan.iter().map(|p| p.op.target().to_string()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let local = graph(vec![entity("person", &[("name", 1)], &[]), property("name", 1)]);
        let plan = plan_for(&local, &TypeGraph::new()).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(
            targets(&plan),
            vec![
                "https://example.com/property-type/name/v/1",
                "https://example.com/entity-type/person/v/1"
            ]
        );
        assert_eq!(plan.operations[1].depends_on, vec![0]);
        assert!(matches!(plan.operations[0].op, Operation::CreateType { .. }));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_update_publishes_next_remote_version() {
        let mut changed = property("name", 1);
        changed.title = "Full name".to_string();
        let local = graph(vec![changed]);
        let remote = graph(vec![property("name", 1), property("name", 2)]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(plan.len(), 1);
        let Operation::UpdateType { target, payload } = &plan.operations[0].op else {
            panic!("expected update");
        };
        assert_eq!(target.version, 3);
        assert_eq!(payload.id, *target);
        assert_eq!(payload.title, "Full name");
    }

    #[test]
    fn test_multiple_local_versions_are_chained() {
        let local = graph(vec![property("name", 1), property("name", 2)]);
        let plan = plan_for(&local, &TypeGraph::new()).unwrap();

        assert!(matches!(plan.operations[0].op, Operation::CreateType { .. }));
        assert!(matches!(plan.operations[1].op, Operation::UpdateType { .. }));
        assert_eq!(plan.operations[1].depends_on, vec![0]);
    }

    #[test]
    fn test_references_to_unchanged_types_use_remote_version() {
        let local = graph(vec![property("name", 1), entity("person", &[("name", 1)], &[])]);
        let remote = graph(vec![property("name", 1), property("name", 2), property("name", 3)]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(plan.len(), 1);
        let payload = plan.operations[0].op.payload().unwrap();
        let refs: Vec<&VersionedUrl> = payload.body.references().into_iter().map(|(r, _)| r).collect();
        assert_eq!(refs, vec![&url("property-type", "name").at(3)]);
        assert!(plan.operations[0].depends_on.is_empty());
    }

    #[test]
    fn test_link_cycle_is_split_into_shell_and_attach() {
        let local = graph(vec![
            entity("person", &[], &["company"]),
            entity("company", &[], &["person"]),
        ]);
        let plan = plan_for(&local, &TypeGraph::new()).unwrap();

        assert_eq!(plan.len(), 4);
        let purposes: Vec<Purpose> = plan.iter().map(|p| p.purpose).collect();
        assert_eq!(
            purposes,
            vec![Purpose::Shell, Purpose::Shell, Purpose::AttachLinks, Purpose::AttachLinks]
        );

        for shell in &plan.operations[..2] {
            let Operation::CreateType { payload, .. } = &shell.op else {
                panic!("shells are creates");
            };
            let TypeBody::EntityType(entity) = &payload.body else {
                panic!("expected entity");
            };
            assert!(entity.links.is_empty());
            assert_eq!(payload.id.version, 1);
        }
        for attach in &plan.operations[2..] {
            let Operation::UpdateType { target, payload } = &attach.op else {
                panic!("attachments are updates");
            };
            assert_eq!(target.version, 2);
            let links: Vec<u32> = payload
                .body
                .references()
                .into_iter()
                .map(|(r, _)| r.version)
                .collect();
            assert_eq!(links, vec![1]);
            assert!(attach.depends_on.iter().all(|d| *d < attach.index));
        }
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_update_publishes_pinned_intermediate_versions() {
        let name = url("property-type", "name");
        let titled = |version: u32, title: &str| {
            let mut node = property("name", version);
            node.title = title.to_string();
            node
        };
        let mut person = entity("person", &[], &[]);
        if let TypeBody::EntityType(entity) = &mut person.body {
            entity.properties.insert(
                name.clone(),
                ValueOrArray::Value(Reference::exact(name.at(2))),
            );
        }
        let local = graph(vec![
            property("name", 1),
            titled(2, "Name v2"),
            titled(3, "Name v3"),
            person,
        ]);
        let remote = graph(vec![property("name", 1)]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(
            targets(&plan),
            vec![
                "https://example.com/property-type/name/v/2",
                "https://example.com/property-type/name/v/3",
                "https://example.com/entity-type/person/v/1"
            ]
        );
        assert_eq!(plan.operations[0].op.payload().unwrap().title, "Name v2");
        assert_eq!(plan.operations[1].depends_on, vec![0]);
        assert_eq!(plan.operations[2].depends_on, vec![0]);

        let payload = plan.operations[2].op.payload().unwrap();
        let refs: Vec<&VersionedUrl> = payload.body.references().into_iter().map(|(r, _)| r).collect();
        assert_eq!(refs, vec![&name.at(2)]);
    }

    #[test]
    fn test_pinned_version_already_in_registry_is_not_republished() {
        let name = url("property-type", "name");
        let mut latest = property("name", 2);
        latest.title = "Full name".to_string();
        let mut person = entity("person", &[], &[]);
        if let TypeBody::EntityType(entity) = &mut person.body {
            entity.properties.insert(
                name.clone(),
                ValueOrArray::Value(Reference::exact(name.at(1))),
            );
        }
        let local = graph(vec![property("name", 1), latest, person]);
        let remote = graph(vec![property("name", 1)]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(plan.summary().creates, 1);
        assert_eq!(plan.summary().updates, 1);
        let payload = plan.operations[1].op.payload().unwrap();
        assert_eq!(payload.body.references()[0].0, &name.at(1));
    }

    #[test]
    fn test_cycle_between_published_types_links_to_registry_versions() {
        let renamed = |mut node: OntologyType| {
            node.title.push_str(" (renamed)");
            node
        };
        let local = graph(vec![
            renamed(entity("person", &[], &["company"])),
            renamed(entity("company", &[], &["person"])),
        ]);
        let remote = graph(vec![
            entity("person", &[], &["company"]),
            entity("company", &[], &["person"]),
        ]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(plan.len(), 2);
        for planned in plan.iter() {
            assert_eq!(planned.purpose, Purpose::Publish);
            assert!(planned.depends_on.is_empty());
            let Operation::UpdateType { target, payload } = &planned.op else {
                panic!("expected update");
            };
            assert_eq!(target.version, 2);
            let links: Vec<u32> = payload
                .body
                .references()
                .into_iter()
                .map(|(r, _)| r.version)
                .collect();
            assert_eq!(links, vec![1]);
        }
    }

    #[test]
    fn test_cycle_with_one_published_member_needs_no_shell() {
        let mut person = entity("person", &[], &["company"]);
        person.title = "Person".to_string();
        let local = graph(vec![person, entity("company", &[], &["person"])]);
        let remote = graph(vec![entity("person", &[], &[])]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(
            targets(&plan),
            vec![
                "https://example.com/entity-type/company/v/1",
                "https://example.com/entity-type/person/v/2"
            ]
        );
        assert!(plan.iter().all(|p| p.purpose == Purpose::Publish));
        assert_eq!(plan.operations[1].depends_on, vec![0]);

        let company = plan.operations[0].op.payload().unwrap();
        assert_eq!(company.body.references()[0].0, &url("entity-type", "person").at(1));
        let person = plan.operations[1].op.payload().unwrap();
        assert_eq!(person.body.references()[0].0, &url("entity-type", "company").at(1));
    }

    #[test]
    fn test_self_link_needs_no_split() {
        let local = graph(vec![entity("node", &[], &["node"])]);
        let plan = plan_for(&local, &TypeGraph::new()).unwrap();

        assert_eq!(plan.len(), 1);
        let payload = plan.operations[0].op.payload().unwrap();
        assert_eq!(
            payload.body.references()[0].0,
            &url("entity-type", "node").at(1)
        );
    }

    #[test]
    fn test_composition_cycle_is_unsatisfiable() {
        let local = graph(vec![nested("a", "b"), nested("b", "a")]);
        let result = plan_for(&local, &TypeGraph::new());

        let Err(PlanError::UnsatisfiableDependency { cycle }) = result else {
            panic!("expected cycle error, got {result:?}");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_missing_reference_is_reported() {
        let local = graph(vec![entity("person", &[("name", 1)], &[])]);
        let result = plan_for(&local, &TypeGraph::new());
        assert!(matches!(result, Err(PlanError::UnpublishedReference { .. })));
    }

    #[test]
    fn test_archives_run_last() {
        let local = graph(vec![property("name", 1)]);
        let remote = graph(vec![property("legacy", 1), entity("old", &[("legacy", 1)], &[])]);
        let plan = plan_for(&local, &remote).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.operations[0].purpose, Purpose::Publish);
        assert!(plan.operations[1].op.is_archive());
        assert_eq!(
            plan.operations[1].op.target(),
            &url("entity-type", "old").at(1)
        );
        assert_eq!(plan.summary().archives, 2);
    }

    #[test]
    fn test_empty_change_set_gives_empty_plan() {
        let local = graph(vec![property("name", 1)]);
        let plan = plan_for(&local, &local.clone()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_validate_rejects_forward_dependencies() {
        let local = graph(vec![entity("person", &[("name", 1)], &[]), property("name", 1)]);
        let mut plan = plan_for(&local, &TypeGraph::new()).unwrap();
        plan.operations[0].depends_on = vec![1];
        assert_eq!(
            plan.validate(),
            Err(PlanError::InvalidOrder {
                index: 0,
                dependency: 1
            })
        );
    }

    #[test]
    fn test_plan_serializes_to_json() {
        let local = graph(vec![entity("person", &[("name", 1)], &[]), property("name", 1)]);
        let plan = plan_for(&local, &TypeGraph::new()).unwrap();
        let json = serde_json::to_string_pretty(&plan).unwrap();
        assert!(json.contains("\"op\": \"createType\""));
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
