//! Build a resolved [`TypeGraph`] from local declarations
//!
//! Building never stops at the first problem. Every rejected type version
//! gets its own [`BuildError`], and anything that depends on a rejected
//! version is rejected in turn, so the returned graph only holds types
//! whose whole dependency closure resolved.

use crate::builtin;
use crate::error::BuildError;
use crate::graph::TypeGraph;
use crate::model::{Declaration, OntologyType, Reference, TypeKind};
use crate::url::{BaseUrl, VersionRange, VersionedUrl};
use std::collections::{BTreeMap, BTreeSet};

/// Local replacement declarations, keyed by identifier
///
/// An override becomes the effective latest declaration of its identifier.
/// It replaces the declaration with the same version and local versions
/// above it are dropped. An override newer than every local version is
/// added and must continue the identifier's sequence.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    entries: BTreeMap<BaseUrl, Declaration>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override, returning the one it displaced
    pub fn insert(&mut self, declaration: Declaration) -> Option<Declaration> {
        self.entries
            .insert(declaration.base().clone(), declaration)
    }

    pub fn get(&self, base: &BaseUrl) -> Option<&Declaration> {
        self.entries.get(base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Declaration> for Overrides {
    fn from_iter<I: IntoIterator<Item = Declaration>>(iter: I) -> Self {
        let mut overrides = Self::new();
        for declaration in iter {
            overrides.insert(declaration);
        }
        overrides
    }
}

/// Result of building the local graph
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub graph: TypeGraph,
    pub errors: Vec<BuildError>,
}

impl BuildOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Identifiers with at least one rejected version
    pub fn rejected_identifiers(&self) -> BTreeSet<BaseUrl> {
        self.errors.iter().map(|e| e.subject().base.clone()).collect()
    }

    pub fn errors_for<'a>(&'a self, base: &'a BaseUrl) -> impl Iterator<Item = &'a BuildError> {
        self.errors.iter().filter(move |e| &e.subject().base == base)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    declarations: BTreeMap<BaseUrl, Vec<Declaration>>,
    overrides: Overrides,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, declaration: Declaration) {
        self.declarations
            .entry(declaration.base().clone())
            .or_default()
            .push(declaration);
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn build(self) -> BuildOutput {
        let mut errors = Vec::new();

        let declarations = apply_overrides(self.declarations, &self.overrides);
        let sequenced = check_sequences(declarations, &mut errors);
        let resolved = resolve(&sequenced, &mut errors);
        let resolved = reject_cycles(resolved, &mut errors);
        let resolved = reject_dependents(resolved, &mut errors);

        let graph: TypeGraph = resolved.into_values().collect();
        log::debug!(
            "built local graph: {} type versions, {} rejected",
            graph.len(),
            errors.len()
        );
        BuildOutput { graph, errors }
    }
}

impl FromIterator<Declaration> for GraphBuilder {
    fn from_iter<I: IntoIterator<Item = Declaration>>(iter: I) -> Self {
        let mut builder = Self::new();
        for declaration in iter {
            builder.add(declaration);
        }
        builder
    }
}

/// Build a graph from declarations and overrides
pub fn build(
    declarations: impl IntoIterator<Item = Declaration>,
    overrides: Overrides,
) -> BuildOutput {
    declarations
        .into_iter()
        .collect::<GraphBuilder>()
        .with_overrides(overrides)
        .build()
}

fn apply_overrides(
    mut declarations: BTreeMap<BaseUrl, Vec<Declaration>>,
    overrides: &Overrides,
) -> BTreeMap<BaseUrl, Vec<Declaration>> {
    for replacement in overrides.iter() {
        let versions = declarations.entry(replacement.base().clone()).or_default();
        let before = versions.len();
        versions.retain(|d| d.version() < replacement.version());
        match before - versions.len() {
            0 => log::info!("override adds {}", replacement.id),
            1 => log::info!("override replaces {}", replacement.id),
            n => log::info!(
                "override replaces {} and shadows {} newer local version(s)",
                replacement.id,
                n - 1
            ),
        }
        versions.push(replacement.clone());
    }
    declarations
}

/// Keep versions that form a gapless sequence starting at 1
fn check_sequences(
    declarations: BTreeMap<BaseUrl, Vec<Declaration>>,
    errors: &mut Vec<BuildError>,
) -> BTreeMap<BaseUrl, BTreeMap<u32, Declaration>> {
    let mut accepted = BTreeMap::new();
    for (base, mut versions) in declarations {
        versions.sort_by_key(Declaration::version);
        let mut expected = 1;
        let mut kept = BTreeMap::new();
        for declaration in versions {
            if declaration.version() == expected {
                kept.insert(expected, declaration);
                expected += 1;
            } else {
                errors.push(BuildError::VersionSequence {
                    id: declaration.id,
                    expected,
                });
            }
        }
        accepted.insert(base, kept);
    }
    accepted
}

/// Pick a concrete version for every reference
fn resolve(
    declarations: &BTreeMap<BaseUrl, BTreeMap<u32, Declaration>>,
    errors: &mut Vec<BuildError>,
) -> BTreeMap<VersionedUrl, OntologyType> {
    let lookup = |base: &BaseUrl, range: VersionRange| -> Option<(u32, TypeKind)> {
        if let Some(versions) = declarations.get(base) {
            let version = range.highest(versions.keys().copied())?;
            return versions.get(&version).map(|d| (version, d.kind()));
        }
        let builtin = builtin::find(base)?;
        range
            .contains(builtin.version())
            .then(|| (builtin.version(), builtin.kind()))
    };

    let mut resolved = BTreeMap::new();
    for declaration in declarations.values().flat_map(BTreeMap::values) {
        let mut failed = false;
        for (reference, edge) in declaration.body.references() {
            match lookup(&reference.base, reference.range) {
                None => {
                    errors.push(BuildError::UnresolvedReference {
                        from: declaration.id.clone(),
                        missing: reference.clone(),
                    });
                    failed = true;
                }
                Some((version, kind)) if kind != edge.expected_kind() => {
                    errors.push(BuildError::KindMismatch {
                        from: declaration.id.clone(),
                        reference: reference.base.at(version),
                        expected: edge.expected_kind(),
                        found: kind,
                    });
                    failed = true;
                }
                Some(_) => {}
            }
        }
        if failed {
            continue;
        }

        let node = declaration.map_refs(|reference, _| {
            let version = lookup(&reference.base, reference.range)
                .map_or(reference.range.min, |(version, _)| version);
            Reference::new(reference.base.at(version), reference.range)
        });
        resolved.insert(node.id.clone(), node);
    }
    resolved
}

/// Reject every type version on a cycle of non-link edges
fn reject_cycles(
    mut resolved: BTreeMap<VersionedUrl, OntologyType>,
    errors: &mut Vec<BuildError>,
) -> BTreeMap<VersionedUrl, OntologyType> {
    let edges: BTreeMap<VersionedUrl, Vec<VersionedUrl>> = resolved
        .iter()
        .map(|(id, node)| {
            let targets = node
                .body
                .references()
                .into_iter()
                .filter(|(_, edge)| !edge.is_link())
                .map(|(r, _)| r.url.clone())
                .filter(|url| resolved.contains_key(url))
                .collect();
            (id.clone(), targets)
        })
        .collect();

    let cycles = find_cycles(&edges);
    let mut rejected = BTreeSet::new();
    for cycle in cycles {
        for member in &cycle[..cycle.len() - 1] {
            if rejected.insert(member.clone()) {
                errors.push(BuildError::CompositionCycle {
                    from: member.clone(),
                    cycle_path: cycle.clone(),
                });
            }
        }
    }
    resolved.retain(|id, _| !rejected.contains(id));
    resolved
}

/// Cycles found by depth-first search, each closed by repeating its first node
pub(crate) fn find_cycles(
    edges: &BTreeMap<VersionedUrl, Vec<VersionedUrl>>,
) -> Vec<Vec<VersionedUrl>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: &VersionedUrl,
        edges: &BTreeMap<VersionedUrl, Vec<VersionedUrl>>,
        marks: &mut BTreeMap<VersionedUrl, Mark>,
        path: &mut Vec<VersionedUrl>,
        cycles: &mut Vec<Vec<VersionedUrl>>,
    ) {
        marks.insert(node.clone(), Mark::Visiting);
        path.push(node.clone());
        for next in edges.get(node).into_iter().flatten() {
            match marks.get(next) {
                Some(Mark::Visiting) => {
                    if let Some(start) = path.iter().position(|p| p == next) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next.clone());
                        cycles.push(cycle);
                    }
                }
                Some(Mark::Done) => {}
                None => visit(next, edges, marks, path, cycles),
            }
        }
        path.pop();
        marks.insert(node.clone(), Mark::Done);
    }

    let mut marks = BTreeMap::new();
    let mut cycles = Vec::new();
    for node in edges.keys() {
        if !marks.contains_key(node) {
            visit(node, edges, &mut marks, &mut Vec::new(), &mut cycles);
        }
    }
    cycles
}

/// Reject versions whose references point at rejected versions, to a fixpoint
fn reject_dependents(
    mut resolved: BTreeMap<VersionedUrl, OntologyType>,
    errors: &mut Vec<BuildError>,
) -> BTreeMap<VersionedUrl, OntologyType> {
    loop {
        let rejected: Vec<(VersionedUrl, VersionedUrl)> = resolved
            .values()
            .filter_map(|node| {
                node.body
                    .references()
                    .into_iter()
                    .map(|(r, _)| &r.url)
                    .find(|url| !resolved.contains_key(*url) && builtin::get(url).is_none())
                    .map(|missing| (node.id.clone(), missing.clone()))
            })
            .collect();

        if rejected.is_empty() {
            return resolved;
        }
        for (from, dependency) in rejected {
            resolved.remove(&from);
            errors.push(BuildError::DependencyRejected { from, dependency });
        }
    }
}
