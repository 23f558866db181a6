//! Callbacks and the reconcile session
//!
//! These traits allow the engine to be used without depending on a
//! particular terminal UI. [`Session`] carries the remote, overrides and
//! scope through the build, diff, plan and execute stages.

use crate::builder::{BuildOutput, GraphBuilder, Overrides};
use crate::diff::{ChangeSet, Differ};
use crate::error::{RemoteError, Result};
use crate::executor;
use crate::graph::TypeGraph;
use crate::model::Declaration;
use crate::planner::{Plan, PlannedOperation, Planner};
use crate::remote::Remote;
use crate::snapshot;
use crate::types::{ExecuteOptions, ExecuteSummary, OperationOutcome, Report};
use crate::url::BaseUrl;
use std::sync::Arc;

/// Progress callback for execution operations
///
/// Called from the scheduling thread only, never from workers.
pub trait ProgressCallback: Send {
    /// Called once before any operation is dispatched
    fn on_plan_start(&mut self, total: usize);

    /// Called when an operation is handed to a worker
    fn on_operation_start(&mut self, operation: &PlannedOperation);

    /// Called when an operation finishes or is skipped
    fn on_operation_complete(&mut self, operation: &PlannedOperation, outcome: &OperationOutcome);

    /// Called once after every operation has an outcome
    fn on_plan_complete(&mut self, summary: &ExecuteSummary);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _total: usize) {}
    fn on_operation_start(&mut self, _operation: &PlannedOperation) {}
    fn on_operation_complete(&mut self, _operation: &PlannedOperation, _outcome: &OperationOutcome) {}
    fn on_plan_complete(&mut self, _summary: &ExecuteSummary) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Everything computed before execution
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub build: BuildOutput,
    pub remote: TypeGraph,
    pub changes: ChangeSet,
    pub plan: Plan,
}

/// Shared state for one reconcile run
#[derive(Clone)]
pub struct Session {
    remote: Arc<dyn Remote>,
    overrides: Overrides,
    scope: Option<Vec<BaseUrl>>,
}

impl Session {
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self {
            remote,
            overrides: Overrides::new(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Only consider remote types under these base URL prefixes
    #[must_use]
    pub fn with_scope(mut self, scope: Vec<BaseUrl>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn remote(&self) -> &Arc<dyn Remote> {
        &self.remote
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn build(&self, declarations: impl IntoIterator<Item = Declaration>) -> BuildOutput {
        declarations
            .into_iter()
            .collect::<GraphBuilder>()
            .with_overrides(self.overrides.clone())
            .build()
    }

    pub fn fetch_remote(&self) -> std::result::Result<TypeGraph, RemoteError> {
        snapshot::fetch(self.remote.as_ref(), self.scope.as_deref())
    }

    /// Build, fetch and diff, leaving out identifiers with rejected versions
    pub fn diff(&self, declarations: impl IntoIterator<Item = Declaration>) -> Result<(BuildOutput, TypeGraph, ChangeSet)> {
        let build = self.build(declarations);
        let remote = self.fetch_remote()?;
        let changes = Differ::new(&build.graph, &remote)
            .ignore(build.rejected_identifiers())
            .diff();
        Ok((build, remote, changes))
    }

    /// Build, fetch, diff and plan
    pub fn reconcile(&self, declarations: impl IntoIterator<Item = Declaration>) -> Result<Reconciliation> {
        let (build, remote, changes) = self.diff(declarations)?;
        let plan = Planner::new(&build.graph, &remote).plan(&changes)?;
        Ok(Reconciliation {
            build,
            remote,
            changes,
            plan,
        })
    }

    /// Run a plan against this session's remote
    pub fn execute<P, C>(
        &self,
        plan: &Plan,
        opts: &ExecuteOptions,
        progress: &mut P,
        confirm: &mut C,
    ) -> Result<Report>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        executor::execute(plan, Arc::clone(&self.remote), opts, progress, confirm)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.remote.describe())
            .field("overrides", &self.overrides.len())
            .field("scope", &self.scope)
            .finish()
    }
}
