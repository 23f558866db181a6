//! # Ontology
//!
//! Reconciles a locally declared ontology with a remote type registry.
//!
//! Types are declared locally as JSON (data types, property types and
//! entity types, each with a base URL and a version). The crate builds them
//! into a validated graph, fetches what the registry already has, computes
//! the difference, and turns it into an ordered plan of registry writes.
//!
//! ## Core Concepts
//!
//! - **TypeGraph**: Versioned types keyed by base URL, with reverse edges
//! - **GraphBuilder**: Resolves references and rejects invalid declarations
//! - **Differ**: Compares a local graph with a remote snapshot
//! - **Planner**: Orders registry writes so references are always published first
//! - **Executor**: Applies a plan with bounded parallelism and retries
//!
//! ## Example
//!
//! ```ignore
//! use ontology::{ExecuteOptions, MemoryRemote, Session, AutoConfirm, NoProgress};
//! use std::sync::Arc;
//!
//! let declarations: Vec<ontology::Declaration> = serde_json::from_str(json)?;
//!
//! let session = Session::new(Arc::new(MemoryRemote::new()));
//! let reconciliation = session.reconcile(declarations)?;
//! for error in &reconciliation.build.errors {
//!     eprintln!("skipped: {error}");
//! }
//!
//! let report = session.execute(
//!     &reconciliation.plan,
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//!     &mut AutoConfirm,
//! )?;
//! std::process::exit(report.status().exit_code());
//! ```
//!
//! ## Provider Traits
//!
//! - [`Remote`]: A registry to read snapshots from and publish to
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! The HTTP registry client lives in a separate crate, so this one has no
//! network or terminal dependencies.

pub mod builder;
pub mod builtin;
pub mod constraint;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod planner;
pub mod remote;
pub mod retry;
pub mod snapshot;
pub mod types;
pub mod url;

// Re-export main types at crate root
pub use builder::{BuildOutput, GraphBuilder, Overrides, build};
pub use constraint::NumericConstraint;
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, Reconciliation,
    Session,
};
pub use diff::{Change, ChangeSet, DiffSummary, Differ, FieldChanges, Membership, TypeDiff, diff};
pub use error::{BuildError, Error, ErrorCategory, PlanError, RemoteError, Result};
pub use executor::{execute, execute_simple};
pub use graph::TypeGraph;
pub use model::{
    Declaration, EdgeKind, OntologyType, PropertyValues, PublishedType, Reference, TypeBody, TypeKind,
};
pub use planner::{Operation, Plan, PlanSummary, PlannedOperation, Planner, Purpose, plan};
pub use remote::{DryRun, MemoryRemote, Remote, RemoteCall};
pub use retry::RetryConfig;
pub use types::{
    CancelToken, ExecuteOptions, ExecuteSummary, OperationOutcome, Report, ReportEntry,
    RunStatus, SkipReason,
};
pub use url::{BaseUrl, TypeRef, UrlError, VersionRange, VersionedUrl};
