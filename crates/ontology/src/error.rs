//! Error types for building, planning and applying ontology changes.
//!
//! Registry failures are categorized the same way throughout the crate so the
//! executor can decide what to retry and what to treat as already done.

use crate::model::TypeKind;
use crate::url::{TypeRef, VersionedUrl};
use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of registry errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failure or server error (transient, retryable).
    Network,
    /// The exact version is already published (safe to ignore).
    AlreadyExists,
    /// The target does not exist in the registry.
    NotFound,
    /// The registry refused the request.
    Rejected,
    /// The registry answered with something unreadable.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether this error can be safely ignored (operation already done).
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::AlreadyExists => "Already published",
            Self::NotFound => "Type not found in registry",
            Self::Rejected => "Rejected by registry",
            Self::Format => "Invalid registry response",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the registry URL and your connection, then run sync again",
            Self::AlreadyExists => "Nothing to do, the registry already has this version",
            Self::NotFound => "Run diff to refresh the remote snapshot before applying",
            Self::Rejected => "Check the type definition against the registry's validation rules",
            Self::Format => "The registry may be running an incompatible version",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors reported by a [`Remote`](crate::Remote) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("{target} already exists")]
    AlreadyExists { target: VersionedUrl },

    #[error("{target} not found")]
    NotFound { target: String },

    #[error("registry rejected {target}: {message}")]
    Rejected { target: String, message: String },

    #[error("network error: {message}")]
    Network {
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    #[error("invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn network(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Network {
            message: message.into(),
            status,
        }
    }

    pub fn rejected(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Rejected {
            target: target.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Rejected { .. } => ErrorCategory::Rejected,
            Self::Network { .. } => ErrorCategory::Network,
            Self::InvalidResponse(_) => ErrorCategory::Format,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }
}

/// A local type that could not be added to the graph.
///
/// Build errors are reported per type; the rest of the graph is still built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("{from} references {missing}, which no declaration or built-in satisfies")]
    UnresolvedReference { from: VersionedUrl, missing: TypeRef },

    #[error("{from} is part of a composition cycle: {}", format_path(.cycle_path))]
    CompositionCycle {
        from: VersionedUrl,
        cycle_path: Vec<VersionedUrl>,
    },

    #[error("{id} is out of sequence, expected version {expected}")]
    VersionSequence { id: VersionedUrl, expected: u32 },

    #[error("{from} expects {reference} to be a {expected}, found a {found}")]
    KindMismatch {
        from: VersionedUrl,
        reference: VersionedUrl,
        expected: TypeKind,
        found: TypeKind,
    },

    #[error("{from} depends on {dependency}, which was rejected")]
    DependencyRejected {
        from: VersionedUrl,
        dependency: VersionedUrl,
    },
}

impl BuildError {
    /// The type version this error rejects
    pub fn subject(&self) -> &VersionedUrl {
        match self {
            Self::UnresolvedReference { from, .. }
            | Self::CompositionCycle { from, .. }
            | Self::KindMismatch { from, .. }
            | Self::DependencyRejected { from, .. } => from,
            Self::VersionSequence { id, .. } => id,
        }
    }
}

/// Errors that prevent a plan from being produced or executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("unsatisfiable dependency cycle: {}", format_path(.cycle))]
    UnsatisfiableDependency { cycle: Vec<VersionedUrl> },

    #[error("{from} references {reference}, which is neither published nor planned")]
    UnpublishedReference { from: VersionedUrl, reference: TypeRef },

    #[error("{id} is in the change set but missing from the local graph")]
    MissingLocal { id: VersionedUrl },

    #[error("operation {index} depends on operation {dependency}, which does not precede it")]
    InvalidOrder { index: usize, dependency: usize },

    #[error("operation {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

/// Top-level error for the reconcile pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("confirmation failed: {0}")]
    Confirm(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Confirm(format!("{err:#}"))
    }
}

fn format_path(path: &[VersionedUrl]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
