//! Core types for plan execution results

use crate::retry::RetryConfig;
use crate::url::VersionedUrl;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Why an operation was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SkipReason {
    /// A prerequisite failed or was itself skipped
    DependencyFailed { dependency: VersionedUrl },
    /// Execution was cancelled before this operation started
    Cancelled,
    /// The execution deadline passed before this operation started
    TimedOut,
    /// The user declined to apply the plan
    Declined,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyFailed { dependency } => write!(f, "dependency {dependency} failed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Declined => f.write_str("declined"),
        }
    }
}

/// Result of one planned operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum OperationOutcome {
    /// Applied; `already_existed` means the registry already had it
    Succeeded { already_existed: bool },
    Failed { reason: String },
    Skipped { reason: SkipReason },
}

impl OperationOutcome {
    /// Check if the result represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    /// Succeeded because the registry already had the version
    pub already_existed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of operations processed
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, outcome: &OperationOutcome) {
        match outcome {
            OperationOutcome::Succeeded { already_existed } => {
                self.succeeded += 1;
                if *already_existed {
                    self.already_existed += 1;
                }
            }
            OperationOutcome::Failed { .. } => self.failed += 1,
            OperationOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Overall result of running a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Every operation succeeded (or there was nothing to do)
    Succeeded,
    /// Some operations succeeded, others failed or were skipped
    PartialFailure,
    /// No operation succeeded
    TotalFailure,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::TotalFailure => 1,
            Self::PartialFailure => 2,
        }
    }
}

/// Outcome of one operation in a [`Report`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub index: usize,
    pub target: VersionedUrl,
    pub action: String,
    #[serde(flatten)]
    pub outcome: OperationOutcome,
}

/// Per-operation outcomes, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub summary: ExecuteSummary,
}

impl Report {
    pub fn status(&self) -> RunStatus {
        if self.summary.is_success() {
            RunStatus::Succeeded
        } else if self.summary.succeeded == 0 {
            RunStatus::TotalFailure
        } else {
            RunStatus::PartialFailure
        }
    }

    pub fn outcome_of(&self, target: &VersionedUrl) -> Option<&OperationOutcome> {
        self.entries
            .iter()
            .find(|e| &e.target == target)
            .map(|e| &e.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }
}

/// Cooperative cancellation flag shared with the executor
///
/// Cancelling stops new operations from being dispatched; operations
/// already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The shared flag, for signal handlers that set it directly
    pub fn flag(&self) -> &Arc<AtomicBool> {
        &self.0
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of operations in flight at once
    pub jobs: usize,
    /// Stop dispatching new operations after this long
    pub timeout: Option<Duration>,
    /// Retry policy for network failures
    pub retry: RetryConfig,
    pub cancel: CancelToken,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            timeout: None,
            retry: RetryConfig::default(),
            cancel: CancelToken::new(),
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&OperationOutcome::Succeeded {
            already_existed: false,
        });
        summary.add_result(&OperationOutcome::Succeeded {
            already_existed: true,
        });
        summary.add_result(&OperationOutcome::Failed {
            reason: "boom".to_string(),
        });
        summary.add_result(&OperationOutcome::Skipped {
            reason: SkipReason::Cancelled,
        });

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.already_existed, 1);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_run_status() {
        let mut report = Report::default();
        assert_eq!(report.status(), RunStatus::Succeeded);

        report.summary.failed = 1;
        assert_eq!(report.status(), RunStatus::TotalFailure);
        assert_eq!(report.status().exit_code(), 1);

        report.summary.succeeded = 3;
        assert_eq!(report.status(), RunStatus::PartialFailure);
        assert_eq!(report.status().exit_code(), 2);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
