//! Execution engine - applies a plan against a remote with bounded parallelism
//!
//! Scheduling happens on the calling thread. Operations whose dependencies
//! have all succeeded are handed to a rayon pool; results come back over a
//! channel. Two operations on the same identifier never run at once, and
//! archives wait until every publish has resolved.

use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::error::{Error, RemoteError, Result};
use crate::planner::{Operation, Plan, PlannedOperation};
use crate::remote::Remote;
use crate::retry::{LogCallback, RetryCallback, RetryConfig, with_retry};
use crate::types::{
    ExecuteOptions, ExecuteSummary, OperationOutcome, Report, ReportEntry, SkipReason,
};
use crate::url::BaseUrl;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// How often the scheduler checks for cancellation while waiting on workers
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Execute a plan with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Arguments
/// * `plan` - The plan to run
/// * `remote` - Registry the operations are issued against
/// * `opts` - Execution options (jobs, timeout, retry, cancel)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Returns
/// A report with one outcome per operation, in plan order. Operation
/// failures are recorded in the report; `Err` is reserved for plans that
/// cannot be run at all.
pub fn execute<P, C>(
    plan: &Plan,
    remote: Arc<dyn Remote>,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Report>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if plan.is_empty() {
        return Ok(Report::default());
    }
    plan.validate()?;

    let prompt = format!(
        "Apply {} operation(s) to {}?",
        plan.len(),
        remote.describe()
    );
    if !confirm.confirm(&prompt)? {
        log::info!("plan declined, nothing applied");
        let outcomes = vec![
            Some(OperationOutcome::Skipped {
                reason: SkipReason::Declined,
            });
            plan.len()
        ];
        return Ok(into_report(plan, outcomes));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .thread_name(|i| format!("ontosync-worker-{i}"))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    progress.on_plan_start(plan.len());
    let mut scheduler = Scheduler::new(plan, opts, progress);
    let (tx, rx) = mpsc::channel::<(usize, OperationOutcome)>();
    let deadline = opts.timeout.map(|timeout| Instant::now() + timeout);
    let mut stop: Option<SkipReason> = None;

    loop {
        if stop.is_none() {
            if opts.cancel.is_cancelled() {
                log::warn!("execution cancelled, waiting for in-flight operations");
                stop = Some(SkipReason::Cancelled);
            } else if deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("execution timed out, waiting for in-flight operations");
                stop = Some(SkipReason::TimedOut);
            }
        }

        if stop.is_none() {
            for index in scheduler.dispatchable() {
                let planned = &plan.operations[index];
                scheduler.start(index);

                let remote = Arc::clone(&remote);
                let tx = tx.clone();
                let op = planned.op.clone();
                let retry = opts.retry.clone();
                pool.spawn(move || {
                    let outcome = apply_operation(remote.as_ref(), &op, &retry);
                    // Receiver is held until every in-flight result arrives
                    let _ = tx.send((index, outcome));
                });
            }
        }

        if scheduler.in_flight == 0 {
            break;
        }

        let wait = match deadline {
            Some(d) if stop.is_none() => d.saturating_duration_since(Instant::now()).min(POLL_INTERVAL),
            _ => POLL_INTERVAL,
        };
        match rx.recv_timeout(wait) {
            Ok((index, outcome)) => scheduler.finish(index, outcome),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let leftover = stop.unwrap_or(SkipReason::Cancelled);
    scheduler.skip_remaining(&leftover);

    let outcomes = scheduler.outcomes;
    let report = into_report(plan, outcomes);
    progress.on_plan_complete(&report.summary);
    log::info!(
        "applied {} of {} operation(s): {} failed, {} skipped",
        report.summary.succeeded,
        report.summary.total(),
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

/// Execute without progress reporting or confirmation
pub fn execute_simple(plan: &Plan, remote: Arc<dyn Remote>) -> Result<Report> {
    execute(
        plan,
        remote,
        &ExecuteOptions::default(),
        &mut NoProgress,
        &mut AutoConfirm,
    )
}

/// Dependency bookkeeping for one run
struct Scheduler<'a, P: ProgressCallback> {
    plan: &'a Plan,
    progress: &'a mut P,
    jobs: usize,
    verbose: bool,
    outcomes: Vec<Option<OperationOutcome>>,
    waiting_on: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
    busy: BTreeSet<BaseUrl>,
    in_flight: usize,
    /// Publishes without an outcome yet; archives wait for zero
    unresolved_publishes: usize,
}

impl<'a, P: ProgressCallback> Scheduler<'a, P> {
    fn new(plan: &'a Plan, opts: &ExecuteOptions, progress: &'a mut P) -> Self {
        let len = plan.len();
        let mut waiting_on = vec![0; len];
        let mut dependents = vec![Vec::new(); len];
        for planned in plan.iter() {
            for &dep in &planned.depends_on {
                waiting_on[planned.index] += 1;
                dependents[dep].push(planned.index);
            }
        }
        let ready = (0..len).filter(|&i| waiting_on[i] == 0).collect();
        let unresolved_publishes = plan.iter().filter(|p| !p.op.is_archive()).count();

        Self {
            plan,
            progress,
            jobs: opts.jobs.max(1),
            verbose: opts.verbose,
            outcomes: vec![None; len],
            waiting_on,
            dependents,
            ready,
            busy: BTreeSet::new(),
            in_flight: 0,
            unresolved_publishes,
        }
    }

    /// Ready operations that can start now, lowest index first
    fn dispatchable(&self) -> Vec<usize> {
        let mut picked = Vec::new();
        let mut bases = BTreeSet::new();
        let slots = self.jobs.saturating_sub(self.in_flight);

        for &index in &self.ready {
            if picked.len() >= slots {
                break;
            }
            let op = &self.plan.operations[index].op;
            if op.is_archive() && self.unresolved_publishes > 0 {
                continue;
            }
            let base = &op.target().base;
            if self.busy.contains(base) || !bases.insert(base) {
                continue;
            }
            picked.push(index);
        }
        picked
    }

    fn start(&mut self, index: usize) {
        let plan = self.plan;
        let planned = &plan.operations[index];
        self.ready.remove(&index);
        self.busy.insert(planned.op.target().base.clone());
        self.in_flight += 1;
        log::debug!("{} {}", planned.op.verb(), planned.op.target());
        self.progress.on_operation_start(planned);
    }

    fn finish(&mut self, index: usize, outcome: OperationOutcome) {
        let plan = self.plan;
        let planned = &plan.operations[index];
        self.in_flight -= 1;
        self.busy.remove(&planned.op.target().base);
        self.resolve(index, outcome);
    }

    /// Record an outcome and propagate it to dependents
    fn resolve(&mut self, index: usize, outcome: OperationOutcome) {
        let plan = self.plan;
        let mut pending = vec![(index, outcome)];

        while let Some((index, outcome)) = pending.pop() {
            if self.outcomes[index].is_some() {
                continue;
            }
            let planned = &plan.operations[index];
            self.log_outcome(planned, &outcome);
            self.progress.on_operation_complete(planned, &outcome);
            if !planned.op.is_archive() {
                self.unresolved_publishes -= 1;
            }

            let succeeded = outcome.is_success();
            self.outcomes[index] = Some(outcome);

            for &dependent in &self.dependents[index] {
                if self.outcomes[dependent].is_some() {
                    continue;
                }
                if succeeded {
                    self.waiting_on[dependent] -= 1;
                    if self.waiting_on[dependent] == 0 {
                        self.ready.insert(dependent);
                    }
                } else {
                    pending.push((
                        dependent,
                        OperationOutcome::Skipped {
                            reason: SkipReason::DependencyFailed {
                                dependency: planned.op.target().clone(),
                            },
                        },
                    ));
                }
            }
        }
    }

    /// Mark everything without an outcome as skipped for `reason`
    fn skip_remaining(&mut self, reason: &SkipReason) {
        let plan = self.plan;
        for planned in plan.iter() {
            if self.outcomes[planned.index].is_some() {
                continue;
            }
            let outcome = OperationOutcome::Skipped {
                reason: reason.clone(),
            };
            self.log_outcome(planned, &outcome);
            self.progress.on_operation_complete(planned, &outcome);
            self.outcomes[planned.index] = Some(outcome);
        }
        self.ready.clear();
    }

    fn log_outcome(&self, planned: &PlannedOperation, outcome: &OperationOutcome) {
        let target = planned.op.target();
        match outcome {
            OperationOutcome::Succeeded { already_existed: true } => {
                log::info!("{target} was already published");
            }
            OperationOutcome::Succeeded { .. } if self.verbose => {
                log::info!("{} {target}: done", planned.op.verb());
            }
            OperationOutcome::Succeeded { .. } => {
                log::debug!("{} {target}: done", planned.op.verb());
            }
            OperationOutcome::Failed { reason } => {
                log::error!("{} {target} failed: {reason}", planned.op.verb());
            }
            OperationOutcome::Skipped { reason } => {
                log::warn!("skipped {target}: {reason}");
            }
        }
    }
}

/// Issue one operation, retrying transient failures
fn apply_operation(remote: &dyn Remote, op: &Operation, retry: &RetryConfig) -> OperationOutcome {
    let callback: &dyn RetryCallback = &LogCallback;
    let result = with_retry(retry, Some(callback), || call(remote, op));

    match result {
        Ok(()) => OperationOutcome::Succeeded {
            already_existed: false,
        },
        Err(e) if e.is_ignorable() => OperationOutcome::Succeeded {
            already_existed: true,
        },
        Err(e) => OperationOutcome::Failed {
            reason: e.to_string(),
        },
    }
}

fn call(remote: &dyn Remote, op: &Operation) -> std::result::Result<(), RemoteError> {
    match op {
        Operation::CreateType { payload, .. } => remote.create_type(payload),
        Operation::UpdateType { target, payload } => remote.update_type(target, payload),
        Operation::ArchiveType { target } => remote.archive_type(target),
    }
}

fn into_report(plan: &Plan, outcomes: Vec<Option<OperationOutcome>>) -> Report {
    let mut summary = ExecuteSummary::default();
    let entries = plan
        .iter()
        .zip(outcomes)
        .map(|(planned, outcome)| {
            let outcome = outcome.unwrap_or(OperationOutcome::Skipped {
                reason: SkipReason::Cancelled,
            });
            summary.add_result(&outcome);
            ReportEntry {
                index: planned.index,
                target: planned.op.target().clone(),
                action: planned.op.verb().to_string(),
                outcome,
            }
        })
        .collect();

    Report { entries, summary }
}
