pub mod apply;
pub mod diff;
pub mod plan;
pub mod sync;

use anyhow::{Result, bail};
use ontology::{
    AutoConfirm, BuildOutput, CancelToken, Declaration, DryRun, ExecuteOptions, OperationOutcome,
    Plan, ProgressCallback, Remote, Report, RetryConfig, RunStatus, Session, SkipReason,
};
use registry::RegistryClient;
use signal_hook::consts::SIGINT;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::{ExecArgs, SourceArgs};
use crate::config::Config;
use crate::loader;
use crate::progress::{self, PromptConfirm, TerminalProgress};

// ============================================================================
// Shared Setup
// ============================================================================

/// Everything a command needs before talking to the registry
pub struct Workspace {
    pub config: Config,
    pub registry: String,
    pub session: Session,
    pub declarations: Vec<Declaration>,
}

/// Open the registry, wrapping it in a [`DryRun`] when requested
pub fn open_registry(config: &Config, url: &str, dry_run: bool) -> Arc<dyn Remote> {
    let timeout = Duration::from_secs(config.registry.timeout_secs);
    let client: Arc<dyn Remote> = Arc::new(RegistryClient::with_timeout(url, timeout));
    if dry_run {
        Arc::new(DryRun::new(client))
    } else {
        client
    }
}

/// Load config, declarations and overrides, and open the registry
pub fn prepare(ctx: &Context, source: &SourceArgs, dry_run: bool) -> Result<Workspace> {
    let config = Config::load(ctx.config.as_deref())?;
    let registry = config.registry_url(source.registry.as_deref())?;

    let root = config.types_root(source.types.as_deref());
    let declarations = loader::load_declarations(&root)?;
    let overrides = loader::load_overrides(&config.override_files()?)?;
    if !overrides.is_empty() {
        log::info!("Using {} override(s)", overrides.len());
    }

    let mut session =
        Session::new(open_registry(&config, &registry, dry_run)).with_overrides(overrides);
    if let Some(scope) = config.scope()? {
        session = session.with_scope(scope);
    }

    Ok(Workspace {
        config,
        registry,
        session,
        declarations,
    })
}

/// Run `f` behind a spinner unless output is quiet or JSON
pub fn with_spinner<T>(ctx: &Context, msg: &str, f: impl FnOnce() -> T) -> T {
    if ctx.quiet || ctx.json {
        return f();
    }
    let pb = progress::spinner(msg);
    let result = f();
    pb.finish_and_clear();
    result
}

// ============================================================================
// Execution
// ============================================================================

/// Merge flags over `[execution]` config
pub fn execute_options(config: &Config, exec: &ExecArgs, verbose: bool) -> ExecuteOptions {
    let retries = exec.retries.unwrap_or(config.execution.retries);
    ExecuteOptions {
        jobs: exec.jobs.unwrap_or(config.execution.jobs).max(1),
        timeout: exec
            .timeout
            .or(config.execution.timeout_secs)
            .map(Duration::from_secs),
        retry: RetryConfig::attempts(retries.saturating_add(1)),
        verbose,
        ..ExecuteOptions::default()
    }
}

/// Stop dispatching on the first Ctrl-C; a second one exits immediately
fn cancel_on_interrupt(token: &CancelToken) {
    let flag = token.flag();
    let registered = signal_hook::flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(flag))
        .and_then(|_| signal_hook::flag::register(SIGINT, Arc::clone(flag)));
    if let Err(e) = registered {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }
}

/// Execute a plan with terminal progress and confirmation
pub fn run_plan(
    ctx: &Context,
    session: &Session,
    plan: &Plan,
    opts: &ExecuteOptions,
    exec: &ExecArgs,
) -> Result<Report> {
    cancel_on_interrupt(&opts.cancel);
    let mut progress = TerminalProgress::new(ctx.verbose > 0, ctx.quiet || ctx.json);
    run_with(session, plan, opts, &mut progress, exec.yes || exec.dry_run)
}

fn run_with<P: ProgressCallback>(
    session: &Session,
    plan: &Plan,
    opts: &ExecuteOptions,
    progress: &mut P,
    assume_yes: bool,
) -> Result<Report> {
    let report = if assume_yes {
        session.execute(plan, opts, progress, &mut AutoConfirm)?
    } else {
        if !plan.is_empty() && !console::user_attended_stderr() {
            bail!("Refusing to write to the registry without confirmation. Pass --yes to proceed");
        }
        session.execute(plan, opts, progress, &mut PromptConfirm)?
    };
    Ok(report)
}

/// Whether the user turned down the confirmation prompt
pub fn was_declined(report: &Report) -> bool {
    !report.entries.is_empty()
        && report.entries.iter().all(|entry| {
            matches!(
                entry.outcome,
                OperationOutcome::Skipped {
                    reason: SkipReason::Declined
                }
            )
        })
}

/// Exit code for `diff` and `plan`: 1 on rejected declarations, 2 when
/// changes are pending, 0 otherwise
pub fn pending_exit_code(build: &BuildOutput, pending: bool) -> i32 {
    if !build.is_clean() {
        RunStatus::TotalFailure.exit_code()
    } else if pending {
        RunStatus::PartialFailure.exit_code()
    } else {
        RunStatus::Succeeded.exit_code()
    }
}

/// Exit code for `sync` and `apply`
///
/// Rejected declarations turn an otherwise clean run into a partial one.
pub fn run_exit_code(build_clean: bool, report: &Report) -> i32 {
    match report.status() {
        RunStatus::Succeeded if !build_clean => RunStatus::PartialFailure.exit_code(),
        status => status.exit_code(),
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::{BaseUrl, ExecuteSummary, MemoryRemote, ReportEntry};

    fn report(outcomes: Vec<OperationOutcome>) -> Report {
        let base = BaseUrl::new("https://example.com/@acme/types/property-type/name/").unwrap();
        let mut summary = ExecuteSummary::default();
        let entries = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                summary.add_result(&outcome);
                ReportEntry {
                    index,
                    target: base.at(index as u32 + 1),
                    action: "create".to_string(),
                    outcome,
                }
            })
            .collect();
        Report { entries, summary }
    }

    fn ok() -> OperationOutcome {
        OperationOutcome::Succeeded {
            already_existed: false,
        }
    }

    fn failed() -> OperationOutcome {
        OperationOutcome::Failed {
            reason: "rejected".to_string(),
        }
    }

    #[test]
    fn test_execute_options_prefer_flags() {
        let config = Config::default();
        let exec = ExecArgs {
            jobs: Some(0),
            retries: Some(0),
            timeout: Some(30),
            ..ExecArgs::default()
        };
        let opts = execute_options(&config, &exec, true);
        assert_eq!(opts.jobs, 1);
        assert_eq!(opts.retry.max_attempts, 1);
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
        assert!(opts.verbose);

        let opts = execute_options(&config, &ExecArgs::default(), false);
        assert_eq!(opts.jobs, 4);
        assert_eq!(opts.retry.max_attempts, 4);
        assert_eq!(opts.timeout, None);
    }

    #[test]
    fn test_run_exit_codes() {
        assert_eq!(run_exit_code(true, &report(vec![ok(), ok()])), 0);
        assert_eq!(run_exit_code(false, &report(vec![ok()])), 2);
        assert_eq!(run_exit_code(true, &report(vec![ok(), failed()])), 2);
        assert_eq!(run_exit_code(true, &report(vec![failed()])), 1);
        assert_eq!(run_exit_code(true, &Report::default()), 0);
        // Nothing to apply, but some declarations were rejected
        assert_eq!(run_exit_code(false, &Report::default()), 2);
    }

    #[test]
    fn test_pending_exit_codes() {
        let clean = BuildOutput::default();
        assert_eq!(pending_exit_code(&clean, false), 0);
        assert_eq!(pending_exit_code(&clean, true), 2);
    }

    #[test]
    fn test_was_declined() {
        let declined = OperationOutcome::Skipped {
            reason: SkipReason::Declined,
        };
        assert!(was_declined(&report(vec![declined.clone(), declined])));
        assert!(!was_declined(&report(vec![ok()])));
        assert!(!was_declined(&Report::default()));
    }

    #[test]
    fn test_run_with_assume_yes_executes() {
        let remote = Arc::new(MemoryRemote::new());
        let session = Session::new(remote.clone());
        let report = run_with(
            &session,
            &Plan::default(),
            &ExecuteOptions::default(),
            &mut ontology::NoProgress,
            true,
        )
        .unwrap();
        assert!(report.entries.is_empty());
        assert!(remote.calls().is_empty());
    }
}
