//! `ontosync sync` - diff, plan and apply in one step

use anyhow::Result;

use crate::Context;
use crate::cli::SyncArgs;
use crate::{display, state, ui};

pub fn run(ctx: &Context, args: SyncArgs) -> Result<i32> {
    let dry_run = args.exec.dry_run;
    let workspace = super::prepare(ctx, &args.source, dry_run)?;
    let session = &workspace.session;

    if !ctx.quiet && !ctx.json {
        ui::header("Ontology Sync");
        ui::kv("Registry", &workspace.registry);
        ui::kv("Declarations", &workspace.declarations.len().to_string());
        if let Some(last) = state::SyncState::load()
            .ok()
            .and_then(|s| s.last_run(&workspace.registry).cloned())
        {
            ui::kv(
                "Last sync",
                &format!(
                    "{} ({} failed)",
                    last.last_sync.format("%Y-%m-%d %H:%M UTC"),
                    last.failed
                ),
            );
        }
        if dry_run {
            ui::warn("Dry run: writes are recorded, not sent");
        }
    }

    let reconciliation = super::with_spinner(ctx, "Fetching registry snapshot...", || {
        session.reconcile(workspace.declarations)
    })?;
    let build_clean = reconciliation.build.is_clean();
    let plan = &reconciliation.plan;

    if !ctx.json {
        display::display_build_errors(&reconciliation.build.errors);
        if !ctx.quiet {
            display::display_changes(
                &reconciliation.changes,
                &reconciliation.build.graph,
                &reconciliation.remote,
                ctx.verbose > 0,
            );
        }
    }

    if plan.is_empty() {
        let report = ontology::Report::default();
        if ctx.json {
            super::print_json(&report)?;
        }
        return Ok(super::run_exit_code(build_clean, &report));
    }

    if ctx.verbose > 0 && !ctx.json {
        display::display_plan(plan);
    }

    let opts = super::execute_options(&workspace.config, &args.exec, ctx.verbose > 0);
    let report = super::run_plan(ctx, session, plan, &opts, &args.exec)?;

    if super::was_declined(&report) {
        ui::info("Aborted");
        return Ok(0);
    }

    if ctx.json {
        super::print_json(&report)?;
    } else if !ctx.quiet || !report.summary.is_success() {
        display::display_report(&report, dry_run);
    }

    if !dry_run {
        state::record_run(&workspace.registry, &report);
    }

    Ok(super::run_exit_code(build_clean, &report))
}
