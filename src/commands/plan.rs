//! `ontosync plan` - show, and optionally save, the operations sync would run

use anyhow::{Context as _, Result};
use std::fs;

use crate::Context;
use crate::cli::PlanArgs;
use crate::{display, ui};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<i32> {
    let workspace = super::prepare(ctx, &args.source, false)?;
    let session = &workspace.session;

    let reconciliation = super::with_spinner(ctx, "Fetching registry snapshot...", || {
        session.reconcile(workspace.declarations)
    })?;
    let plan = &reconciliation.plan;

    if let Some(path) = &args.out {
        let content = serde_json::to_string_pretty(plan)?;
        fs::write(path, content + "\n")
            .with_context(|| format!("Could not write plan to {}", path.display()))?;
        log::info!("Saved plan to {}", path.display());
    }

    if ctx.json {
        super::print_json(plan)?;
    } else {
        display::display_build_errors(&reconciliation.build.errors);
        display::display_plan(plan);
        if let Some(path) = &args.out
            && !ctx.quiet
        {
            ui::success(&format!(
                "Saved {} to {}",
                ui::plural(plan.len(), "operation"),
                path.display()
            ));
        }
    }

    Ok(super::pending_exit_code(&reconciliation.build, !plan.is_empty()))
}
