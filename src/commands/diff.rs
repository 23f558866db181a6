//! `ontosync diff` - preview what sync would change

use anyhow::Result;
use serde_json::json;

use crate::Context;
use crate::cli::SourceArgs;
use crate::display;

pub fn run(ctx: &Context, args: SourceArgs) -> Result<i32> {
    let workspace = super::prepare(ctx, &args, false)?;
    let session = &workspace.session;

    let (build, remote, changes) = super::with_spinner(ctx, "Fetching registry snapshot...", || {
        session.diff(workspace.declarations)
    })?;
    let pending = !changes.is_empty();

    if ctx.json {
        let rejected: Vec<String> = build.errors.iter().map(ToString::to_string).collect();
        super::print_json(&json!({
            "registry": workspace.registry,
            "summary": changes.summary(),
            "changes": changes.changes().collect::<Vec<_>>(),
            "rejected": rejected,
        }))?;
    } else {
        display::display_build_errors(&build.errors);
        display::display_changes(&changes, &build.graph, &remote, ctx.verbose > 0);
    }

    Ok(super::pending_exit_code(&build, pending))
}
