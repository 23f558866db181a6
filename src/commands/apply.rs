//! `ontosync apply` - run a saved plan

use anyhow::{Context as _, Result};
use ontology::{Plan, Session};
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Config;
use crate::{display, state, ui};

/// Read a plan written by `plan --out`
pub fn read_plan(path: &Path) -> Result<Plan> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content)
        .with_context(|| format!("Invalid plan file: {}", path.display()))?;
    plan.validate()
        .with_context(|| format!("Invalid plan file: {}", path.display()))?;
    Ok(plan)
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<i32> {
    let config = Config::load(ctx.config.as_deref())?;
    let registry = config.registry_url(args.registry.as_deref())?;
    let plan = read_plan(&args.plan)?;

    if plan.is_empty() {
        if ctx.json {
            super::print_json(&ontology::Report::default())?;
        } else if !ctx.quiet {
            ui::success("Plan is empty, nothing to apply");
        }
        return Ok(0);
    }

    if !ctx.quiet && !ctx.json {
        ui::header("Apply Plan");
        ui::kv("Registry", &registry);
        ui::kv("Plan", &args.plan.display().to_string());
        display::display_plan(&plan);
    }

    let session = Session::new(super::open_registry(&config, &registry, args.exec.dry_run));
    let opts = super::execute_options(&config, &args.exec, ctx.verbose > 0);
    let report = super::run_plan(ctx, &session, &plan, &opts, &args.exec)?;

    if super::was_declined(&report) {
        ui::info("Aborted");
        return Ok(0);
    }

    if ctx.json {
        super::print_json(&report)?;
    } else if !ctx.quiet || !report.summary.is_success() {
        display::display_report(&report, args.exec.dry_run);
    }

    if !args.exec.dry_run {
        state::record_run(&registry, &report);
    }

    Ok(super::run_exit_code(true, &report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::{MemoryRemote, OperationOutcome, PlannedOperation, Purpose};
    use serde_json::json;
    use tempfile::TempDir;

    const TEXT: &str = "https://blockprotocol.org/@blockprotocol/types/data-type/text/v/1";
    const NAME: &str = "https://example.com/@acme/types/property-type/name/v/1";

    fn name_plan() -> serde_json::Value {
        json!({
            "operations": [{
                "index": 0,
                "op": "createType",
                "target": NAME,
                "payload": {
                    "$id": NAME,
                    "title": "Name",
                    "kind": "propertyType",
                    "oneOf": [{"dataType": TEXT}]
                },
                "purpose": "publish"
            }]
        })
    }

    #[test]
    fn test_read_plan_and_execute() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, name_plan().to_string()).unwrap();

        let plan = read_plan(&path).unwrap();
        assert_eq!(plan.len(), 1);
        let operation: &PlannedOperation = plan.get(0).unwrap();
        assert_eq!(operation.purpose, Purpose::Publish);

        let remote = std::sync::Arc::new(MemoryRemote::new());
        let report = ontology::execute_simple(&plan, remote.clone()).unwrap();
        assert_eq!(
            report.outcome_of(&operation.op.target().clone()),
            Some(&OperationOutcome::Succeeded {
                already_existed: false
            })
        );
        assert!(remote.get(operation.op.target()).is_some());
    }

    #[test]
    fn test_read_plan_rejects_bad_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        let mut plan = name_plan();
        plan["operations"][0]["dependsOn"] = json!([0]);
        fs::write(&path, plan.to_string()).unwrap();

        let err = read_plan(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid plan file"));
    }

    #[test]
    fn test_read_plan_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, "not json").unwrap();
        assert!(read_plan(&path).is_err());
        assert!(read_plan(&dir.path().join("missing.json")).is_err());
    }
}
