//! Human-readable rendering of change sets, plans and reports

use colored::{ColoredString, Colorize};
use ontology::{
    BaseUrl, BuildError, Change, ChangeSet, FieldChanges, Membership, OperationOutcome, Plan,
    PlannedOperation, PropertyValues, Purpose, Report, SkipReason, TypeGraph, TypeKind,
    VersionedUrl,
};

const RULE: &str = "├─────────────────────────────────────────────────────┤";
const BOTTOM: &str = "└─────────────────────────────────────────────────────┘";

fn top(title: &str) {
    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", title.bold());
    println!("│");
}

pub fn kind_heading(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::DataType => "Data types",
        TypeKind::PropertyType => "Property types",
        TypeKind::EntityType => "Entity types",
    }
}

fn change_symbol(change: &Change) -> ColoredString {
    match change {
        Change::Create { .. } => "+".green(),
        Change::Update { .. } => "~".yellow(),
        Change::Remove { .. } => "-".red(),
        Change::Unchanged { .. } => " ".normal(),
    }
}

/// Short version summary, e.g. `v2 → v3`
pub fn change_detail(change: &Change) -> String {
    match change {
        Change::Create { versions } => match (versions.first(), versions.last()) {
            (Some(first), Some(last)) if first != last => format!("(new) → v{first}..v{last}"),
            (Some(first), _) => format!("(new) → v{first}"),
            _ => "(new)".to_string(),
        },
        Change::Update { from, to, local } if local == to => format!("v{from} → v{to}"),
        Change::Update { from, to, local } => format!("v{from} → v{to} (local v{local})"),
        Change::Remove { version } => format!("(will archive v{version})"),
        Change::Unchanged { version } => format!("v{version}"),
    }
}

fn value_label(value: &PropertyValues<BaseUrl>) -> String {
    match value {
        PropertyValues::DataType(base) => base.slug().to_string(),
        PropertyValues::Object { properties, .. } => format!("object({})", properties.len()),
        PropertyValues::Array { items, .. } => format!("array({})", items.len()),
    }
}

fn membership_note(label: &str, membership: &Membership<BaseUrl>, notes: &mut Vec<String>) {
    for added in &membership.added {
        notes.push(format!("+ {label} {}", added.slug()));
    }
    for removed in &membership.removed {
        notes.push(format!("- {label} {}", removed.slug()));
    }
}

/// One line per field-level difference behind an update
pub fn field_notes(fields: &FieldChanges) -> Vec<String> {
    let mut notes = Vec::new();
    if !fields.metadata.is_empty() {
        notes.push(format!("{} changed", fields.metadata.join(", ")));
    }
    for added in &fields.one_of.added {
        notes.push(format!("+ value {}", value_label(added)));
    }
    for removed in &fields.one_of.removed {
        notes.push(format!("- value {}", value_label(removed)));
    }
    membership_note("property", &fields.properties, &mut notes);
    for changed in &fields.changed_properties {
        notes.push(format!("~ property {}", changed.slug()));
    }
    membership_note("required", &fields.required, &mut notes);
    membership_note("link", &fields.links, &mut notes);
    for changed in &fields.changed_links {
        notes.push(format!("~ link {}", changed.slug()));
    }
    membership_note("inherits", &fields.inherits_from, &mut notes);
    for base in &fields.repinned {
        notes.push(format!("~ pin {}", base.slug()));
    }
    notes
}

/// Line diff of two JSON renderings; equal lines are dropped
pub fn json_diff(old: &str, new: &str) -> Vec<(char, String)> {
    let diff = similar::TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => '-',
                similar::ChangeTag::Insert => '+',
                similar::ChangeTag::Equal => return None,
            };
            Some((sign, change.to_string().trim_end().to_string()))
        })
        .collect()
}

fn pretty(graph: &TypeGraph, url: &VersionedUrl) -> Option<String> {
    graph
        .get(url)
        .and_then(|node| serde_json::to_string_pretty(&node.published()).ok())
        .map(|mut text| {
            text.push('\n');
            text
        })
}

/// Display a change set grouped by kind
///
/// With `verbose`, updates also show a line diff of the published JSON.
pub fn display_changes(changes: &ChangeSet, local: &TypeGraph, remote: &TypeGraph, verbose: bool) {
    if changes.is_empty() {
        println!();
        println!("  {} Registry is up to date", "✓".green());
        return;
    }

    top("Ontology Diff");

    for (kind, diffs) in changes.group_by_kind() {
        let pending: Vec<_> = diffs.into_iter().filter(|d| !d.change.is_unchanged()).collect();
        if pending.is_empty() {
            continue;
        }
        println!("│ {}", kind_heading(kind).bold());

        for diff in pending {
            println!(
                "│   {} {:<30} {}",
                change_symbol(&diff.change),
                diff.title,
                change_detail(&diff.change).dimmed()
            );
            println!("│       {}", diff.id.as_str().dimmed());
            for note in field_notes(&diff.fields) {
                println!("│       {note}");
            }

            if verbose
                && let Change::Update { from, local: version, .. } = &diff.change
            {
                let before = pretty(remote, &diff.id.at(*from));
                let after = pretty(local, &diff.id.at(*version));
                if let (Some(before), Some(after)) = (before, after) {
                    for (sign, line) in json_diff(&before, &after) {
                        let text = format!("{sign} {line}");
                        let text = if sign == '+' { text.green() } else { text.red() };
                        println!("│         {text}");
                    }
                }
            }
        }
        println!("│");
    }

    let summary = changes.summary();
    println!("{RULE}");
    println!(
        "│ Summary: {} to create, {} to update, {} to archive ({} unchanged)",
        summary.additions.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.removals.to_string().red(),
        summary.unchanged
    );
    println!("{BOTTOM}");
}

/// Display declarations that could not be built
pub fn display_build_errors(errors: &[BuildError]) {
    if errors.is_empty() {
        return;
    }

    top("Rejected Declarations");
    for error in errors {
        println!("│  {} {}", "✗".red(), error.subject());
        println!("│      {}", error.to_string().dimmed());
    }
    println!("│");
    println!(
        "│  {} These types are left out of the diff until fixed",
        "⚠".yellow()
    );
    println!("{BOTTOM}");
}

/// One plan line, e.g. `  3. create   …/person/v/1 (without links)  after 1, 2`
pub fn operation_line(operation: &PlannedOperation) -> String {
    let purpose = match operation.purpose {
        Purpose::Shell => " (without links)",
        Purpose::AttachLinks => " (attach links)",
        Purpose::Publish | Purpose::Archive => "",
    };
    let after = if operation.depends_on.is_empty() {
        String::new()
    } else {
        let deps: Vec<String> = operation.depends_on.iter().map(ToString::to_string).collect();
        format!("  after {}", deps.join(", "))
    };
    format!(
        "{:>3}. {:<8} {}{purpose}{after}",
        operation.index,
        operation.op.verb(),
        operation.op.target()
    )
}

/// Display an ordered plan
pub fn display_plan(plan: &Plan) {
    if plan.is_empty() {
        println!();
        println!("  {} Nothing to do", "✓".green());
        return;
    }

    top("Execution Plan");
    for operation in plan.iter() {
        let line = operation_line(operation);
        let line = match operation.op.verb() {
            "create" => line.green(),
            "update" => line.yellow(),
            _ => line.red(),
        };
        println!("│ {line}");
    }
    println!("│");

    let summary = plan.summary();
    println!("{RULE}");
    println!(
        "│ Plan: {} to create, {} to update, {} to archive",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.archives.to_string().red()
    );
    println!("{BOTTOM}");
}

/// Print the final summary of an execution report
pub fn display_report(report: &Report, dry_run: bool) {
    let summary = &report.summary;
    println!();
    if summary.is_success() {
        let msg = if dry_run {
            "Dry run complete, no changes were made"
        } else {
            "Registry is in sync!"
        };
        println!("  {} {}", "✓".green().bold(), msg);
    } else {
        println!("  {} Sync finished with errors", "⚠".yellow().bold());
    }

    let published = summary.succeeded - summary.already_existed;
    if published > 0 {
        let verb = if dry_run { "would be applied" } else { "applied" };
        println!("    • {published} operations {verb}");
    }
    if summary.already_existed > 0 {
        println!("    • {} already published", summary.already_existed);
    }
    if summary.skipped > 0 {
        println!("    • {} operations skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "operations".red());
    }

    for entry in report.failures() {
        if let OperationOutcome::Failed { reason } = &entry.outcome {
            println!("      {} {} {}", "✗".red(), entry.action, entry.target);
            println!("        {}", reason.dimmed());
        }
    }

    let blocked: Vec<_> = report
        .entries
        .iter()
        .filter(|e| {
            matches!(
                e.outcome,
                OperationOutcome::Skipped {
                    reason: SkipReason::DependencyFailed { .. }
                }
            )
        })
        .collect();
    if !blocked.is_empty() {
        println!(
            "    {} {} blocked by failed dependencies",
            "○".dimmed(),
            blocked.len()
        );
    }
}
