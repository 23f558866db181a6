use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ontosync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile a local ontology with a type registry", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to ./ontosync.toml, then ~/.config/ontosync/config.toml)
    #[arg(short, long, global = true, env = "ONTOSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of the human summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show how local declarations differ from the registry
    Diff(SourceArgs),

    /// Show the operations needed to bring the registry up to date
    Plan(PlanArgs),

    /// Diff, plan and apply in one step
    Sync(SyncArgs),

    /// Apply a plan saved with `plan --out`
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared Arguments
// ============================================================================

/// Where declarations come from and which registry they go to
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Registry URL (overrides [registry] url)
    #[arg(short, long, env = "ONTOSYNC_REGISTRY")]
    pub registry: Option<String>,

    /// Directory of type declarations (overrides [types] root)
    #[arg(short, long)]
    pub types: Option<PathBuf>,
}

/// Execution tuning shared by `sync` and `apply`
#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    /// Record operations without writing to the registry
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Maximum concurrent registry writes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Retries per operation on network errors
    #[arg(long)]
    pub retries: Option<u32>,

    /// Give up on operations not started after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

// ============================================================================
// Command Arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Save the plan as JSON for a later `apply`
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Plan file written by `plan --out`
    pub plan: PathBuf,

    /// Registry URL (overrides [registry] url)
    #[arg(short, long, env = "ONTOSYNC_REGISTRY")]
    pub registry: Option<String>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync() {
        let cli = Cli::try_parse_from([
            "ontosync", "-vv", "sync", "--registry", "http://localhost:4000", "-j", "8",
            "--dry-run", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.source.registry.as_deref(), Some("http://localhost:4000"));
        assert_eq!(args.exec.jobs, Some(8));
        assert!(args.exec.dry_run);
        assert!(args.exec.yes);
    }

    #[test]
    fn test_parse_plan_and_apply() {
        let cli = Cli::try_parse_from(["ontosync", "plan", "--out", "plan.json", "--json"]).unwrap();
        assert!(cli.json);
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.out, Some(PathBuf::from("plan.json")));

        let cli = Cli::try_parse_from(["ontosync", "apply", "plan.json", "--timeout", "60"]).unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.plan, PathBuf::from("plan.json"));
        assert_eq!(args.exec.timeout, Some(60));
    }
}
