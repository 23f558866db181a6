mod cli;
mod commands;
mod config;
mod display;
mod loader;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub json: bool,
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        json: cli.json,
        config: cli.config,
    };

    match cli.command {
        Command::Diff(args) => commands::diff::run(&ctx, args),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Sync(args) => commands::sync::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "ontosync", &mut io::stdout());
            Ok(0)
        }
    }
}
