//! Terminal progress and confirmation for plan execution.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use ontology::{
    ConfirmCallback, ExecuteSummary, OperationOutcome, PlannedOperation, ProgressCallback,
};
use std::time::Duration;

use crate::ui;

const MESSAGE_WIDTH: usize = 40;

/// Spinner shown while waiting on the registry
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress bar over plan operations
///
/// Failures are printed above the bar as they happen; successes are only
/// listed when `verbose` is set.
pub struct TerminalProgress {
    pb: Option<ProgressBar>,
    verbose: bool,
    hidden: bool,
}

impl TerminalProgress {
    pub fn new(verbose: bool, hidden: bool) -> Self {
        Self {
            pb: None,
            verbose,
            hidden,
        }
    }

    fn println(&self, line: String) {
        match &self.pb {
            Some(pb) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_plan_start(&mut self, total: usize) {
        let pb = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        self.pb = Some(pb);
    }

    fn on_operation_start(&mut self, operation: &PlannedOperation) {
        if let Some(pb) = &self.pb {
            let label = format!("{} {}", operation.op.verb(), operation.op.target());
            pb.set_message(ui::truncate_start(&label, MESSAGE_WIDTH));
        }
    }

    fn on_operation_complete(&mut self, operation: &PlannedOperation, outcome: &OperationOutcome) {
        let target = operation.op.target();
        let verb = operation.op.verb();
        match outcome {
            OperationOutcome::Succeeded { already_existed } if self.verbose => {
                let note = if *already_existed {
                    " (already published)".dimmed().to_string()
                } else {
                    String::new()
                };
                self.println(format!("  {} {verb} {target}{note}", "✓".green()));
            }
            OperationOutcome::Succeeded { .. } => {}
            OperationOutcome::Failed { reason } => {
                self.println(format!("  {} {verb} {target}", "✗".red()));
                self.println(format!("      {}", reason.dimmed()));
            }
            OperationOutcome::Skipped { reason } if self.verbose => {
                self.println(format!(
                    "  {} {verb} {target} {}",
                    "○".dimmed(),
                    format!("({reason})").dimmed()
                ));
            }
            OperationOutcome::Skipped { .. } => {}
        }
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    fn on_plan_complete(&mut self, _summary: &ExecuteSummary) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Interactive yes/no prompt
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}
