use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ontology::{Report, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Record of past sync runs, per registry
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct SyncState {
    /// Keyed by registry URL
    #[serde(default)]
    pub registries: BTreeMap<String, SyncRecord>,
}

/// Outcome of the last run against one registry
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub last_sync: DateTime<Utc>,
    pub status: RunStatus,
    pub succeeded: usize,
    #[serde(default)]
    pub already_existed: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Targets that failed, with their reasons
    #[serde(default)]
    pub failures: Vec<(String, String)>,
}

impl SyncRecord {
    pub fn from_report(report: &Report) -> Self {
        let failures = report
            .failures()
            .filter_map(|entry| match &entry.outcome {
                ontology::OperationOutcome::Failed { reason } => {
                    Some((entry.target.to_string(), reason.clone()))
                }
                _ => None,
            })
            .collect();
        Self {
            last_sync: Utc::now(),
            status: report.status(),
            succeeded: report.summary.succeeded,
            already_existed: report.summary.already_existed,
            failed: report.summary.failed,
            skipped: report.summary.skipped,
            failures,
        }
    }
}

// ============================================================================
// SyncState Implementation
// ============================================================================

impl SyncState {
    /// Get the state directory path (~/.local/state/ontosync)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("ontosync"))
    }

    fn state_file() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("state.toml"))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::state_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::state_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn last_run(&self, registry: &str) -> Option<&SyncRecord> {
        self.registries.get(registry)
    }

    /// Record a finished run
    pub fn record(&mut self, registry: &str, report: &Report) {
        self.registries
            .insert(registry.to_string(), SyncRecord::from_report(report));
    }
}

/// Record a run in the state file; failures are logged, not fatal
pub fn record_run(registry: &str, report: &Report) {
    let result = SyncState::load().and_then(|mut state| {
        state.record(registry, report);
        state.save()
    });
    if let Err(e) = result {
        log::warn!("Could not update sync state: {e:#}");
    }
}
