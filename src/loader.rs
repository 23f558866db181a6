//! Read local type declarations from disk
//!
//! Every `*.json` file under the types root holds one declaration or an
//! array of declarations. Hidden files and directories are skipped.

use anyhow::{Context, Result, bail};
use ontology::{BaseUrl, Declaration, Overrides};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Deserialize)]
#[serde(untagged)]
enum DeclarationFile {
    Many(Vec<Declaration>),
    One(Box<Declaration>),
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn is_declaration_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

/// Find declaration files under `root`, sorted by path
pub fn find_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Types directory not found: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.with_context(|| format!("Could not walk {}", root.display()))?;
        if is_declaration_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parse one declaration file
pub fn read_file(path: &Path) -> Result<Vec<Declaration>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let parsed: DeclarationFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid type declaration in {}", path.display()))?;
    Ok(match parsed {
        DeclarationFile::Many(declarations) => declarations,
        DeclarationFile::One(declaration) => vec![*declaration],
    })
}

/// Load every declaration under `root`
pub fn load_declarations(root: &Path) -> Result<Vec<Declaration>> {
    let mut declarations = Vec::new();
    for path in find_files(root)? {
        let parsed = read_file(&path)?;
        log::debug!("{}: {} declaration(s)", path.display(), parsed.len());
        declarations.extend(parsed);
    }
    log::info!(
        "Loaded {} declaration(s) from {}",
        declarations.len(),
        root.display()
    );
    Ok(declarations)
}

/// Load override files, checking each replaces the identifier it is keyed by
pub fn load_overrides(files: &[(BaseUrl, PathBuf)]) -> Result<Overrides> {
    let mut overrides = Overrides::new();
    for (base, path) in files {
        let mut parsed = read_file(path)?;
        if parsed.len() != 1 {
            bail!(
                "Override {} must hold exactly one declaration, found {}",
                path.display(),
                parsed.len()
            );
        }
        let declaration = parsed.remove(0);
        if declaration.base() != base {
            bail!(
                "Override {} declares {}, but is configured for {}",
                path.display(),
                declaration.base(),
                base
            );
        }
        overrides.insert(declaration);
    }
    Ok(overrides)
}
