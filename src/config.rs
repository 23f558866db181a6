//! `ontosync.toml` configuration.
//!
//! Looked up in this order: `--config`, `./ontosync.toml`,
//! `~/.config/ontosync/config.toml`. Relative paths inside the file are
//! resolved against the directory the file lives in.

use anyhow::{Context, Result, bail};
use ontology::BaseUrl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file name looked up in the working directory
pub const FILE_NAME: &str = "ontosync.toml";

/// Get the user config directory (~/.config/ontosync)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("ontosync"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub registry: RegistryConfig,
    pub types: TypesConfig,
    /// Identifier (base URL) -> declaration file
    pub overrides: BTreeMap<String, String>,
    pub execution: ExecutionConfig,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub url: Option<String>,
    /// Only identifiers under this prefix are compared against
    pub namespace: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            namespace: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypesConfig {
    pub root: String,
}

impl Default for TypesConfig {
    fn default() -> Self {
        Self {
            root: "types".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub jobs: usize,
    pub retries: u32,
    pub timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            retries: 3,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load the first config file found, or defaults if there is none
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Could not determine working directory")?;
        let candidates = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                vec![path.to_path_buf()]
            }
            None => {
                let mut paths = vec![cwd.join(FILE_NAME)];
                if let Ok(dir) = config_dir() {
                    paths.push(dir.join("config.toml"));
                }
                paths
            }
        };

        match candidates.into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self {
                    base_dir: cwd,
                    ..Self::default()
                })
            }
        }
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let config = Self::parse(&content, base_dir)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.base_dir = base_dir;
        Ok(config)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    /// Directory holding the type declaration files
    pub fn types_root(&self, flag: Option<&Path>) -> PathBuf {
        match flag {
            Some(path) => path.to_path_buf(),
            None => self.resolve(&self.types.root),
        }
    }

    /// Override files keyed by the identifier they replace
    pub fn override_files(&self) -> Result<Vec<(BaseUrl, PathBuf)>> {
        self.overrides
            .iter()
            .map(|(id, path)| {
                let base = BaseUrl::new(id.as_str())
                    .with_context(|| format!("Invalid override identifier '{id}'"))?;
                Ok((base, self.resolve(path)))
            })
            .collect()
    }

    /// Registry URL from the flag, else the config file
    pub fn registry_url(&self, flag: Option<&str>) -> Result<String> {
        flag.map(str::to_string)
            .or_else(|| self.registry.url.clone())
            .context("No registry URL configured. Set [registry] url in ontosync.toml or pass --registry")
    }

    /// Snapshot scope from `[registry] namespace`
    pub fn scope(&self) -> Result<Option<Vec<BaseUrl>>> {
        self.registry
            .namespace
            .as_deref()
            .map(|ns| {
                BaseUrl::new(ns)
                    .map(|base| vec![base])
                    .with_context(|| format!("Invalid registry namespace '{ns}'"))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
[registry]
url = "http://localhost:4000"
namespace = "https://example.com/@acme/types/"
timeout_secs = 5

[types]
root = "ontology"

[overrides]
"https://example.com/@acme/types/property-type/name/" = "dev/name.json"

[execution]
jobs = 8
retries = 1
timeout_secs = 120
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(FULL, PathBuf::from("/project")).unwrap();
        assert_eq!(config.registry.url.as_deref(), Some("http://localhost:4000"));
        assert_eq!(config.registry.timeout_secs, 5);
        assert_eq!(config.execution.jobs, 8);
        assert_eq!(config.execution.retries, 1);
        assert_eq!(config.execution.timeout_secs, Some(120));
        assert_eq!(config.types_root(None), PathBuf::from("/project/ontology"));

        let overrides = config.override_files().unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].1, PathBuf::from("/project/dev/name.json"));

        let scope = config.scope().unwrap().unwrap();
        assert_eq!(scope[0].as_str(), "https://example.com/@acme/types/");
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("", PathBuf::from("/project")).unwrap();
        assert_eq!(config.execution.jobs, 4);
        assert_eq!(config.execution.retries, 3);
        assert_eq!(config.registry.timeout_secs, 30);
        assert_eq!(config.types_root(None), PathBuf::from("/project/types"));
        assert!(config.scope().unwrap().is_none());
        assert!(config.registry_url(None).is_err());
    }

    #[test]
    fn test_flags_win() {
        let config = Config::parse(FULL, PathBuf::from("/project")).unwrap();
        assert_eq!(
            config.registry_url(Some("https://types.example.com")).unwrap(),
            "https://types.example.com"
        );
        assert_eq!(
            config.types_root(Some(Path::new("elsewhere"))),
            PathBuf::from("elsewhere")
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = Config::parse("[registry]\nurll = \"x\"\n", PathBuf::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "[types]\nroot = \"defs\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.types_root(None), dir.path().join("defs"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(result.is_err());
    }
}
