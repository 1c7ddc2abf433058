//! Layered YAML configuration.
//!
//! Built-in defaults are overlaid with the global `~/.vibemem/config.yml`
//! and then the project `.vibemem/config.yml`. Layers are merged
//! mapping-by-mapping before being read into typed structs, so a project
//! file can override a single budget without restating the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::compression::CompressionPolicy;

pub const CONFIG_FILE: &str = "config.yml";
pub const STORE_DIR: &str = ".vibemem";

/// Budget used when neither the tool nor a `default` entry is configured.
pub const FALLBACK_BUDGET: usize = 4000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("could not determine home directory")]
    NoHomeDir,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub preserve_categories: Vec<String>,
    /// Budget for the store's own `hot.md`.
    pub hot_budget: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            preserve_categories: CompressionPolicy::default().preserve_categories,
            hot_budget: 8000,
        }
    }
}

impl CompressionConfig {
    pub fn policy(&self) -> CompressionPolicy {
        CompressionPolicy::default().with_preserve_categories(self.preserve_categories.iter().cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync only tools whose artifact already exists when none are named.
    pub auto_detect_tools: bool,
    /// Merge global memories into every project artifact.
    pub include_global: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_detect_tools: true,
            include_global: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub model: String,
    pub use_llm: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-3-haiku".to_string(),
            use_llm: true,
        }
    }
}

/// Typed view of `config.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub token_budgets: BTreeMap<String, usize>,
    pub compression: CompressionConfig,
    pub sync: SyncConfig,
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        let token_budgets = [
            ("claude-code", 10000),
            ("cursor", 6000),
            ("copilot", 3000),
            ("aider", 4000),
            ("windsurf", 5000),
            ("cline", 5000),
            ("continue", 4000),
            ("zed", 4000),
            ("default", 4000),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            version: 1,
            token_budgets,
            compression: CompressionConfig::default(),
            sync: SyncConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// `~/.vibemem`.
pub fn global_root() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(STORE_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

/// `<project>/.vibemem`.
pub fn project_root(project: &Path) -> PathBuf {
    project.join(STORE_DIR)
}

/// Recursively merge `overlay` into `base`. Mappings merge key by key;
/// anything else in `overlay` replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = value.is_mapping()
                    && base_map.get(&key).is_some_and(Value::is_mapping);
                match base_map.get_mut(&key) {
                    Some(existing) if nested => deep_merge(existing, value),
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn read_layer(path: &Path) -> ConfigResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty file parses as null.
    Ok((!value.is_null()).then_some(value))
}

impl Config {
    /// Defaults overlaid by each existing file in `layers`, in order.
    pub fn load_layers<P: AsRef<Path>>(layers: &[P]) -> ConfigResult<Self> {
        let mut merged = serde_yaml::to_value(Config::default())?;
        for layer in layers {
            let path = layer.as_ref();
            if let Some(value) = read_layer(path)? {
                debug!(path = %path.display(), "merging config layer");
                deep_merge(&mut merged, value);
            }
        }
        Ok(serde_yaml::from_value(merged)?)
    }

    /// Defaults, then global config, then the project config under
    /// `project`.
    pub fn load(project: &Path) -> ConfigResult<Self> {
        let mut layers = Vec::new();
        if let Ok(global) = global_root() {
            layers.push(global.join(CONFIG_FILE));
        }
        layers.push(project_root(project).join(CONFIG_FILE));
        Self::load_layers(&layers)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(write_err)
    }

    /// Budget for `tool`, else the `default` entry, else 4000.
    pub fn budget_for(&self, tool: &str) -> usize {
        self.token_budgets
            .get(tool)
            .or_else(|| self.token_budgets.get("default"))
            .copied()
            .unwrap_or(FALLBACK_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.budget_for("claude-code"), 10000);
        assert_eq!(c.budget_for("copilot"), 3000);
        assert_eq!(c.budget_for("unknown-tool"), 4000);
        assert_eq!(c.compression.preserve_categories, vec!["critical", "error", "arch"]);
        assert_eq!(c.compression.hot_budget, 8000);
    }

    #[test]
    fn test_budget_without_default_entry() {
        let mut c = Config::default();
        c.token_budgets.clear();
        assert_eq!(c.budget_for("cursor"), FALLBACK_BUDGET);
    }

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: 2}\nb: 3").unwrap();
        let overlay: Value = serde_yaml::from_str("a: {y: 20, z: 30}\nb: [1]").unwrap();
        deep_merge(&mut base, overlay);
        assert_eq!(base["a"]["x"], Value::from(1));
        assert_eq!(base["a"]["y"], Value::from(20));
        assert_eq!(base["a"]["z"], Value::from(30));
        assert!(base["b"].is_sequence());
    }

    #[test]
    fn test_layers_override_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.yml");
        let project = dir.path().join("project.yml");
        std::fs::write(&global, "token_budgets:\n  cursor: 100\n  copilot: 200\n").unwrap();
        std::fs::write(
            &project,
            "token_budgets:\n  cursor: 999\ncompression:\n  preserve_categories: [gotcha]\nstrategy_unused: true\n",
        )
        .unwrap();

        let c = Config::load_layers(&[&global, &project]).unwrap();
        assert_eq!(c.budget_for("cursor"), 999);
        assert_eq!(c.budget_for("copilot"), 200);
        assert_eq!(c.budget_for("claude-code"), 10000);
        assert_eq!(c.compression.preserve_categories, vec!["gotcha"]);
        assert_eq!(c.compression.hot_budget, 8000);
    }

    #[test]
    fn test_missing_and_empty_layers() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.yml");
        std::fs::write(&empty, "").unwrap();
        let c = Config::load_layers(&[dir.path().join("nope.yml"), empty]).unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.yml");
        std::fs::write(&bad, "token_budgets: [unclosed").unwrap();
        let err = Config::load_layers(&[&bad]).unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".vibemem").join(CONFIG_FILE);
        let mut c = Config::default();
        c.token_budgets.insert("zed".into(), 1234);
        c.save(&path).unwrap();
        let back = Config::load_layers(&[&path]).unwrap();
        assert_eq!(back.budget_for("zed"), 1234);
    }
}
