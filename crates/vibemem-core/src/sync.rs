//! Per-tool artifact generation.
//!
//! Each tool gets the same item pool compressed to its own token budget and
//! rendered as the hot markdown artifact. The store directory also carries
//! its own `hot.md` and `index.md`, regenerated after every save.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::compression::Compressor;
use crate::config::{Config, CONFIG_FILE};
use crate::memory::{MemoryItem, MemoryStore};
use crate::obs;
use crate::render::{render_hot, render_index, render_tool_artifact};
use crate::tokenizer::Tokenizer;

pub const HOT_FILE: &str = "hot.md";
pub const INDEX_FILE: &str = "index.md";

/// AI coding tools that read a project-level instructions file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    ClaudeCode,
    Cursor,
    Copilot,
    Aider,
    Windsurf,
    Cline,
    Continue,
    Zed,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::ClaudeCode,
        Tool::Cursor,
        Tool::Copilot,
        Tool::Aider,
        Tool::Windsurf,
        Tool::Cline,
        Tool::Continue,
        Tool::Zed,
    ];

    /// Identifier used in config and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Cursor => "cursor",
            Self::Copilot => "copilot",
            Self::Aider => "aider",
            Self::Windsurf => "windsurf",
            Self::Cline => "cline",
            Self::Continue => "continue",
            Self::Zed => "zed",
        }
    }

    /// Artifact location relative to the project root.
    pub fn artifact_path(self) -> &'static str {
        match self {
            Self::ClaudeCode => "CLAUDE.md",
            Self::Cursor => ".cursorrules",
            Self::Copilot => ".github/copilot-instructions.md",
            Self::Aider => "CONVENTIONS.md",
            Self::Windsurf => ".windsurfrules",
            Self::Cline => ".clinerules",
            Self::Continue => ".continuerules",
            Self::Zed => ".rules",
        }
    }

    /// Tools whose artifact already exists under `project`.
    pub fn detect(project: &Path) -> Vec<Tool> {
        Self::ALL
            .into_iter()
            .filter(|tool| project.join(tool.artifact_path()).exists())
            .collect()
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == wanted || (wanted == "claude" && *tool == Tool::ClaudeCode))
            .with_context(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!("unknown tool {s:?} (known: {})", known.join(", "))
            })
    }
}

/// Outcome of syncing one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub tool: Tool,
    pub path: PathBuf,
    /// Tokens of the rendered artifact.
    pub tokens: usize,
    /// Tokens of the item pool before compression.
    pub original_tokens: usize,
    pub compressed: bool,
    pub written: bool,
    pub error: Option<String>,
}

impl SyncReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Renders and writes tool artifacts for one project.
pub struct SyncEngine {
    project: PathBuf,
    config: Config,
    compressor: Compressor,
    tokenizer: Arc<Tokenizer>,
}

impl SyncEngine {
    pub fn new(project: impl Into<PathBuf>, config: Config, tokenizer: Arc<Tokenizer>) -> Self {
        let compressor = Compressor::new(Arc::clone(&tokenizer), config.compression.policy());
        Self {
            project: project.into(),
            config,
            compressor,
            tokenizer,
        }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Explicit tools if given, else detected ones when auto-detection is
    /// on, else Claude Code alone.
    pub fn select_tools(&self, requested: &[Tool]) -> Vec<Tool> {
        if !requested.is_empty() {
            let mut tools = requested.to_vec();
            tools.sort();
            tools.dedup();
            return tools;
        }
        if self.config.sync.auto_detect_tools {
            let detected = Tool::detect(&self.project);
            if !detected.is_empty() {
                return detected;
            }
        }
        vec![Tool::ClaudeCode]
    }

    /// Compress and render the artifact for one tool without writing it.
    pub fn render_for(&self, tool: Tool, items: &[MemoryItem]) -> (String, SyncReport) {
        let budget = self.config.budget_for(tool.as_str());
        let outcome = self.compressor.compress_with_report(items, budget);
        let text = render_tool_artifact(tool.as_str(), &outcome.items);
        let report = SyncReport {
            tool,
            path: self.project.join(tool.artifact_path()),
            tokens: self.tokenizer.count(&text),
            original_tokens: outcome.original_tokens,
            compressed: outcome.compressed(),
            written: false,
            error: None,
        };
        (text, report)
    }

    /// Sync `items` to each selected tool. Failures are recorded per tool
    /// and do not stop the others.
    pub fn sync(&self, items: &[MemoryItem], requested: &[Tool], dry_run: bool) -> Vec<SyncReport> {
        self.select_tools(requested)
            .into_iter()
            .map(|tool| {
                let (text, mut report) = self.render_for(tool, items);
                if dry_run {
                    obs::emit_artifact_synced(tool.as_str(), &report.path, report.tokens, true);
                    return report;
                }
                match write_artifact(&report.path, &text) {
                    Ok(()) => {
                        report.written = true;
                        obs::emit_artifact_synced(tool.as_str(), &report.path, report.tokens, false);
                    }
                    Err(err) => {
                        obs::emit_artifact_failed(tool.as_str(), &report.path, &err);
                        report.error = Some(format!("{err:#}"));
                    }
                }
                report
            })
            .collect()
    }
}

/// Item pool for a project sync: project items, then global ones if enabled.
pub fn sync_pool(project: &MemoryStore, global: Option<&MemoryStore>, config: &Config) -> Vec<MemoryItem> {
    let mut items = project.items().to_vec();
    if config.sync.include_global {
        if let Some(global) = global {
            items.extend(global.items().iter().cloned());
        }
    }
    items
}

fn write_artifact(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    std::fs::write(path, text).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Regenerate `hot.md` and `index.md` inside the store directory.
pub fn refresh_store_artifacts(store: &MemoryStore, config: &Config) -> Result<()> {
    let compressor = Compressor::new(Arc::clone(store.tokenizer()), config.compression.policy());
    let hot = compressor.compress(store.items(), config.compression.hot_budget);
    write_artifact(&store.root().join(HOT_FILE), &render_hot(&hot))?;
    write_artifact(&store.root().join(INDEX_FILE), &render_index(store.aggregates()))?;
    Ok(())
}

/// Lay out a new store at `root`: empty `memories.json`, a default
/// `config.yml` unless one is already there, and fresh `hot.md` / `index.md`.
pub fn initialize_layout(
    root: &Path,
    tokenizer: Arc<Tokenizer>,
    config: &Config,
) -> Result<MemoryStore> {
    let store = MemoryStore::initialize(root, tokenizer)
        .with_context(|| format!("initialize store at {:?}", root))?;
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        Config::default()
            .save(&config_path)
            .with_context(|| format!("write {:?}", config_path))?;
    }
    refresh_store_artifacts(&store, config)?;
    Ok(store)
}

/// Load the store at `root`, laying it out first if it has never been
/// initialized.
pub fn open_or_initialize(
    root: &Path,
    tokenizer: Arc<Tokenizer>,
    config: &Config,
) -> Result<MemoryStore> {
    if root.join(MemoryStore::MEMORY_FILE).exists() {
        return MemoryStore::load(root, tokenizer).with_context(|| format!("load store at {:?}", root));
    }
    initialize_layout(root, tokenizer, config)
}
