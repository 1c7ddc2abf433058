//! Snapshot-backed memory store.
//!
//! The whole collection lives in memory and is loaded and saved as a single
//! JSON snapshot. There is no locking: two processes saving the same
//! snapshot race and the last writer wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::{MemoryError, MemoryResult};
use super::item::{epoch_seconds, CategoryAggregate, CategoryPath, MemoryItem, Priority};
use crate::obs;
use crate::tokenizer::Tokenizer;

/// Highest snapshot version this build understands.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    version: u32,
    #[serde(with = "epoch_seconds")]
    created: DateTime<Utc>,
    memories: Vec<MemoryItem>,
    #[serde(default)]
    categories: BTreeMap<String, CategoryAggregate>,
}

impl StoreSnapshot {
    fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created: Utc::now().trunc_subsecs(6),
            memories: Vec::new(),
            categories: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn memories(&self) -> &[MemoryItem] {
        &self.memories
    }

    pub fn categories(&self) -> &BTreeMap<String, CategoryAggregate> {
        &self.categories
    }
}

/// Recompute every aggregate from the items themselves.
fn tally(items: &[MemoryItem]) -> BTreeMap<String, CategoryAggregate> {
    let mut out: BTreeMap<String, CategoryAggregate> = BTreeMap::new();
    for item in items {
        out.entry(item.category().to_string())
            .or_default()
            .record_add(item.token_count());
    }
    out
}

/// In-memory collection of memory items rooted at a directory.
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    snapshot: StoreSnapshot,
    tokenizer: Arc<Tokenizer>,
}

impl MemoryStore {
    pub const MEMORY_FILE: &'static str = "memories.json";

    /// Empty store at `root`. Nothing is written until [`save`](Self::save).
    pub fn new(root: impl Into<PathBuf>, tokenizer: Arc<Tokenizer>) -> Self {
        Self {
            root: root.into(),
            snapshot: StoreSnapshot::empty(),
            tokenizer,
        }
    }

    /// Create `root` and write an empty snapshot into it.
    pub fn initialize(root: impl Into<PathBuf>, tokenizer: Arc<Tokenizer>) -> MemoryResult<Self> {
        let store = Self::new(root, tokenizer);
        store.save()?;
        obs::emit_store_initialized(&store.root);
        Ok(store)
    }

    /// Load the snapshot under `root`, initializing an empty one if absent.
    /// Only `memories.json` is written here; [`crate::sync::open_or_initialize`]
    /// also lays down the config and markdown artifacts.
    pub fn load(root: impl Into<PathBuf>, tokenizer: Arc<Tokenizer>) -> MemoryResult<Self> {
        let root = root.into();
        let path = root.join(Self::MEMORY_FILE);
        if !path.exists() {
            return Self::initialize(root, tokenizer);
        }

        let raw = fs::read_to_string(&path).map_err(|source| MemoryError::Read {
            path: path.clone(),
            source,
        })?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        let store = Self::from_snapshot(root, snapshot, tokenizer)?;
        obs::emit_store_loaded(&store.root, store.len());
        Ok(store)
    }

    /// Wrap an existing snapshot, repairing aggregates that disagree with
    /// the items.
    pub fn from_snapshot(
        root: impl Into<PathBuf>,
        mut snapshot: StoreSnapshot,
        tokenizer: Arc<Tokenizer>,
    ) -> MemoryResult<Self> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(MemoryError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let expected = tally(&snapshot.memories);
        let mut recorded = snapshot.categories.clone();
        // Categories emptied by removals are kept with zero totals.
        recorded.retain(|_, agg| agg.count() > 0 || agg.tokens() > 0);
        if recorded != expected {
            warn!(
                event = "store.aggregates_rebuilt",
                recorded = recorded.len(),
                expected = expected.len(),
                "category aggregates did not match items"
            );
            let mut rebuilt = expected;
            for name in snapshot.categories.keys() {
                rebuilt.entry(name.clone()).or_default();
            }
            snapshot.categories = rebuilt;
        }

        Ok(Self {
            root: root.into(),
            snapshot,
            tokenizer,
        })
    }

    /// Write the snapshot atomically (temp file in the same directory, then
    /// rename).
    pub fn save(&self) -> MemoryResult<()> {
        let path = self.snapshot_path();
        let write_err = |source| MemoryError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(write_err)?;
        let json = serde_json::to_string_pretty(&self.snapshot)?;
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        obs::emit_store_saved(&self.root, self.len(), self.total_tokens());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(Self::MEMORY_FILE)
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    /// Add an item now. `category` may be `category:subcategory`.
    pub fn add(&mut self, category: &str, content: &str, priority: Priority) -> MemoryResult<MemoryItem> {
        self.add_at(category, content, priority, Utc::now())
    }

    /// Add an item with an explicit creation time.
    pub fn add_at(
        &mut self,
        category: &str,
        content: &str,
        priority: Priority,
        timestamp: DateTime<Utc>,
    ) -> MemoryResult<MemoryItem> {
        let path = CategoryPath::parse(category)?;
        let mut item = MemoryItem::new(&path, content, priority, timestamp, &self.tokenizer);

        let mut salt = 0;
        while self.snapshot.memories.iter().any(|m| m.id() == item.id()) {
            salt += 1;
            item.reassign_id(salt);
        }

        self.snapshot
            .categories
            .entry(item.category().to_string())
            .or_default()
            .record_add(item.token_count());
        self.snapshot.memories.push(item.clone());

        obs::emit_memory_added(item.id(), item.category(), item.token_count());
        Ok(item)
    }

    /// Remove the first item whose id equals `needle` or whose content
    /// contains it. A blank needle matches nothing.
    pub fn remove(&mut self, needle: &str) -> Option<MemoryItem> {
        if needle.trim().is_empty() {
            return None;
        }
        let pos = self
            .snapshot
            .memories
            .iter()
            .position(|m| m.id() == needle || m.content().contains(needle))?;
        let removed = self.snapshot.memories.remove(pos);

        if let Some(agg) = self.snapshot.categories.get_mut(removed.category()) {
            if !agg.record_remove(removed.token_count()) {
                obs::emit_aggregate_clamped(removed.category());
            }
        } else {
            obs::emit_aggregate_clamped(removed.category());
        }

        obs::emit_memory_removed(removed.id(), removed.category());
        Some(removed)
    }

    /// Items newest first, optionally restricted to one category. Items
    /// with equal timestamps keep insertion order.
    pub fn list(&self, category: Option<&str>) -> Vec<MemoryItem> {
        let mut items: Vec<MemoryItem> = self
            .snapshot
            .memories
            .iter()
            .filter(|m| category.map_or(true, |c| m.category() == c))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        items
    }

    /// Items in one category, insertion order.
    pub fn get_by_category(&self, category: &str) -> Vec<&MemoryItem> {
        self.snapshot
            .memories
            .iter()
            .filter(|m| m.category() == category)
            .collect()
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[MemoryItem] {
        &self.snapshot.memories
    }

    pub fn aggregates(&self) -> &BTreeMap<String, CategoryAggregate> {
        &self.snapshot.categories
    }

    pub fn aggregate(&self, category: &str) -> Option<CategoryAggregate> {
        self.snapshot.categories.get(category).copied()
    }

    pub fn total_tokens(&self) -> usize {
        self.snapshot.memories.iter().map(MemoryItem::token_count).sum()
    }

    /// Token count of arbitrary text with this store's tokenizer.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    pub fn len(&self) -> usize {
        self.snapshot.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.memories.is_empty()
    }

    /// True when every aggregate matches its items.
    pub fn aggregates_consistent(&self) -> bool {
        let expected = tally(&self.snapshot.memories);
        let consistent = self.snapshot.categories.iter().all(|(name, agg)| {
            let want = expected.get(name).copied().unwrap_or_default();
            *agg == want
        }) && expected
            .keys()
            .all(|name| self.snapshot.categories.contains_key(name));
        debug!(consistent, "aggregate check");
        consistent
    }
}
