//! vibemem Core Library
//!
//! Token-budgeted project memory for AI coding tools: a persistent memory
//! store, relevance ranking, budget compression and per-tool artifact sync.

pub mod compression;
pub mod config;
pub mod extract;
pub mod memory;
pub mod obs;
pub mod relevance;
pub mod render;
pub mod sync;
pub mod telemetry;
pub mod tokenizer;

pub use compression::{compress_items, CompressionOutcome, CompressionPolicy, Compressor};

pub use config::{Config, ConfigError, ConfigResult};

pub use extract::{Candidate, LlmExtractor, Source};

pub use memory::{
    CategoryAggregate, CategoryPath, MemoryError, MemoryItem, MemoryResult, MemoryStore, Priority,
    StoreSnapshot,
};

pub use relevance::{RelevanceScorer, ScoredItem};

pub use render::{render_hot, render_index, render_tool_artifact, LineStyle};

pub use sync::{
    initialize_layout, open_or_initialize, refresh_store_artifacts, sync_pool, SyncEngine,
    SyncReport, Tool,
};

pub use tokenizer::{Tokenizer, TokenizerError};

/// Crate version, kept in lockstep across the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
