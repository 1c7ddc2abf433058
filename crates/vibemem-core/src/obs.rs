//! Structured observability hooks for store and sync lifecycle events.
//!
//! Events are emitted at `info!` (anomalies at `warn!`) with an `event`
//! field naming what happened, so they can be filtered with `RUST_LOG` or
//! collected as JSON.

use std::path::Path;

use tracing::{info, warn};

/// RAII guard that enters a span tagged with the store root for the
/// duration of a command.
///
/// ```ignore
/// let _span = StoreSpan::enter(store.root());
/// ```
pub struct StoreSpan {
    _span: tracing::span::EnteredSpan,
}

impl StoreSpan {
    pub fn enter(root: &Path) -> Self {
        let span = tracing::info_span!("vibemem.store", root = %root.display());
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_store_initialized(root: &Path) {
    info!(event = "store.initialized", root = %root.display());
}

pub fn emit_store_loaded(root: &Path, items: usize) {
    info!(event = "store.loaded", root = %root.display(), items = items);
}

pub fn emit_store_saved(root: &Path, items: usize, tokens: usize) {
    info!(event = "store.saved", root = %root.display(), items = items, tokens = tokens);
}

pub fn emit_memory_added(id: &str, category: &str, tokens: usize) {
    info!(event = "memory.added", id = %id, category = %category, tokens = tokens);
}

pub fn emit_memory_removed(id: &str, category: &str) {
    info!(event = "memory.removed", id = %id, category = %category);
}

/// A stored priority was not recognised and was read as `normal`.
pub fn emit_priority_defaulted(value: &str) {
    warn!(event = "store.priority_defaulted", value = %value);
}

/// A category aggregate would have gone negative and was clamped at zero.
pub fn emit_aggregate_clamped(category: &str) {
    warn!(event = "store.aggregate_clamped", category = %category);
}

pub fn emit_compress_finished(
    target_tokens: usize,
    original_tokens: usize,
    final_tokens: usize,
    dropped: usize,
    summarized: usize,
) {
    info!(
        event = "compress.finished",
        target_tokens = target_tokens,
        original_tokens = original_tokens,
        final_tokens = final_tokens,
        dropped = dropped,
        summarized = summarized,
    );
}

pub fn emit_artifact_synced(tool: &str, path: &Path, tokens: usize, dry_run: bool) {
    info!(
        event = "artifact.synced",
        tool = %tool,
        path = %path.display(),
        tokens = tokens,
        dry_run = dry_run,
    );
}

pub fn emit_artifact_failed(tool: &str, path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.failed", tool = %tool, path = %path.display(), error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_span_create() {
        let _span = StoreSpan::enter(Path::new("/tmp/.vibemem"));
    }
}
