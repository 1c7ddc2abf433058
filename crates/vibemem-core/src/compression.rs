//! Token-budgeted compression of a memory collection.
//!
//! Protected items (critical priority, or in a preserved category) are
//! never dropped; they are only shortened when they alone overflow the
//! budget. Everything else is kept whole while it fits, summarized into
//! half of the remaining budget when there is room, and dropped otherwise.
//!
//! When protected items alone exceed the budget the result is best effort:
//! each protected item is cut to an equal share that never goes below
//! [`CompressionPolicy::min_share`], so many protected items can still
//! overflow a small budget.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::{MemoryItem, ELLIPSIS};
use crate::obs;
use crate::tokenizer::Tokenizer;

/// Knobs for [`compress_items`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
    /// Categories whose items are always kept.
    pub preserve_categories: Vec<String>,
    /// Floor for the per-item share when shrinking protected items.
    pub min_share: usize,
    /// Tokens held back from a summary to leave room for the ellipsis.
    pub summary_margin: usize,
    /// Remaining budget required before a summary is attempted.
    pub min_summary_budget: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            preserve_categories: vec!["critical".into(), "error".into(), "arch".into()],
            min_share: 50,
            summary_margin: 10,
            min_summary_budget: 100,
        }
    }
}

impl CompressionPolicy {
    pub fn with_preserve_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_protected(&self, item: &MemoryItem) -> bool {
        item.is_critical() || self.preserve_categories.iter().any(|c| c == item.category())
    }
}

/// Shortened copy of `item` sized to roughly `max_tokens`.
///
/// The content is cut to `max_tokens - margin` tokens and an ellipsis is
/// appended when anything was removed. The copy is always flagged as
/// compressed.
pub fn summarize_item(item: &MemoryItem, max_tokens: usize, margin: usize, tokenizer: &Tokenizer) -> MemoryItem {
    let content = item.content();
    let cut = tokenizer.truncate(content, max_tokens.saturating_sub(margin));
    let summary = if cut == content {
        cut
    } else {
        format!("{}{}", cut.trim_end(), ELLIPSIS)
    };
    item.derive(summary, tokenizer)
}

/// Reduce `items` to fit `target_tokens`.
///
/// Output order: protected items in input order, then accepted
/// compressible items in priority/recency order.
pub fn compress_items(
    items: &[MemoryItem],
    target_tokens: usize,
    policy: &CompressionPolicy,
    tokenizer: &Tokenizer,
) -> Vec<MemoryItem> {
    let (protected, mut compressible): (Vec<&MemoryItem>, Vec<&MemoryItem>) =
        items.iter().partition(|item| policy.is_protected(item));

    let protected_tokens: usize = protected.iter().map(|m| m.token_count()).sum();

    if protected_tokens >= target_tokens {
        if protected.is_empty() {
            return Vec::new();
        }
        let share = (target_tokens / protected.len()).max(policy.min_share);
        return protected
            .into_iter()
            .map(|item| {
                if item.token_count() <= share {
                    item.clone()
                } else {
                    summarize_item(item, share, policy.summary_margin, tokenizer)
                }
            })
            .collect();
    }

    // Normal before low, then newest first. Stable for full ties.
    compressible.sort_by(|a, b| {
        a.priority()
            .rank()
            .cmp(&b.priority().rank())
            .then_with(|| b.timestamp().cmp(&a.timestamp()))
    });

    let mut result: Vec<MemoryItem> = protected.into_iter().cloned().collect();
    let mut used = protected_tokens;

    for item in compressible {
        let remaining = target_tokens - used;
        if item.token_count() <= remaining {
            used += item.token_count();
            result.push(item.clone());
        } else if remaining > policy.min_summary_budget {
            let summary = summarize_item(item, remaining / 2, policy.summary_margin, tokenizer);
            if summary.token_count() <= remaining {
                used += summary.token_count();
                result.push(summary);
            }
        }
    }

    result
}

/// Outcome of compressing one item set for one budget.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub items: Vec<MemoryItem>,
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub dropped: usize,
    pub summarized: usize,
}

impl CompressionOutcome {
    /// Whether anything was dropped or shortened.
    pub fn compressed(&self) -> bool {
        self.dropped > 0 || self.summarized > 0
    }
}

/// Compression bound to a tokenizer and policy.
#[derive(Debug, Clone)]
pub struct Compressor {
    tokenizer: Arc<Tokenizer>,
    policy: CompressionPolicy,
}

impl Compressor {
    pub fn new(tokenizer: Arc<Tokenizer>, policy: CompressionPolicy) -> Self {
        Self { tokenizer, policy }
    }

    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    pub fn compress(&self, items: &[MemoryItem], target_tokens: usize) -> Vec<MemoryItem> {
        compress_items(items, target_tokens, &self.policy, &self.tokenizer)
    }

    /// Compress and report token usage before and after.
    pub fn compress_with_report(&self, items: &[MemoryItem], target_tokens: usize) -> CompressionOutcome {
        let kept = self.compress(items, target_tokens);
        let outcome = CompressionOutcome {
            original_tokens: items.iter().map(MemoryItem::token_count).sum(),
            final_tokens: kept.iter().map(MemoryItem::token_count).sum(),
            dropped: items.len() - kept.len(),
            summarized: kept.iter().filter(|m| m.is_compressed()).count(),
            items: kept,
        };
        obs::emit_compress_finished(
            target_tokens,
            outcome.original_tokens,
            outcome.final_tokens,
            outcome.dropped,
            outcome.summarized,
        );
        outcome
    }
}
