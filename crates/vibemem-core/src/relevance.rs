//! Lexical relevance ranking of memory items against a free-text query.
//!
//! Scores are additive integer contributions; there is no semantic index.
//! Items scoring zero or below are dropped rather than ranked last.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::memory::MemoryItem;

pub const DEFAULT_MAX_ITEMS: usize = 20;

const CATEGORY_MATCH: i64 = 10;
const WORD_OVERLAP: i64 = 2;
const SUBSTRING_MATCH: i64 = 5;
const RECENT_DAY: i64 = 3;
const RECENT_WEEK: i64 = 1;

/// Lower-cased query plus its word set, computed once per ranking.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    text: String,
    words: HashSet<String>,
}

impl QueryTerms {
    pub fn new(query: &str) -> Self {
        let text = query.to_lowercase();
        let words = text.split_whitespace().map(str::to_string).collect();
        Self { text, words }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An item together with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem<'a> {
    pub item: &'a MemoryItem,
    pub score: i64,
}

/// Score one item against `query` as of `now`.
pub fn score_item(query: &QueryTerms, item: &MemoryItem, now: DateTime<Utc>) -> i64 {
    let content = item.content().to_lowercase();
    let category = item.category().to_lowercase();
    let mut score = 0;

    if query.text.contains(&category) || category.contains(&query.text) {
        score += CATEGORY_MATCH;
    }

    let content_words: HashSet<&str> = content.split_whitespace().collect();
    let overlap = query
        .words
        .iter()
        .filter(|w| content_words.contains(w.as_str()))
        .count();
    score += WORD_OVERLAP * overlap as i64;

    if content.contains(&query.text) {
        score += SUBSTRING_MATCH;
    }

    score += item.priority().score_adjustment();

    let age = item.age_hours(now);
    if age < 24.0 {
        score += RECENT_DAY;
    } else if age < 168.0 {
        score += RECENT_WEEK;
    }

    score
}

/// Ranks items by relevance, keeping at most `max_items`.
#[derive(Debug, Clone, Copy)]
pub struct RelevanceScorer {
    max_items: usize,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl RelevanceScorer {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Rank `items` against `query` as of now.
    pub fn rank<'a>(&self, query: &str, items: &'a [MemoryItem]) -> Vec<ScoredItem<'a>> {
        self.rank_at(query, items, Utc::now())
    }

    /// Rank with an explicit clock. Positive scores only, highest first;
    /// equal scores keep input order.
    pub fn rank_at<'a>(
        &self,
        query: &str,
        items: &'a [MemoryItem],
        now: DateTime<Utc>,
    ) -> Vec<ScoredItem<'a>> {
        let terms = QueryTerms::new(query);
        let mut scored: Vec<ScoredItem<'a>> = items
            .iter()
            .map(|item| ScoredItem {
                item,
                score: score_item(&terms, item, now),
            })
            .filter(|s| s.score > 0)
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(self.max_items);

        tracing::debug!(
            query = %query,
            candidates = items.len(),
            returned = scored.len(),
            "ranked memories"
        );
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CategoryPath, Priority};
    use crate::tokenizer::Tokenizer;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(cat: &str, content: &str, priority: Priority, age_h: i64) -> MemoryItem {
        MemoryItem::new(
            &CategoryPath::parse(cat).unwrap(),
            content,
            priority,
            now() - Duration::hours(age_h),
            &Tokenizer::bytes(),
        )
    }

    #[test]
    fn test_score_components() {
        let q = QueryTerms::new("port");
        // overlap 2 + substring 5, old item, normal priority
        assert_eq!(score_item(&q, &item("style", "runs on port 8002", Priority::Normal, 500), now()), 7);
        // + category 10
        assert_eq!(score_item(&q, &item("port", "runs on port 8002", Priority::Normal, 500), now()), 17);
        // + critical 5 + recent 3
        assert_eq!(score_item(&q, &item("style", "runs on port 8002", Priority::Critical, 1), now()), 15);
        // low -2, week-old +1
        assert_eq!(score_item(&q, &item("style", "use tabs", Priority::Low, 48), now()), -1);
    }

    #[test]
    fn test_recency_boundaries() {
        let q = QueryTerms::new("zzz");
        assert_eq!(score_item(&q, &item("a", "x", Priority::Normal, 23), now()), 3);
        assert_eq!(score_item(&q, &item("a", "x", Priority::Normal, 24), now()), 1);
        assert_eq!(score_item(&q, &item("a", "x", Priority::Normal, 167), now()), 1);
        assert_eq!(score_item(&q, &item("a", "x", Priority::Normal, 168), now()), 0);
    }

    #[test]
    fn test_category_match_is_bidirectional() {
        let q = QueryTerms::new("api");
        assert!(score_item(&q, &item("api-gateway", "x", Priority::Normal, 500), now()) >= 10);
        let q = QueryTerms::new("the api server");
        assert!(score_item(&q, &item("API", "x", Priority::Normal, 500), now()) >= 10);
    }

    #[test]
    fn test_duplicate_words_count_once() {
        let q = QueryTerms::new("port port port");
        let s = score_item(&q, &item("zz", "port port", Priority::Normal, 500), now());
        assert_eq!(s, 2);
    }

    #[test]
    fn test_zero_scores_excluded() {
        let items = vec![
            item("api", "runs on port 8002", Priority::Normal, 500),
            item("style", "use tabs", Priority::Normal, 500),
        ];
        let ranked = RelevanceScorer::default().rank_at("port", &items, now());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.content(), "runs on port 8002");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let items = vec![
            item("a", "alpha port", Priority::Normal, 500),
            item("b", "beta port", Priority::Normal, 10),
            item("c", "gamma port", Priority::Normal, 500),
        ];
        let ranked = RelevanceScorer::default().rank_at("port", &items, now());
        let order: Vec<&str> = ranked.iter().map(|s| s.item.category()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_ties_not_broken_by_timestamp() {
        // Both older than a week, so neither gets a recency bonus.
        let items = vec![
            item("a", "old port", Priority::Normal, 300),
            item("b", "new port", Priority::Normal, 200),
        ];
        let ranked = RelevanceScorer::default().rank_at("port", &items, now());
        let order: Vec<&str> = ranked.iter().map(|s| s.item.category()).collect();
        let scores: Vec<i64> = ranked.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![7, 7]);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_max_items_cap() {
        let items: Vec<MemoryItem> = (0..30)
            .map(|i| item("gotcha", &format!("port note {i}"), Priority::Normal, 500))
            .collect();
        assert_eq!(RelevanceScorer::default().rank_at("port", &items, now()).len(), 20);
        assert_eq!(RelevanceScorer::new(5).rank_at("port", &items, now()).len(), 5);
    }
}
