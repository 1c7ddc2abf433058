//! Budget bound and protection guarantees of the compressor.

use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};

use vibemem_core::compression::{compress_items, CompressionPolicy};
use vibemem_core::memory::{CategoryPath, MemoryItem, Priority};
use vibemem_core::Tokenizer;

const CATEGORIES: &[&str] = &["arch", "api", "style", "gotcha", "error", "platform"];

fn item(tok: &Tokenizer, cat: &str, content: &str, priority: Priority, age_min: i64) -> MemoryItem {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    MemoryItem::new(
        &CategoryPath::parse(cat).unwrap(),
        content,
        priority,
        base - Duration::minutes(age_min),
        tok,
    )
}

/// Small deterministic generator so the item sets vary between seeds.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn item_set(tok: &Tokenizer, seed: u64, n: usize) -> Vec<MemoryItem> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|i| {
            let cat = CATEGORIES[(rng.next() as usize) % CATEGORIES.len()];
            let priority = match rng.next() % 10 {
                0 => Priority::Critical,
                1..=2 => Priority::Low,
                _ => Priority::Normal,
            };
            let len = 5 + (rng.next() as usize) % 400;
            let content = format!("item {i} {}", "word ".repeat(len / 5));
            item(tok, cat, &content, priority, rng.next() as i64 % 10_000)
        })
        .collect()
}

fn total(items: &[MemoryItem]) -> usize {
    items.iter().map(|m| m.token_count()).sum()
}

#[test]
fn test_result_fits_budget_when_protected_fits() {
    let tok = Tokenizer::bytes();
    let policy = CompressionPolicy::default();

    for seed in 1..=25 {
        let items = item_set(&tok, seed, 30);
        let protected: usize = items
            .iter()
            .filter(|m| policy.is_protected(m))
            .map(|m| m.token_count())
            .sum();
        for extra in [0, 1, 50, 101, 500, 2_000, 100_000] {
            let target = protected + extra;
            let out = compress_items(&items, target, &policy, &tok);
            assert!(
                total(&out) <= target,
                "seed {seed} target {target}: {} tokens",
                total(&out)
            );
            assert!(total(&out) <= total(&items));
        }
    }
}

#[test]
fn test_critical_items_never_dropped() {
    let tok = Tokenizer::bytes();
    let policy = CompressionPolicy::default();

    for seed in 1..=25 {
        let items = item_set(&tok, seed, 30);
        let critical: HashSet<&str> = items
            .iter()
            .filter(|m| m.priority() == Priority::Critical)
            .map(|m| m.id())
            .collect();
        for target in [0, 10, 100, 1_000, 10_000] {
            let out = compress_items(&items, target, &policy, &tok);
            let kept: HashSet<&str> = out.iter().map(|m| m.id()).collect();
            for id in &critical {
                assert!(kept.contains(id), "seed {seed} target {target}: critical {id} dropped");
            }
        }
    }
}

#[test]
fn test_derivatives_are_flagged_and_stay_out_of_inputs() {
    let tok = Tokenizer::bytes();
    let items = item_set(&tok, 7, 30);
    let snapshot = items.clone();

    let out = compress_items(&items, 300, &CompressionPolicy::default(), &tok);
    assert_eq!(items, snapshot);
    for m in &out {
        let original = items.iter().find(|o| o.id() == m.id()).unwrap();
        if m.is_compressed() {
            assert!(m.content().ends_with("..."));
            assert!(m.token_count() < original.token_count());
        } else {
            assert_eq!(m, original);
        }
    }
}

#[test]
fn test_scenario_both_fit_protected_first() {
    let tok = Tokenizer::for_model("cl100k_base");
    let items = vec![
        item(&tok, "style", "prefer snake_case", Priority::Normal, 0),
        item(&tok, "arch", "API uses port 8002", Priority::Critical, 0),
    ];

    let out = compress_items(&items, 10_000, &CompressionPolicy::default(), &tok);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], items[1]);
    assert_eq!(out[1], items[0]);
    assert!(out.iter().all(|m| !m.is_compressed()));
}

#[test]
fn test_scenario_oversized_critical_truncated() {
    let tok = Tokenizer::bytes();
    let items = vec![item(&tok, "api", &"z".repeat(500), Priority::Critical, 0)];

    let out = compress_items(&items, 100, &CompressionPolicy::default(), &tok);
    assert_eq!(out.len(), 1);
    assert!(out[0].is_compressed());
    assert!(out[0].content().ends_with("..."));
    assert!(out[0].token_count() <= 100);
}

#[test]
fn test_many_protected_items_exceed_budget_best_effort() {
    let tok = Tokenizer::bytes();
    let items: Vec<MemoryItem> = (0..10)
        .map(|i| item(&tok, "arch", &format!("{i}{}", "a".repeat(199)), Priority::Normal, i))
        .collect();

    // 10 items share 100 tokens, but each keeps at least the 50-token floor.
    let out = compress_items(&items, 100, &CompressionPolicy::default(), &tok);
    assert_eq!(out.len(), 10);
    assert!(total(&out) > 100);
    assert!(total(&out) < total(&items));
}

#[test]
fn test_custom_preserve_categories() {
    let tok = Tokenizer::bytes();
    let policy = CompressionPolicy::default().with_preserve_categories(["style"]);
    let items = vec![
        item(&tok, "arch", &"a".repeat(300), Priority::Normal, 0),
        item(&tok, "style", &"s".repeat(300), Priority::Normal, 0),
    ];

    let out = compress_items(&items, 320, &policy, &tok);
    assert_eq!(out[0].category(), "style");
    assert!(!out[0].is_compressed());
    assert!(total(&out) <= 320);
}
