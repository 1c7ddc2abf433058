//! Regex-driven extraction of corrections and specifications.

use std::sync::OnceLock;

use regex::Regex;

use super::{Candidate, Source};
use crate::memory::Priority;

const CORRECTION_PATTERNS: &[&str] = &[
    r"no[,.]?\s+(it'?s|the|that|this)\s+(?:actually\s+)?(.+)",
    r"not\s+(\d+)[,.]?\s+(?:it'?s|use)\s+(\d+)",
    r"wrong[,.]?\s+(.+)",
    r"actually[,.]?\s+(.+)",
    r"(?:the\s+)?correct\s+(?:one\s+is|answer\s+is|way\s+is)\s+(.+)",
    r"should\s+be\s+(.+?)\s+not\s+(.+)",
    r"use\s+(.+?)\s+instead\s+of\s+(.+)",
    r"don'?t\s+(?:use|do)\s+(.+)",
    r"never\s+(.+)",
    r"always\s+(.+)",
];

const SPECIFICATION_PATTERNS: &[&str] = &[
    r"(?:the\s+)?api\s+(?:is\s+)?(?:on|at)\s+(?:port\s+)?(\d+)",
    r"(?:the\s+)?(?:server|service|app)\s+runs\s+(?:on|at)\s+(.+)",
    r"(?:we\s+)?use\s+(.+?)\s+for\s+(.+)",
    r"(?:the\s+)?architecture\s+is\s+(.+)",
    r"(?:the\s+)?database\s+is\s+(.+)",
    r"credentials?\s+(?:are|is)\s+(.+)",
    r"(?:the\s+)?format\s+(?:is|should\s+be)\s+(.+)",
];

/// Ordered: the first category with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("arch", &["architecture", "structure", "design", "pattern", "flow", "system"]),
    ("api", &["api", "endpoint", "port", "url", "route", "request", "response"]),
    ("gotcha", &["gotcha", "watch out", "careful", "note", "warning", "caveat", "bug"]),
    ("error", &["error", "mistake", "wrong", "incorrect", "don't", "never", "avoid"]),
    ("cred", &["credential", "password", "api key", "token", "secret", "auth"]),
    ("style", &["style", "format", "convention", "naming", "prefer", "always use"]),
    ("platform", &["hackerone", "bugcrowd", "github", "gitlab", "jira"]),
];

const DEFAULT_CATEGORY: &str = "gotcha";

/// Matches shorter than this many characters are ignored.
const MIN_MATCH_CHARS: usize = 11;

static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static ROLE_PREFIX: OnceLock<Option<Regex>> = OnceLock::new();

fn patterns() -> &'static [Regex] {
    PATTERNS.get_or_init(|| {
        CORRECTION_PATTERNS
            .iter()
            .chain(SPECIFICATION_PATTERNS)
            .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
            .collect()
    })
}

/// Keyword-based category for `text`.
pub fn categorize(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(DEFAULT_CATEGORY, |(category, _)| category)
}

/// Strip a leading role tag, collapse whitespace, capitalise the first
/// letter.
pub fn clean_text(text: &str) -> String {
    let role = ROLE_PREFIX.get_or_init(|| Regex::new(r"(?i)^\[(human|assistant|user|ai)\]:\s*").ok());
    let stripped = match role {
        Some(re) => re.replace(text, ""),
        None => text.into(),
    };
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Every pattern match in `text` that is long enough to be useful.
pub fn extract(text: &str) -> Vec<Candidate> {
    patterns()
        .iter()
        .flat_map(|re| re.find_iter(text))
        .map(|m| m.as_str().trim())
        .filter(|s| s.chars().count() >= MIN_MATCH_CHARS)
        .map(|s| Candidate {
            category: categorize(s).to_string(),
            content: clean_text(s),
            priority: Priority::Normal,
            source: Source::Pattern,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(
            patterns().len(),
            CORRECTION_PATTERNS.len() + SPECIFICATION_PATTERNS.len()
        );
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("The API runs on port 8002"), "api");
        assert_eq!(categorize("system design is layered"), "arch");
        assert_eq!(categorize("never commit secrets"), "error");
        assert_eq!(categorize("hello there"), "gotcha");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("[user]:   use   tabs\n here"), "Use tabs here");
        assert_eq!(clean_text("[Assistant]: ok"), "Ok");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_extract_correction() {
        let out = extract("[user]: no, it's actually port 8002 not 8000");
        assert!(out.iter().any(|c| c.content.starts_with("No, it's actually port 8002")));
        assert!(out.iter().all(|c| c.source == Source::Pattern));
    }

    #[test]
    fn test_extract_specification_category() {
        let out = extract("the api is on port 8002");
        let hit = out.iter().find(|c| c.content == "The api is on port 8002").unwrap();
        assert_eq!(hit.category, "api");
    }

    #[test]
    fn test_short_matches_skipped() {
        // "never x" is a match but too short
        assert!(extract("never x").is_empty());
    }
}
