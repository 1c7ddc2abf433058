//! Candidate memories mined from conversation transcripts.
//!
//! Pattern extraction always runs. LLM extraction is optional and any
//! failure there simply contributes no candidates.

pub mod llm;
pub mod patterns;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::Priority;

pub use llm::LlmExtractor;

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Pattern,
    Llm,
}

/// A memory proposed for addition to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub category: String,
    pub content: String,
    pub priority: Priority,
    pub source: Source,
}

/// Flatten a transcript into plain text.
///
/// JSON sessions (an array of messages, or an object with `messages`) become
/// one `[role]: content` line per message; anything else is returned as is.
pub fn transcript_text(raw: &str) -> String {
    let messages = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(messages)) => messages,
        Ok(Value::Object(mut obj)) => match obj.remove("messages") {
            Some(Value::Array(messages)) => messages,
            _ => return raw.to_string(),
        },
        _ => return raw.to_string(),
    };

    messages
        .iter()
        .filter_map(|msg| {
            let role = msg.get("role").and_then(Value::as_str).unwrap_or("");
            let content = match msg.get("content") {
                Some(Value::String(s)) => s.as_str(),
                // Content blocks: the first text block wins.
                Some(Value::Array(blocks)) => blocks
                    .iter()
                    .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .and_then(|b| b.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or(""),
                _ => "",
            };
            (!content.is_empty()).then(|| format!("[{role}]: {content}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop candidates whose content repeats an earlier one (case-insensitive,
/// ignoring surrounding whitespace).
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.content.trim().to_lowercase()))
        .collect()
}

/// Pattern-only extraction over a raw transcript.
pub fn extract_patterns(raw: &str) -> Vec<Candidate> {
    dedup(patterns::extract(&transcript_text(raw)))
}

/// Pattern extraction plus, when `llm` is given, LLM extraction.
pub async fn extract(raw: &str, llm: Option<&LlmExtractor>) -> Vec<Candidate> {
    let text = transcript_text(raw);
    let mut candidates = patterns::extract(&text);
    if let Some(llm) = llm {
        candidates.extend(llm.extract(&text).await);
    }
    dedup(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(content: &str) -> Candidate {
        Candidate {
            category: "gotcha".into(),
            content: content.into(),
            priority: Priority::Normal,
            source: Source::Pattern,
        }
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(transcript_text("just some notes"), "just some notes");
        assert_eq!(transcript_text("{\"other\": 1}"), "{\"other\": 1}");
    }

    #[test]
    fn test_message_array() {
        let raw = r#"[{"role":"user","content":"the api is on port 8002"},
                      {"role":"assistant","content":""},
                      {"role":"assistant","content":[{"type":"tool_use"},{"type":"text","text":"ok"}]}]"#;
        assert_eq!(transcript_text(raw), "[user]: the api is on port 8002\n[assistant]: ok");
    }

    #[test]
    fn test_messages_object() {
        let raw = r#"{"messages":[{"role":"user","content":"hi"}]}"#;
        assert_eq!(transcript_text(raw), "[user]: hi");
    }

    #[test]
    fn test_dedup_case_insensitive() {
        let out = dedup(vec![cand("Use tabs"), cand("  use TABS "), cand("other")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "Use tabs");
    }

    #[tokio::test]
    async fn test_extract_without_llm() {
        let raw = "[user]: actually, the database is postgres 16";
        let out = extract(raw, None).await;
        assert!(!out.is_empty());
        assert!(out.iter().all(|c| c.source == Source::Pattern));
    }
}
