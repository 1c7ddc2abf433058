//! Memory items, priorities, categories and per-category aggregates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{MemoryError, MemoryResult};
use crate::tokenizer::Tokenizer;

/// Marker appended to truncated derivative content.
pub const ELLIPSIS: &str = "...";

/// Importance of a memory item. Unknown values in a snapshot read as
/// `Normal` instead of failing the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort rank: lower ranks are kept first under budget pressure.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    /// Additive relevance adjustment.
    pub fn score_adjustment(self) -> i64 {
        match self {
            Self::Critical => 5,
            Self::Normal => 0,
            Self::Low => -2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = MemoryError;

    fn from_str(s: &str) -> MemoryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(MemoryError::InvalidPriority(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|_| {
            crate::obs::emit_priority_defaulted(&raw);
            Self::Normal
        }))
    }
}

/// A parsed `category[:subcategory]` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryPath {
    name: String,
    sub: Option<String>,
}

impl CategoryPath {
    /// Parse `raw`, splitting on the first `:`.
    ///
    /// A string with nothing before the colon is taken whole as the
    /// category; an empty subcategory is dropped.
    pub fn parse(raw: &str) -> MemoryResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MemoryError::InvalidCategory(raw.to_string()));
        }
        match raw.split_once(':') {
            Some((name, sub)) if !name.trim().is_empty() => {
                let sub = sub.trim();
                Ok(Self {
                    name: name.trim().to_string(),
                    sub: (!sub.is_empty()).then(|| sub.to_string()),
                })
            }
            _ => Ok(Self {
                name: raw.to_string(),
                sub: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subcategory(&self) -> Option<&str> {
        self.sub.as_deref()
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub {
            Some(sub) => write!(f, "{}:{}", self.name, sub),
            None => f.write_str(&self.name),
        }
    }
}

/// A single stored knowledge snippet.
///
/// Content and token count only change together: a shortened copy is made
/// through [`MemoryItem::derive`], which recounts tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    id: String,
    category: String,
    subcategory: Option<String>,
    content: String,
    priority: Priority,
    #[serde(rename = "tokens")]
    token_count: usize,
    #[serde(with = "epoch_seconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    compressed: bool,
}

impl MemoryItem {
    /// Build a new item, counting tokens with `tokenizer`.
    ///
    /// The timestamp is kept at microsecond precision so it survives the
    /// snapshot round trip exactly.
    pub fn new(
        category: &CategoryPath,
        content: impl Into<String>,
        priority: Priority,
        timestamp: DateTime<Utc>,
        tokenizer: &Tokenizer,
    ) -> Self {
        let content = content.into();
        let timestamp = timestamp.trunc_subsecs(6);
        Self {
            id: generate_id(&content, timestamp, 0),
            category: category.name().to_string(),
            subcategory: category.subcategory().map(str::to_string),
            token_count: tokenizer.count(&content),
            content,
            priority,
            timestamp,
            compressed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn subcategory(&self) -> Option<&str> {
        self.subcategory.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn is_critical(&self) -> bool {
        self.priority == Priority::Critical
    }

    /// Hours elapsed since creation, relative to `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.timestamp).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Copy of this item with replacement content, flagged as compressed.
    pub fn derive(&self, content: impl Into<String>, tokenizer: &Tokenizer) -> Self {
        let content = content.into();
        Self {
            token_count: tokenizer.count(&content),
            content,
            compressed: true,
            ..self.clone()
        }
    }

    /// Give the item a fresh id after a collision with a live one.
    pub(crate) fn reassign_id(&mut self, salt: u32) {
        self.id = generate_id(&self.content, self.timestamp, salt);
    }
}

/// First 12 hex chars of SHA-256 over content and creation time.
fn generate_id(content: &str, timestamp: DateTime<Utc>, salt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(epoch_seconds::to_f64(&timestamp).to_string().as_bytes());
    if salt > 0 {
        hasher.update(salt.to_le_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(12);
    id
}

/// Running totals for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    count: usize,
    tokens: usize,
}

impl CategoryAggregate {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub(crate) fn record_add(&mut self, tokens: usize) {
        self.count += 1;
        self.tokens += tokens;
    }

    /// Subtract one item. Returns `false` if either total had to be
    /// clamped at zero.
    pub(crate) fn record_remove(&mut self, tokens: usize) -> bool {
        let consistent = self.count >= 1 && self.tokens >= tokens;
        self.count = self.count.saturating_sub(1);
        self.tokens = self.tokens.saturating_sub(tokens);
        consistent
    }
}

/// Timestamps persisted as floating epoch seconds.
pub(crate) mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn to_f64(ts: &DateTime<Utc>) -> f64 {
        ts.timestamp_micros() as f64 / 1_000_000.0
    }

    pub fn from_f64(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_f64(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_f64(secs).ok_or_else(|| D::Error::custom(format!("timestamp out of range: {secs}")))
    }
}
