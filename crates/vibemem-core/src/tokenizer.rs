//! Exact token counting and token-bounded truncation.
//!
//! A [`Tokenizer`] is constructed once and shared (behind an `Arc`) by the
//! store, the compressor and the sync engine, so every budget number in a
//! run is computed with the same encoding. Encoders are created lazily per
//! model name and cached inside the instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Encoding used when no model is named, and the first fallback.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Errors from loading an encoding. Never surfaced by `count`/`truncate`.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("failed to load encoding {name}: {reason}")]
    Load { name: String, reason: String },
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

/// A subword encoding: text to token ids and back.
pub trait Encoding: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a token sequence. Returns `None` when the tokens do not form
    /// valid UTF-8 (e.g. a prefix that splits a multi-byte character).
    fn decode(&self, tokens: &[u32]) -> Option<String>;
}

/// Byte-pair encoding backed by `tiktoken-rs`.
pub struct BpeEncoding {
    bpe: CoreBPE,
}

impl BpeEncoding {
    pub fn new(bpe: CoreBPE) -> Self {
        Self { bpe }
    }
}

impl Encoding for BpeEncoding {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        self.bpe.decode(tokens.to_vec()).ok()
    }
}

/// One token per UTF-8 byte. Last-resort fallback; also handy wherever
/// token counts must be predictable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteEncoding;

impl Encoding for ByteEncoding {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        let bytes = tokens
            .iter()
            .map(|&t| u8::try_from(t).ok())
            .collect::<Option<Vec<u8>>>()?;
        String::from_utf8(bytes).ok()
    }
}

/// Source of encodings by name.
pub trait EncodingLoader: Send + Sync {
    fn load(&self, name: &str) -> TokenizerResult<Arc<dyn Encoding>>;
}

/// Loads the BPE tables bundled with `tiktoken-rs`.
///
/// Accepts encoding names (`cl100k_base`, `o200k_base`, ...) as well as model
/// names tiktoken knows how to map (`gpt-4o`, `gpt-3.5-turbo`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenLoader;

impl EncodingLoader for TiktokenLoader {
    fn load(&self, name: &str) -> TokenizerResult<Arc<dyn Encoding>> {
        let bpe = match name {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" | "gpt2" => tiktoken_rs::r50k_base(),
            model => match tiktoken_rs::get_bpe_from_model(model) {
                Ok(bpe) => Ok(bpe),
                Err(_) => return Err(TokenizerError::UnknownEncoding(model.to_string())),
            },
        }
        .map_err(|e| TokenizerError::Load {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(BpeEncoding::new(bpe)))
    }
}

/// Hands out the same encoding for every name.
struct FixedLoader(Arc<dyn Encoding>);

impl EncodingLoader for FixedLoader {
    fn load(&self, _name: &str) -> TokenizerResult<Arc<dyn Encoding>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Token counting service with a per-instance encoder cache.
pub struct Tokenizer {
    model: String,
    loader: Box<dyn EncodingLoader>,
    encoders: RwLock<HashMap<String, Arc<dyn Encoding>>>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Tokenizer using `cl100k_base` from tiktoken.
    pub fn new() -> Self {
        Self::for_model(DEFAULT_ENCODING)
    }

    /// Tokenizer whose default encoding is `model` (encoding or model name).
    pub fn for_model(model: impl Into<String>) -> Self {
        Self::with_loader(model, TiktokenLoader)
    }

    pub fn with_loader(model: impl Into<String>, loader: impl EncodingLoader + 'static) -> Self {
        Self {
            model: model.into(),
            loader: Box::new(loader),
            encoders: RwLock::new(HashMap::new()),
        }
    }

    /// Tokenizer that always uses `encoding`, whatever model is asked for.
    pub fn with_encoding(encoding: Arc<dyn Encoding>) -> Self {
        Self::with_loader("fixed", FixedLoader(encoding))
    }

    /// Tokenizer counting one token per byte.
    pub fn bytes() -> Self {
        Self::with_encoding(Arc::new(ByteEncoding))
    }

    /// Name of the default model/encoding.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cached encoder for `model`, created on first use.
    ///
    /// Falls back to [`DEFAULT_ENCODING`], then to [`ByteEncoding`]; the
    /// fallback is cached under the requested name.
    pub fn encoding(&self, model: &str) -> Arc<dyn Encoding> {
        if let Some(enc) = self
            .encoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
        {
            return Arc::clone(enc);
        }

        let mut encoders = self.encoders.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have created it between the two locks.
        if let Some(enc) = encoders.get(model) {
            return Arc::clone(enc);
        }
        let enc = self.load_with_fallback(model);
        encoders.insert(model.to_string(), Arc::clone(&enc));
        enc
    }

    fn load_with_fallback(&self, model: &str) -> Arc<dyn Encoding> {
        match self.loader.load(model) {
            Ok(enc) => enc,
            Err(err) => {
                warn!(event = "tokenizer.fallback", model = %model, error = %err, fallback = DEFAULT_ENCODING);
                if model != DEFAULT_ENCODING {
                    if let Ok(enc) = self.loader.load(DEFAULT_ENCODING) {
                        return enc;
                    }
                }
                warn!(event = "tokenizer.fallback", model = %model, fallback = "bytes");
                Arc::new(ByteEncoding)
            }
        }
    }

    /// Exact token count of `text` under the default model.
    pub fn count(&self, text: &str) -> usize {
        self.count_for(&self.model, text)
    }

    pub fn count_for(&self, model: &str, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoding(model).encode(text).len()
    }

    /// Cut `text` to at most `max_tokens` tokens, on a token boundary.
    ///
    /// Text that already fits is returned unchanged.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        self.truncate_for(&self.model, text, max_tokens)
    }

    pub fn truncate_for(&self, model: &str, text: &str, max_tokens: usize) -> String {
        let enc = self.encoding(model);
        let tokens = enc.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        // Back off until the prefix decodes cleanly.
        (0..=max_tokens)
            .rev()
            .find_map(|end| enc.decode(&tokens[..end]))
            .unwrap_or_default()
    }

    /// Quick estimate without encoding (about four characters per token).
    pub fn estimate_from_chars(text: &str) -> usize {
        text.chars().count() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl EncodingLoader for CountingLoader {
        fn load(&self, name: &str) -> TokenizerResult<Arc<dyn Encoding>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if name == "broken" {
                return Err(TokenizerError::UnknownEncoding(name.into()));
            }
            Ok(Arc::new(ByteEncoding))
        }
    }

    struct FailingLoader;

    impl EncodingLoader for FailingLoader {
        fn load(&self, name: &str) -> TokenizerResult<Arc<dyn Encoding>> {
            Err(TokenizerError::UnknownEncoding(name.into()))
        }
    }

    #[test]
    fn test_count_empty_is_zero() {
        let tok = Tokenizer::new();
        assert_eq!(tok.count(""), 0);
    }

    #[test]
    fn test_count_cl100k() {
        let tok = Tokenizer::new();
        assert_eq!(tok.count("hello world"), 2);
        assert!(tok.count("API uses port 8002") > 0);
    }

    #[test]
    fn test_truncate_respects_limit() {
        let tok = Tokenizer::new();
        let text = "word ".repeat(200);
        let cut = tok.truncate(&text, 25);
        assert!(tok.count(&cut) <= 25);
        assert!(text.starts_with(&cut));
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        let tok = Tokenizer::new();
        assert_eq!(tok.truncate("short text", 100), "short text");
    }

    #[test]
    fn test_truncate_never_splits_characters() {
        let tok = Tokenizer::bytes();
        // "é" is two bytes; a 3-byte cut must back off to 2.
        let cut = tok.truncate("aéb", 2);
        assert_eq!(cut, "a");
        let cut = tok.truncate("aéb", 3);
        assert_eq!(cut, "aé");
    }

    #[test]
    fn test_truncate_zero_tokens() {
        let tok = Tokenizer::bytes();
        assert_eq!(tok.truncate("abc", 0), "");
    }

    #[test]
    fn test_encoder_created_once_per_model() {
        let loads = Arc::new(AtomicUsize::new(0));
        let tok = Tokenizer::with_loader(
            "any",
            CountingLoader {
                loads: Arc::clone(&loads),
            },
        );
        tok.count("abc");
        tok.count("def");
        tok.truncate("ghi", 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        tok.count_for("other", "abc");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let loads = Arc::new(AtomicUsize::new(0));
        let tok = Tokenizer::with_loader(
            "broken",
            CountingLoader {
                loads: Arc::clone(&loads),
            },
        );
        assert_eq!(tok.count("abcd"), 4);
        // failed attempt + default
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        tok.count("more");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_total_failure_uses_bytes() {
        let tok = Tokenizer::with_loader("nothing", FailingLoader);
        assert_eq!(tok.count("abc"), 3);
    }

    #[test]
    fn test_unknown_tiktoken_name_falls_back_to_cl100k() {
        let tok = Tokenizer::for_model("definitely-not-a-model");
        assert_eq!(tok.count("hello world"), 2);
    }

    #[test]
    fn test_estimate_from_chars() {
        assert_eq!(Tokenizer::estimate_from_chars("abcdefgh"), 2);
        assert_eq!(Tokenizer::estimate_from_chars(""), 0);
    }
}
