//! Token and byte ceilings applied to chunks after window packing.
//!
//! The window bounds chunks by characters. Providers cap their input in
//! tokens and stores cap payloads in bytes, so any span over either ceiling is
//! bisected (at whitespace when possible) until every piece fits.

use std::fmt;
use std::ops::Range;

use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer};

use crate::error::ConfigError;
use crate::models::ChunkingConfig;

/// Average bytes per BPE token used by the estimate.
const BYTES_PER_TOKEN: usize = 4;

/// Counts tokens with a loaded tokenizer, or estimates them.
pub enum TokenCounter {
    Model(Box<Tokenizer>),
    Estimate,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenCounter::Model(_) => f.write_str("TokenCounter::Model"),
            TokenCounter::Estimate => f.write_str("TokenCounter::Estimate"),
        }
    }
}

impl TokenCounter {
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        let Some(path) = &config.tokenizer_path else {
            return Ok(TokenCounter::Estimate);
        };

        let mut tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ConfigError::ValidationError(format!(
                "failed to load tokenizer {}: {}",
                path.display(),
                e
            ))
        })?;
        tokenizer
            .with_truncation(None)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        tokenizer.with_padding(None);

        Ok(TokenCounter::Model(Box::new(tokenizer)))
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenCounter::Model(tokenizer) => tokenizer
                .encode(text, false)
                .map(|encoding| encoding.len())
                .unwrap_or_else(|_| estimate(text)),
            TokenCounter::Estimate => estimate(text),
        }
    }
}

/// GPT-style pre-tokenization with each piece costing one token per
/// `BYTES_PER_TOKEN` bytes, rounded up.
fn estimate(text: &str) -> usize {
    let mut pretokenized = PreTokenizedString::from(text);
    if ByteLevel::default()
        .add_prefix_space(false)
        .pre_tokenize(&mut pretokenized)
        .is_err()
    {
        return text.len().div_ceil(BYTES_PER_TOKEN);
    }

    pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(_, (start, end), _)| (end - start).div_ceil(BYTES_PER_TOKEN).max(1))
        .sum()
}

#[derive(Debug)]
pub struct ChunkLimits {
    counter: TokenCounter,
    max_tokens: usize,
    max_bytes: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            counter: TokenCounter::Estimate,
            max_tokens: chunking.token_limit,
            max_bytes: chunking.max_chunk_bytes,
        }
    }
}

impl ChunkLimits {
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            counter: TokenCounter::from_config(config)?,
            max_tokens: config.token_limit.max(1),
            max_bytes: config.max_chunk_bytes.max(4),
        })
    }

    /// Consecutive sub-ranges of `range` that each fit, with their token
    /// counts. A range that already fits comes back unchanged.
    pub fn fit(&self, text: &str, range: Range<usize>) -> Vec<(Range<usize>, usize)> {
        let mut out = Vec::new();
        self.fit_into(text, range, &mut out);
        out
    }

    fn fit_into(&self, text: &str, range: Range<usize>, out: &mut Vec<(Range<usize>, usize)>) {
        let piece = &text[range.clone()];
        let tokens = self.counter.count(piece);
        if piece.len() <= self.max_bytes && tokens <= self.max_tokens {
            out.push((range, tokens));
            return;
        }

        match split_point(piece) {
            Some(cut) => {
                let mid = range.start + cut;
                self.fit_into(text, range.start..mid, out);
                self.fit_into(text, mid..range.end, out);
            }
            None => out.push((range, tokens)),
        }
    }
}

/// Byte offset near the middle of `piece` to cut at, just after whitespace
/// when there is any. None for a single character.
fn split_point(piece: &str) -> Option<usize> {
    let mut chars = piece.chars();
    let first = chars.next()?;
    chars.next()?;

    let mut mid = piece.len() / 2;
    while !piece.is_char_boundary(mid) {
        mid -= 1;
    }
    if mid == 0 {
        mid = first.len_utf8();
    }

    let before = piece[..mid]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8());
    let after = piece[mid..]
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| mid + i + c.len_utf8())
        .filter(|&cut| cut < piece.len());

    let nearest = match (before, after) {
        (Some(b), Some(a)) => Some(if mid - b <= a - mid { b } else { a }),
        (b, a) => b.or(a),
    };
    Some(nearest.unwrap_or(mid))
}
