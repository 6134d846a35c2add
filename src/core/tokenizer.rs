use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::bpe::{byte_pair_count, byte_pair_encode};
use super::segment::{Chunk, Segmenter, DEFAULT_BACKTRACK_LIMIT};
use super::vocab::{load_tiktoken_bpe_file, Rank, VocabError, Vocabulary};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Regex compilation error: {0}")]
    RegexError(#[from] fancy_regex::Error),
    #[error("Vocabulary error: {0}")]
    VocabError(#[from] VocabError),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("Decoding error: unknown token id {0}")]
    UnknownToken(Rank),
    #[error("Decoding error: invalid UTF-8 after {valid_up_to} bytes")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("Unknown pretrained model: {0}")]
    UnknownPretrained(String),
    #[error("Invalid tokenizer: {0}")]
    InvalidTokenizer(String),
}

/// Result of a bounded count.
///
/// `ExceedsLimit` is its own variant so that no count value doubles as a
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedCount {
    /// The exact token count, no larger than the limit.
    Within(usize),
    /// The count passed the limit; counting stopped early.
    ExceedsLimit,
}

impl LimitedCount {
    /// The exact count, or `None` if the limit was exceeded.
    pub fn count(self) -> Option<usize> {
        match self {
            LimitedCount::Within(count) => Some(count),
            LimitedCount::ExceedsLimit => None,
        }
    }

    pub fn exceeds_limit(self) -> bool {
        self == LimitedCount::ExceedsLimit
    }
}

/// Rank-greedy BPE tokenizer.
///
/// # Performance Characteristics
///
/// - **Single text encoding**: [`encode`](Self::encode) runs sequentially,
///   which is fastest for everything short of very large inputs.
/// - **Batch encoding**: [`encode_batch`](Self::encode_batch) parallelizes
///   across texts with Rayon.
/// - **Very large single texts**: [`encode_rayon`](Self::encode_rayon)
///   parallelizes across the chunks of one text.
///
/// The tokenizer holds no mutable state. Clones share the same
/// [`Vocabulary`], and one instance can serve any number of threads.
#[derive(Clone)]
pub struct Tokenizer {
    vocab: Arc<Vocabulary>,
    segmenter: Segmenter,
}

impl Tokenizer {
    /// Create a tokenizer over a shared vocabulary and a split pattern.
    pub fn new(vocab: Arc<Vocabulary>, pattern: &str) -> Result<Self, TokenizerError> {
        let segmenter = Segmenter::new(pattern, vocab.special_tokens(), DEFAULT_BACKTRACK_LIMIT)?;
        log::debug!(
            "created tokenizer: vocab_size={}, special_tokens={}",
            vocab.vocab_size(),
            vocab.special_tokens().len()
        );
        Ok(Self { vocab, segmenter })
    }

    /// Create a tokenizer from an encoder map, special tokens and a pattern.
    ///
    /// # Arguments
    /// * `encoder` - Map of byte sequences to token IDs
    /// * `special_tokens` - Map of special token strings to token IDs
    /// * `pattern` - Regex pattern for pre-tokenization
    pub fn from_encoder(
        encoder: FxHashMap<Vec<u8>, Rank>,
        special_tokens: FxHashMap<String, Rank>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        let vocab = Vocabulary::new(encoder, special_tokens)?;
        Self::new(Arc::new(vocab), pattern)
    }

    /// Create a tokenizer from a tiktoken vocabulary file.
    pub fn from_file(
        vocab_path: impl AsRef<std::path::Path>,
        pattern: &str,
        special_tokens: FxHashMap<String, Rank>,
    ) -> Result<Self, TokenizerError> {
        let encoder = load_tiktoken_bpe_file(vocab_path)?;
        Self::from_encoder(encoder, special_tokens, pattern)
    }

    /// Create a tokenizer from raw tiktoken vocabulary bytes.
    pub fn from_bytes(
        vocab_data: &[u8],
        pattern: &str,
        special_tokens: FxHashMap<String, Rank>,
    ) -> Result<Self, TokenizerError> {
        let vocab = Vocabulary::from_tiktoken(vocab_data, special_tokens)?;
        Self::new(Arc::new(vocab), pattern)
    }

    /// Set the regex backtracking budget used during pre-tokenization.
    ///
    /// # Example
    /// ```ignore
    /// let tokenizer = from_pretrained("cl100k_base")?.backtrack_limit(10_000_000)?;
    /// ```
    pub fn backtrack_limit(mut self, limit: usize) -> Result<Self, TokenizerError> {
        self.segmenter = self.segmenter.with_backtrack_limit(limit)?;
        Ok(self)
    }

    /// Encode one ordinary chunk.
    fn encode_piece(&self, piece: &[u8]) -> Vec<Rank> {
        // Fast path: the whole chunk is a known token
        if let Some(rank) = self.vocab.lookup_rank(piece) {
            return vec![rank];
        }
        byte_pair_encode(piece, &self.vocab)
    }

    fn count_piece(&self, piece: &[u8]) -> usize {
        if self.vocab.lookup_rank(piece).is_some() {
            return 1;
        }
        byte_pair_count(piece, &self.vocab)
    }

    fn encode_chunks(&self, text: &str, allow_special: bool) -> Vec<Rank> {
        let bytes = text.as_bytes();
        let mut tokens = Vec::with_capacity(text.len() / 3);
        for chunk in self.segmenter.chunks(text, allow_special) {
            match chunk {
                Chunk::Piece(range) => tokens.extend(self.encode_piece(&bytes[range])),
                Chunk::Special { rank, .. } => tokens.push(rank),
            }
        }
        tokens
    }

    /// Token count of each chunk, produced lazily.
    fn chunk_counts<'a>(
        &'a self,
        text: &'a str,
        allow_special: bool,
    ) -> impl Iterator<Item = usize> + 'a {
        let bytes = text.as_bytes();
        self.segmenter
            .chunks(text, allow_special)
            .map(move |chunk| match chunk {
                Chunk::Piece(range) => self.count_piece(&bytes[range]),
                Chunk::Special { .. } => 1,
            })
    }

    /// Encode text to token IDs (special-token literals are plain text).
    pub fn encode(&self, text: &str) -> Vec<Rank> {
        self.encode_chunks(text, false)
    }

    /// Encode text with special token handling.
    ///
    /// Special tokens in the input are emitted directly without BPE.
    pub fn encode_with_special(&self, text: &str) -> Vec<Rank> {
        self.encode_chunks(text, true)
    }

    /// Encode text using Rayon parallelism across its chunks.
    ///
    /// Only beneficial for very large texts (>1MB). Output is identical to
    /// [`encode`](Self::encode).
    pub fn encode_rayon(&self, text: &str) -> Vec<Rank> {
        let bytes = text.as_bytes();
        let chunks = self.segmenter.split(text, false);

        chunks
            .par_iter()
            .map(|chunk| match chunk {
                Chunk::Piece(range) => self.encode_piece(&bytes[range.clone()]),
                Chunk::Special { rank, .. } => vec![*rank],
            })
            .collect::<Vec<Vec<Rank>>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Number of tokens [`encode`](Self::encode) would produce.
    pub fn count(&self, text: &str) -> usize {
        self.chunk_counts(text, false).sum()
    }

    /// Number of tokens [`encode_with_special`](Self::encode_with_special)
    /// would produce.
    pub fn count_with_special(&self, text: &str) -> usize {
        self.chunk_counts(text, true).sum()
    }

    /// Count tokens, giving up as soon as the count passes `limit`.
    ///
    /// Returns the exact count when it is at most `limit`.
    pub fn count_till_limit(&self, text: &str, limit: usize) -> LimitedCount {
        let mut total = 0usize;
        for count in self.chunk_counts(text, false) {
            total += count;
            if total > limit {
                return LimitedCount::ExceedsLimit;
            }
        }
        LimitedCount::Within(total)
    }

    /// Decode token IDs back to bytes.
    ///
    /// Fails on the first id that is neither an ordinary nor a special token.
    pub fn decode_bytes(&self, tokens: &[Rank]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);

        for &token in tokens {
            let bytes = self
                .vocab
                .lookup_bytes(token)
                .ok_or(TokenizerError::UnknownToken(token))?;
            result.extend_from_slice(bytes);
        }

        Ok(result)
    }

    /// Decode token IDs to a string.
    ///
    /// UTF-8 is validated once over the concatenated bytes, since a token may
    /// end in the middle of a multi-byte character.
    pub fn decode(&self, tokens: &[Rank]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        String::from_utf8(bytes).map_err(|err| TokenizerError::InvalidUtf8 {
            valid_up_to: err.utf8_error().valid_up_to(),
        })
    }

    /// Decode token IDs to a string, replacing invalid UTF-8 with U+FFFD.
    pub fn decode_lossy(&self, tokens: &[Rank]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<Rank>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch encode multiple texts with special token handling.
    pub fn encode_batch_with_special(&self, texts: &[String]) -> Vec<Vec<Rank>> {
        texts
            .par_iter()
            .map(|text| self.encode_with_special(text))
            .collect()
    }

    /// Batch count multiple texts in parallel.
    pub fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.par_iter().map(|text| self.count(text)).collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<Rank>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Total id space, including special tokens.
    pub fn vocab_size(&self) -> usize {
        self.vocab.vocab_size()
    }

    /// The shared vocabulary.
    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    /// The pre-tokenizer.
    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, Rank> {
        self.vocab.special_tokens()
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.vocab_size())
            .field("special_tokens", &self.vocab.special_tokens().len())
            .field("pattern", &self.segmenter.pattern())
            .finish()
    }
}
