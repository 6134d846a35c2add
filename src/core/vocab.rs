//! Vocabulary tables and the tiktoken file loader.
//!
//! A [`Vocabulary`] holds the fixed tables of one model family:
//!
//! - the dense `rank → bytes` table used for decoding,
//! - the reverse `bytes → rank` index used as merge priority during BPE,
//! - the reserved special tokens with their ids.
//!
//! Lower ranks merge first. Every one of the 256 single bytes must be a token,
//! which guarantees that any input can be tokenized.
//!
//! # Tiktoken Format
//!
//! Each line holds a base64-encoded token and its rank, separated by a space:
//!
//! ```text
//! SGVsbG8= 0
//! V29ybGQ= 1
//! IQ== 2
//! ```
//!
//! Where `SGVsbG8=` decodes to `Hello` (rank 0), `V29ybGQ=` to `World`
//! (rank 1) and `IQ==` to `!` (rank 2).

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Token id. Doubles as the merge priority of its byte sequence.
pub type Rank = u32;

/// Errors that can occur while loading or validating a vocabulary.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("Invalid base64 encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Invalid line format: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Missing base-alphabet token for byte 0x{0:02x}")]
    MissingByte(u8),
    #[error("Byte sequence {bytes:?} is mapped to both rank {first} and rank {second}")]
    DuplicateBytes {
        bytes: Vec<u8>,
        first: Rank,
        second: Rank,
    },
    #[error("Rank {0} is assigned to more than one byte sequence")]
    DuplicateRank(Rank),
    #[error("Empty token at rank {0}")]
    EmptyToken(Rank),
    #[error("Special token {token:?} (id {rank}) collides with an existing token")]
    SpecialTokenCollision { token: String, rank: Rank },
}

/// Load a tiktoken BPE vocabulary from raw bytes.
///
/// Format: `base64_token rank\n` per line. Blank lines are skipped.
/// A byte sequence listed twice with different ranks is rejected.
pub fn load_tiktoken_bpe(data: &[u8]) -> Result<FxHashMap<Vec<u8>, Rank>, VocabError> {
    let mut encoder = FxHashMap::default();

    for (line_no, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let space_pos = line.iter().rposition(|&b| b == b' ').ok_or_else(|| {
            VocabError::ParseError(format!("line {}: missing space separator", line_no + 1))
        })?;

        let token = STANDARD.decode(&line[..space_pos])?;

        let rank_str = std::str::from_utf8(&line[space_pos + 1..]).map_err(|_| {
            VocabError::ParseError(format!("line {}: invalid UTF-8 in rank", line_no + 1))
        })?;
        let rank: Rank = rank_str.trim().parse().map_err(|_| {
            VocabError::ParseError(format!("line {}: invalid rank: {}", line_no + 1, rank_str))
        })?;

        if let Some(first) = encoder.insert(token.clone(), rank) {
            if first != rank {
                return Err(VocabError::DuplicateBytes {
                    bytes: token,
                    first,
                    second: rank,
                });
            }
        }
    }

    Ok(encoder)
}

/// Load a tiktoken BPE vocabulary from a file path.
pub fn load_tiktoken_bpe_file(
    path: impl AsRef<std::path::Path>,
) -> Result<FxHashMap<Vec<u8>, Rank>, VocabError> {
    let data = std::fs::read(path)?;
    load_tiktoken_bpe(&data)
}

/// Immutable token tables for one model family.
///
/// Built once, then shared read-only (typically behind an `Arc`) by every
/// tokenizer using it.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    encoder: FxHashMap<Vec<u8>, Rank>,
    /// Indexed by rank; empty entries are gaps.
    decoder: Vec<Vec<u8>>,
    special_tokens: FxHashMap<String, Rank>,
    special_tokens_decoder: FxHashMap<Rank, String>,
    byte_ranks: [Rank; 256],
}

impl Vocabulary {
    /// Build a vocabulary from an encoder map and a special-token table.
    ///
    /// Fails if a single byte is missing from the base alphabet, if two byte
    /// sequences share a rank, if any token is empty, or if a special token
    /// reuses an ordinary id or another special token's id.
    pub fn new(
        encoder: FxHashMap<Vec<u8>, Rank>,
        special_tokens: FxHashMap<String, Rank>,
    ) -> Result<Self, VocabError> {
        let mut byte_ranks = [0; 256];
        for byte in 0..=u8::MAX {
            byte_ranks[byte as usize] = *encoder
                .get([byte].as_slice())
                .ok_or(VocabError::MissingByte(byte))?;
        }

        let max_rank = encoder.values().copied().max().unwrap_or(0) as usize;
        let mut decoder = vec![Vec::new(); max_rank + 1];
        for (bytes, &rank) in &encoder {
            if bytes.is_empty() {
                return Err(VocabError::EmptyToken(rank));
            }
            let slot = &mut decoder[rank as usize];
            if !slot.is_empty() {
                return Err(VocabError::DuplicateRank(rank));
            }
            slot.clone_from(bytes);
        }

        let mut special_tokens_decoder = FxHashMap::default();
        for (token, &rank) in &special_tokens {
            if token.is_empty() {
                return Err(VocabError::EmptyToken(rank));
            }
            let ordinary = decoder
                .get(rank as usize)
                .is_some_and(|bytes| !bytes.is_empty());
            if ordinary || special_tokens_decoder.insert(rank, token.clone()).is_some() {
                return Err(VocabError::SpecialTokenCollision {
                    token: token.clone(),
                    rank,
                });
            }
        }

        log::debug!(
            "built vocabulary: {} ordinary tokens, {} special tokens",
            encoder.len(),
            special_tokens.len()
        );

        Ok(Self {
            encoder,
            decoder,
            special_tokens,
            special_tokens_decoder,
            byte_ranks,
        })
    }

    /// Parse tiktoken bytes and build a vocabulary from them.
    pub fn from_tiktoken(
        data: &[u8],
        special_tokens: FxHashMap<String, Rank>,
    ) -> Result<Self, VocabError> {
        Self::new(load_tiktoken_bpe(data)?, special_tokens)
    }

    /// Rank of `bytes` if that exact sequence is an ordinary token.
    #[inline]
    pub fn lookup_rank(&self, bytes: &[u8]) -> Option<Rank> {
        self.encoder.get(bytes).copied()
    }

    /// Byte content of a token id, ordinary or special.
    pub fn lookup_bytes(&self, rank: Rank) -> Option<&[u8]> {
        match self.decoder.get(rank as usize) {
            Some(bytes) if !bytes.is_empty() => Some(bytes),
            _ => self
                .special_tokens_decoder
                .get(&rank)
                .map(|token| token.as_bytes()),
        }
    }

    /// Longest special token starting exactly at byte offset `position`.
    ///
    /// Returns the token id and its length in bytes. This is a lookup for
    /// callers that scan text themselves; segmentation finds special tokens
    /// with its own Aho-Corasick automaton and does not go through here.
    pub fn match_special_token(&self, text: &str, position: usize) -> Option<(Rank, usize)> {
        let rest = text.as_bytes().get(position..)?;
        self.special_tokens
            .iter()
            .filter(|(token, _)| rest.starts_with(token.as_bytes()))
            .map(|(token, &rank)| (rank, token.len()))
            .max_by_key(|&(_, len)| len)
    }

    /// Rank of a single byte. Always present by construction.
    #[inline]
    pub fn byte_rank(&self, byte: u8) -> Rank {
        self.byte_ranks[byte as usize]
    }

    /// Number of ordinary (mergeable) tokens.
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    /// Always false for a constructed vocabulary; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Total id space: the highest ordinary or special id plus one.
    pub fn vocab_size(&self) -> usize {
        let max_special = self.special_tokens.values().copied().max().unwrap_or(0) as usize;
        self.decoder.len().max(max_special + 1)
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, Rank> {
        &self.special_tokens
    }
}
