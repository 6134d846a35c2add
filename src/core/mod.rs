//! Core tokenization engine for rankbpe.
//!
//! # Architecture
//!
//! - [`vocab`]: tiktoken loading and the immutable [`Vocabulary`] tables
//! - [`segment`]: pre-tokenization into chunks, with special-token extraction
//! - [`bpe`]: rank-greedy merging of a single chunk (linear scan or heap)
//! - [`Tokenizer`]: encoding, counting and decoding over a shared vocabulary
//! - [`pretrained`]: the cl100k_base and o200k_base families
//!
//! # Performance Optimizations
//!
//! - **Whole-chunk lookup**: a chunk that is already a token skips merging
//! - **Heap merging**: long chunks merge in O(n log n) instead of O(n²)
//! - **Rayon parallelism**: multi-core encoding for batch operations
//! - **FxHashMap**: faster hashing than standard HashMap for byte keys
//! - **Aho-Corasick**: O(N) multi-pattern matching for special tokens

mod bpe;
pub mod pretrained;
mod segment;
mod tokenizer;
mod vocab;

pub use bpe::{byte_pair_count, byte_pair_encode};
pub use segment::{
    Chunk, Chunks, Segmenter, CL100K_BASE_PATTERN, DEFAULT_BACKTRACK_LIMIT, O200K_BASE_PATTERN,
};
pub use tokenizer::{LimitedCount, Tokenizer, TokenizerError};
pub use vocab::{load_tiktoken_bpe, load_tiktoken_bpe_file, Rank, VocabError, Vocabulary};
