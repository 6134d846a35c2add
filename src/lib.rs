//! rankbpe - fast rank-greedy BPE tokenizer for cl100k_base and o200k_base.
//!
//! Features:
//! - Exact token ids of the reference tokenizers for both families
//! - Heap-based merging for long chunks (avoids O(N²) on pathological inputs)
//! - Bounded counting that stops as soon as a limit is passed
//! - Rayon parallelism for batch encoding
//! - Aho-Corasick for fast special token matching
//!
//! # Example
//!
//! ```rust,no_run
//! use rankbpe::{pretrained, LimitedCount};
//!
//! let tokenizer = pretrained::from_pretrained("cl100k_base").unwrap();
//! let tokens = tokenizer.encode("Hello, world!");
//! assert_eq!(tokenizer.decode(&tokens).unwrap(), "Hello, world!");
//! assert_eq!(
//!     tokenizer.count_till_limit("Hello, world!", 4),
//!     LimitedCount::Within(4)
//! );
//! ```

pub mod core;

pub use self::core::pretrained;
pub use self::core::{
    load_tiktoken_bpe, load_tiktoken_bpe_file, LimitedCount, Rank, Tokenizer, TokenizerError,
    VocabError, Vocabulary, CL100K_BASE_PATTERN, O200K_BASE_PATTERN,
};
