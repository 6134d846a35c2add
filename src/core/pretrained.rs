//! Pretrained tokenizers for the supported model families:
//! - `cl100k_base` - OpenAI GPT-4, GPT-3.5-turbo (~100k tokens)
//! - `o200k_base` - OpenAI GPT-4o (~200k tokens)
//!
//! Vocabulary files are read at runtime from the directory named by the
//! `RANKBPE_VOCAB_DIR` environment variable, or from the crate's `vocabs/`
//! directory when the variable is unset.
//!
//! # Example
//!
//! ```rust,no_run
//! use rankbpe::pretrained::from_pretrained;
//!
//! let tokenizer = from_pretrained("cl100k_base").unwrap();
//! let tokens = tokenizer.encode("Hello, world!");
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use super::segment::{CL100K_BASE_PATTERN, O200K_BASE_PATTERN};
use super::tokenizer::{Tokenizer, TokenizerError};
use super::vocab::Rank;

/// Environment variable naming the directory that holds `*.tiktoken` files.
pub const VOCAB_DIR_ENV: &str = "RANKBPE_VOCAB_DIR";

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// OpenAI cl100k_base (GPT-4, GPT-3.5-turbo)
    Cl100kBase,
    /// OpenAI o200k_base (GPT-4o)
    O200kBase,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Cl100kBase, ModelFamily::O200kBase];

    /// Parse a family from its encoding name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cl100k_base" => Some(Self::Cl100kBase),
            "o200k_base" => Some(Self::O200kBase),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
        }
    }

    /// Get all supported vocabulary names.
    pub fn supported_names() -> &'static [&'static str] {
        &["cl100k_base", "o200k_base"]
    }

    /// Split pattern for this family.
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Cl100kBase => CL100K_BASE_PATTERN,
            Self::O200kBase => O200K_BASE_PATTERN,
        }
    }

    /// File name of the tiktoken vocabulary for this family.
    pub fn vocab_file_name(self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base.tiktoken",
            Self::O200kBase => "o200k_base.tiktoken",
        }
    }

    /// Id of `<|endoftext|>`.
    pub fn eos_token_id(self) -> Rank {
        match self {
            Self::Cl100kBase => 100257,
            Self::O200kBase => 199999,
        }
    }

    /// Special tokens of this family.
    pub fn special_tokens(self) -> FxHashMap<String, Rank> {
        let table: &[(&str, Rank)] = match self {
            Self::Cl100kBase => &[
                ("<|endoftext|>", 100257),
                ("<|fim_prefix|>", 100258),
                ("<|fim_middle|>", 100259),
                ("<|fim_suffix|>", 100260),
                ("<|endofprompt|>", 100276),
            ],
            Self::O200kBase => &[("<|endoftext|>", 199999), ("<|endofprompt|>", 200018)],
        };
        table
            .iter()
            .map(|&(token, rank)| (token.to_string(), rank))
            .collect()
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Directory searched for vocabulary files.
pub fn default_vocab_dir() -> PathBuf {
    match std::env::var_os(VOCAB_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/vocabs")),
    }
}

/// Create a pretrained tokenizer by vocabulary name.
///
/// # Supported Names
/// - `cl100k_base` - OpenAI GPT-4, GPT-3.5-turbo
/// - `o200k_base` - OpenAI GPT-4o
pub fn from_pretrained(name: &str) -> Result<Tokenizer, TokenizerError> {
    let family = ModelFamily::from_name(name).ok_or_else(|| {
        TokenizerError::UnknownPretrained(format!(
            "{}. Supported: {}",
            name,
            ModelFamily::supported_names().join(", ")
        ))
    })?;

    from_family(family)
}

/// Create a tokenizer for `family` from the default vocabulary directory.
pub fn from_family(family: ModelFamily) -> Result<Tokenizer, TokenizerError> {
    from_family_in(family, default_vocab_dir())
}

/// Create a tokenizer for `family` from the vocabulary file in `dir`.
pub fn from_family_in(
    family: ModelFamily,
    dir: impl AsRef<Path>,
) -> Result<Tokenizer, TokenizerError> {
    let path = dir.as_ref().join(family.vocab_file_name());
    let tokenizer = Tokenizer::from_file(&path, family.pattern(), family.special_tokens())?;
    log::info!(
        "loaded {} vocabulary from {} ({} ids)",
        family,
        path.display(),
        tokenizer.vocab_size()
    );
    Ok(tokenizer)
}

type SharedSlot = OnceLock<Result<Arc<Tokenizer>, String>>;

static CL100K_BASE: SharedSlot = OnceLock::new();
static O200K_BASE: SharedSlot = OnceLock::new();

/// Process-wide tokenizer for `family`, built on first use.
///
/// Construction runs at most once per family. If it fails, the failure is
/// kept and every later call returns [`TokenizerError::InvalidTokenizer`].
pub fn shared(family: ModelFamily) -> Result<Arc<Tokenizer>, TokenizerError> {
    let slot = match family {
        ModelFamily::Cl100kBase => &CL100K_BASE,
        ModelFamily::O200kBase => &O200K_BASE,
    };

    shared_in(slot, family, || from_family(family))
}

/// Hand out the tokenizer cached in `slot`, running `build` on first use only.
fn shared_in(
    slot: &SharedSlot,
    family: ModelFamily,
    build: impl FnOnce() -> Result<Tokenizer, TokenizerError>,
) -> Result<Arc<Tokenizer>, TokenizerError> {
    let entry = slot.get_or_init(|| {
        build().map(Arc::new).map_err(|err| {
            log::warn!("failed to build shared {family} tokenizer: {err}");
            err.to_string()
        })
    });

    match entry {
        Ok(tokenizer) => Ok(Arc::clone(tokenizer)),
        Err(reason) => Err(TokenizerError::InvalidTokenizer(format!(
            "{family}: {reason}"
        ))),
    }
}
