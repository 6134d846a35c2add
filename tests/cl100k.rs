//! Integration tests for cl100k_base tokenizer (GPT-4, GPT-3.5-turbo).
//!
//! These tests verify that the cl100k_base tokenizer reproduces the reference
//! token ids, handles special tokens, and counts consistently with encoding.
//!
//! The vocabulary is read from `RANKBPE_VOCAB_DIR` (or `vocabs/`). The tests
//! are ignored by default; run them with `cargo test -- --ignored` once
//! `cl100k_base.tiktoken` is in place. A missing file fails the run.

use std::sync::{Arc, LazyLock};

use rankbpe::pretrained::{self, ModelFamily};
use rankbpe::{LimitedCount, Tokenizer, TokenizerError};

/// Shared tokenizer instance to avoid expensive re-initialization per test.
static TOKENIZER: LazyLock<Tokenizer> = LazyLock::new(create_cl100k_tokenizer_impl);

// =============================================================================
// Exact Token ID Tests
// =============================================================================

/// Verify exact token IDs for "Hello, world!".
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_hello_world_tokens() {
    let tokenizer = create_cl100k_tokenizer();
    let tokens = tokenizer.encode("Hello, world!");
    assert_eq!(
        tokens,
        vec![9906, 11, 1917, 0],
        "Token IDs for 'Hello, world!' changed"
    );
    assert_eq!(tokenizer.decode(&tokens).unwrap(), "Hello, world!");
}

/// Verify the token count for text mixing words and emoji.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_emoji_count() {
    let tokenizer = create_cl100k_tokenizer();
    let text = "Hello 👋 World 🌍";
    assert_eq!(tokenizer.count(text), 7);
    assert_eq!(tokenizer.encode(text).len(), 7);
}

// =============================================================================
// Counting
// =============================================================================

/// Test bounded counting around the exact count.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_count_till_limit() {
    let tokenizer = create_cl100k_tokenizer();
    let text = "Hello, world!";
    assert_eq!(
        tokenizer.count_till_limit(text, 3),
        LimitedCount::ExceedsLimit
    );
    assert_eq!(tokenizer.count_till_limit(text, 4), LimitedCount::Within(4));
    assert_eq!(tokenizer.count_till_limit("", 0), LimitedCount::Within(0));
}

/// Test that counting agrees with encoding on varied input.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_count_matches_encode() {
    let tokenizer = create_cl100k_tokenizer();
    let long_run = "a".repeat(2000);
    let long_emoji = "🌍".repeat(300);
    let texts = [
        "The quick brown fox jumps over the lazy dog.",
        "    indented\n\n\ttabs and  double  spaces   \n",
        "1234567890 3.14159 -42",
        "Ünïcödé text with accents, 日本語のテキスト, and 🦀🦀🦀",
        long_run.as_str(),
        long_emoji.as_str(),
    ];
    for text in texts {
        let tokens = tokenizer.encode(text);
        assert_eq!(tokenizer.count(text), tokens.len(), "count mismatch for {text:?}");
        assert_eq!(
            tokenizer.count_till_limit(text, tokens.len()),
            LimitedCount::Within(tokens.len())
        );
    }
}

// =============================================================================
// General Roundtrip Tests
// =============================================================================

/// Test basic encoding and decoding roundtrip.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_encode_decode_roundtrip() {
    let tokenizer = create_cl100k_tokenizer();

    let test_cases = vec![
        "Hello, world!",
        "The quick brown fox jumps over the lazy dog.",
        "Rust is a systems programming language.",
        "1234567890",
        "Special characters: !@#$%^&*()",
        "Multi-line\ntext\nwith\nnewlines",
        "Unicode: こんにちは 世界 🦀",
    ];

    for text in test_cases {
        let tokens = tokenizer.encode(text);
        let decoded = tokenizer.decode(&tokens).unwrap();
        assert_eq!(decoded, text, "Roundtrip failed for: {:?}", text);
    }
}

/// Test that vocab size is correct (100,256 BPE tokens for cl100k).
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_vocab_size() {
    let tokenizer = create_cl100k_tokenizer();
    // Largest special token is <|endofprompt|> at 100276
    assert_eq!(tokenizer.vocab_size(), 100277);
    assert_eq!(tokenizer.vocabulary().len(), 100256);
}

// =============================================================================
// Special Tokens
// =============================================================================

/// Test OpenAI standard special tokens.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_openai_special_tokens() {
    let tokenizer = create_cl100k_tokenizer();

    let tokens = tokenizer.encode_with_special("Hello<|endoftext|>World");
    assert!(
        tokens.contains(&100257),
        "Should contain endoftext (100257)"
    );

    let tokens = tokenizer.encode_with_special("<|endofprompt|>");
    assert_eq!(tokens, vec![100276]);
    assert_eq!(
        tokenizer
            .vocabulary()
            .match_special_token("Hello<|endoftext|>World", 5),
        Some((100257, 13))
    );

    // Plain encoding treats the literal as text
    let tokens = tokenizer.encode("Hello<|endoftext|>World");
    assert!(!tokens.contains(&100257));
    assert_eq!(
        tokenizer.decode(&tokens).unwrap(),
        "Hello<|endoftext|>World"
    );
}

/// Test FIM (Fill-in-the-Middle) format used for code completion.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_fim_format() {
    let tokenizer = create_cl100k_tokenizer();

    let fim = "<|fim_prefix|>def hello():\n    <|fim_suffix|>\n    return result<|fim_middle|>";

    let tokens = tokenizer.encode_with_special(fim);

    assert!(tokens.contains(&100258)); // fim_prefix
    assert!(tokens.contains(&100259)); // fim_middle
    assert!(tokens.contains(&100260)); // fim_suffix
    assert_eq!(tokenizer.count_with_special(fim), tokens.len());

    let decoded = tokenizer.decode(&tokens).unwrap();
    assert_eq!(decoded, fim);
}

/// Test that special tokens decode correctly.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_special_token_decode() {
    let tokenizer = create_cl100k_tokenizer();

    assert_eq!(tokenizer.decode(&[100257]).unwrap(), "<|endoftext|>");
    assert_eq!(tokenizer.decode(&[100258]).unwrap(), "<|fim_prefix|>");
    assert_eq!(tokenizer.decode(&[100276]).unwrap(), "<|endofprompt|>");
}

// =============================================================================
// Edge Cases
// =============================================================================

/// Test empty input handling.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_empty_input() {
    let tokenizer = create_cl100k_tokenizer();

    let tokens = tokenizer.encode("");
    assert!(tokens.is_empty(), "Empty input should produce empty tokens");
    assert_eq!(tokenizer.count(""), 0);

    let decoded = tokenizer.decode(&[]).unwrap();
    assert!(
        decoded.is_empty(),
        "Empty tokens should decode to empty string"
    );
}

/// Test that unknown ids are rejected.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_unknown_token() {
    let tokenizer = create_cl100k_tokenizer();

    let result = tokenizer.decode(&[999_999_999]);
    assert!(matches!(result, Err(TokenizerError::UnknownToken(999_999_999))));

    // Unassigned id between the ordinary range and <|endofprompt|>
    let result = tokenizer.decode(&[9906, 100261]);
    assert!(matches!(result, Err(TokenizerError::UnknownToken(100261))));
}

/// Test code-related content (GPT-4 is commonly used for code).
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_code_content() {
    let tokenizer = create_cl100k_tokenizer();

    let code = r#"
def hello_world():
    print("Hello, World!")

if __name__ == "__main__":
    hello_world()
"#;

    let tokens = tokenizer.encode(code);
    let decoded = tokenizer.decode(&tokens).unwrap();
    assert_eq!(decoded, code);
}

/// Test batch encoding.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_batch_encode() {
    let tokenizer = create_cl100k_tokenizer();

    let texts = vec![
        "Hello, world!".to_string(),
        "How are you?".to_string(),
        "I'm doing great!".to_string(),
    ];

    let batch_tokens = tokenizer.encode_batch(&texts);

    assert_eq!(batch_tokens.len(), 3);

    for (i, text) in texts.iter().enumerate() {
        let individual = tokenizer.encode(text);
        assert_eq!(
            batch_tokens[i], individual,
            "Batch encoding should match individual encoding for text {}: {:?}",
            i, text
        );
    }
    assert_eq!(tokenizer.decode_batch(&batch_tokens).unwrap(), texts);
}

/// Test that a shared instance gives identical results across threads.
#[test]
#[ignore = "requires cl100k_base.tiktoken in RANKBPE_VOCAB_DIR or vocabs/"]
fn test_cl100k_shared_across_threads() {
    let tokenizer = pretrained::shared(ModelFamily::Cl100kBase).unwrap();
    let again = pretrained::shared(ModelFamily::Cl100kBase).unwrap();
    assert!(Arc::ptr_eq(&tokenizer, &again));

    let text = "Concurrent callers see the same tokens. 🦀";
    let expected = tokenizer.encode(text);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokenizer = Arc::clone(&tokenizer);
            std::thread::spawn(move || tokenizer.encode(text))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

/// Get the shared tokenizer instance.
fn create_cl100k_tokenizer() -> &'static Tokenizer {
    &TOKENIZER
}

/// Implementation that actually constructs the tokenizer
fn create_cl100k_tokenizer_impl() -> Tokenizer {
    let dir = pretrained::default_vocab_dir();
    pretrained::from_family_in(ModelFamily::Cl100kBase, &dir).unwrap_or_else(|err| {
        panic!(
            "cl100k_base vocabulary not loadable from {}: {err}",
            dir.display()
        )
    })
}
