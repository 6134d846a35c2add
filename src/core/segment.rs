//! Pre-tokenization: splitting text into chunks before BPE.
//!
//! Merges never cross a chunk boundary, so the chunk boundaries must match the
//! reference tokenizer's exactly. Each model family ships its own split
//! pattern, compiled with [`fancy_regex`].
//!
//! Both patterns end in `\s+(?!\S)|\s+`. That look-ahead forces the
//! backtracking engine, which gives up on long whitespace runs. The tail is
//! compiled as `\s+$|\s+` instead and a whitespace run that stops before
//! non-whitespace gives its last character back to the next chunk, which is
//! exactly what the look-ahead does.
//!
//! When special tokens are allowed, their literals are located first with an
//! Aho-Corasick automaton and the pattern only runs over the text between
//! them. Bytes the pattern leaves uncovered become single-byte chunks, so the
//! chunks of a text always tile it completely.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use fancy_regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;

use super::tokenizer::TokenizerError;
use super::vocab::Rank;

/// Split pattern for cl100k_base (GPT-4, GPT-3.5-turbo).
pub const CL100K_BASE_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Split pattern for o200k_base (GPT-4o).
pub const O200K_BASE_PATTERN: &str = r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n/]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Backtracking step budget per regex search.
pub const DEFAULT_BACKTRACK_LIMIT: usize = 1_000_000;

const LOOKAHEAD_TAIL: &str = r"|\s+(?!\S)|\s+";
const ANCHORED_TAIL: &str = r"|\s+$|\s+";

/// Compile `pattern`, rewriting a trailing `\s+(?!\S)|\s+` to its
/// look-around-free form. Returns whether the rewrite happened.
fn compile(pattern: &str, backtrack_limit: usize) -> Result<(Regex, bool), TokenizerError> {
    let (source, trim_whitespace) = match pattern.strip_suffix(LOOKAHEAD_TAIL) {
        Some(head) => (format!("{head}{ANCHORED_TAIL}"), true),
        None => (pattern.to_string(), false),
    };
    let regex = RegexBuilder::new(&source)
        .backtrack_limit(backtrack_limit)
        .build()?;
    Ok((regex, trim_whitespace))
}

/// A contiguous byte range of the input produced by segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Ordinary text to be merged with BPE.
    Piece(Range<usize>),
    /// A special-token literal, already resolved to its id.
    Special { rank: Rank, range: Range<usize> },
}

impl Chunk {
    /// Byte range covered by this chunk.
    pub fn range(&self) -> Range<usize> {
        match self {
            Chunk::Piece(range) | Chunk::Special { range, .. } => range.clone(),
        }
    }
}

/// Compiled split pattern plus special-token matcher.
#[derive(Clone)]
pub struct Segmenter {
    regex: Regex,
    /// Give back the last character of a whitespace run that stops before
    /// non-whitespace.
    trim_whitespace: bool,
    pattern: String,
    backtrack_limit: usize,
    special_matcher: Option<AhoCorasick>,
    /// Special token ids, indexed by Aho-Corasick pattern id.
    special_ranks: Vec<Rank>,
}

impl Segmenter {
    /// Compile `pattern` and build a matcher over the given special tokens.
    pub fn new(
        pattern: &str,
        special_tokens: &FxHashMap<String, Rank>,
        backtrack_limit: usize,
    ) -> Result<Self, TokenizerError> {
        let (regex, trim_whitespace) = compile(pattern, backtrack_limit)?;

        let mut specials: Vec<(&str, Rank)> = special_tokens
            .iter()
            .map(|(token, &rank)| (token.as_str(), rank))
            .collect();
        specials.sort_unstable_by_key(|&(_, rank)| rank);

        let special_matcher = if specials.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(specials.iter().map(|&(token, _)| token))?,
            )
        };

        Ok(Self {
            regex,
            trim_whitespace,
            pattern: pattern.to_string(),
            backtrack_limit,
            special_matcher,
            special_ranks: specials.into_iter().map(|(_, rank)| rank).collect(),
        })
    }

    /// Recompile the pattern with a different backtrack limit.
    pub fn with_backtrack_limit(mut self, backtrack_limit: usize) -> Result<Self, TokenizerError> {
        (self.regex, self.trim_whitespace) = compile(&self.pattern, backtrack_limit)?;
        self.backtrack_limit = backtrack_limit;
        Ok(self)
    }

    /// The split pattern source.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn backtrack_limit(&self) -> usize {
        self.backtrack_limit
    }

    /// Lazily split `text` into chunks.
    ///
    /// With `allow_special`, special-token literals are emitted as
    /// [`Chunk::Special`]; otherwise they are ordinary text.
    pub fn chunks<'a>(&'a self, text: &'a str, allow_special: bool) -> Chunks<'a> {
        let specials = match &self.special_matcher {
            Some(matcher) if allow_special => matcher
                .find_iter(text)
                .map(|m| (m.range(), self.special_ranks[m.pattern().as_usize()]))
                .collect(),
            _ => Vec::new(),
        };

        Chunks {
            regex: &self.regex,
            trim_whitespace: self.trim_whitespace,
            text,
            specials: specials.into_iter(),
            pending_special: None,
            segment: None,
            cursor: 0,
            finished: false,
        }
    }

    /// Split `text` into all of its chunks at once.
    pub fn split(&self, text: &str, allow_special: bool) -> Vec<Chunk> {
        self.chunks(text, allow_special).collect()
    }
}

/// Iterator over the chunks of one text. See [`Segmenter::chunks`].
pub struct Chunks<'a> {
    regex: &'a Regex,
    trim_whitespace: bool,
    text: &'a str,
    specials: std::vec::IntoIter<(Range<usize>, Rank)>,
    pending_special: Option<(Range<usize>, Rank)>,
    segment: Option<Segment<'a>>,
    cursor: usize,
    finished: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(segment) = &mut self.segment {
                if let Some(range) = segment.next() {
                    return Some(Chunk::Piece(range));
                }
                self.segment = None;
                if let Some((range, rank)) = self.pending_special.take() {
                    return Some(Chunk::Special { rank, range });
                }
            }

            if self.finished {
                return None;
            }

            let start = self.cursor;
            let end = match self.specials.next() {
                Some((range, rank)) => {
                    let end = range.start;
                    self.cursor = range.end;
                    self.pending_special = Some((range, rank));
                    end
                }
                None => {
                    self.finished = true;
                    self.text.len()
                }
            };
            self.segment = Some(Segment {
                regex: self.regex,
                trim_whitespace: self.trim_whitespace,
                text: &self.text[start..end],
                base: start,
                pos: 0,
                search_pos: 0,
                next_match: None,
                exhausted: false,
            });
        }
    }
}

/// Pattern matches over the text between two special tokens, with any
/// uncovered bytes filled in as single-byte chunks.
struct Segment<'a> {
    regex: &'a Regex,
    trim_whitespace: bool,
    text: &'a str,
    base: usize,
    /// End of the last emitted chunk.
    pos: usize,
    /// Where the next regex search starts.
    search_pos: usize,
    next_match: Option<Range<usize>>,
    exhausted: bool,
}

impl Segment<'_> {
    fn pull(&mut self) -> Option<Range<usize>> {
        while self.search_pos <= self.text.len() {
            match self.regex.find_from_pos(self.text, self.search_pos) {
                Ok(Some(m)) if m.start() == m.end() => {
                    self.search_pos = m.end()
                        + self.text[m.end()..]
                            .chars()
                            .next()
                            .map_or(1, char::len_utf8);
                }
                Ok(Some(m)) => {
                    let end = self.trimmed_end(m.start(), m.end());
                    self.search_pos = end;
                    return Some(m.start()..end);
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!(
                        "split pattern failed at byte {}: {err}; falling back to single bytes",
                        self.base + self.search_pos
                    );
                    break;
                }
            }
        }
        self.exhausted = true;
        None
    }

    /// End of a match after giving back the last character of a whitespace
    /// run that stops before non-whitespace.
    ///
    /// Only the `\s+` alternative produces such a run: `\s+$` ends at the end
    /// of the text and `\s*[\r\n]+` ends in a line break.
    fn trimmed_end(&self, start: usize, end: usize) -> usize {
        if !self.trim_whitespace || end == self.text.len() {
            return end;
        }
        let matched = &self.text[start..end];
        if !matched.chars().all(char::is_whitespace) {
            return end;
        }
        match matched.char_indices().last() {
            Some((last, c)) if last > 0 && c != '\r' && c != '\n' => start + last,
            _ => end,
        }
    }

    fn next(&mut self) -> Option<Range<usize>> {
        if self.next_match.is_none() && !self.exhausted {
            self.next_match = self.pull();
        }

        match &self.next_match {
            Some(m) if self.pos >= m.start => {
                let m = m.clone();
                self.next_match = None;
                self.pos = m.end;
                Some(self.base + m.start..self.base + m.end)
            }
            _ if self.pos < self.text.len() => {
                self.pos += 1;
                Some(self.base + self.pos - 1..self.base + self.pos)
            }
            _ => None,
        }
    }
}
