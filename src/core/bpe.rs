//! Rank-greedy byte-pair merging for a single chunk.
//!
//! Every byte starts as its own part. At each step the adjacent pair whose
//! concatenation has the lowest rank in the vocabulary is merged, the leftmost
//! pair winning ties, until no adjacent pair forms a known token.
//!
//! Two interchangeable strategies select the next merge:
//!
//! - **Linear scan** for short chunks: parts live in a vector and the minimum
//!   pair rank is found by scanning. Cheapest for the common case of a few
//!   bytes per chunk.
//! - **Binary heap** for long chunks: parts form an index-linked list and a
//!   min-heap keyed by `(rank, position)` yields the next merge. Entries made
//!   stale by a neighbouring merge are skipped when popped, which keeps long
//!   chunks (dense scripts, long digit-free runs) at O(n log n).
//!
//! Both strategies merge the same pairs in the same order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::vocab::{Rank, Vocabulary};

/// Chunks longer than this use the heap strategy.
const HEAP_THRESHOLD: usize = 128;

const NONE: usize = usize::MAX;

/// One part of the working sequence in the linear strategy.
#[derive(Debug, Clone, Copy)]
struct Part {
    start: usize,
    /// Token id of this part.
    token: Rank,
    /// Rank of merging this part with the next one, `Rank::MAX` if none.
    pair: Rank,
}

/// Linked-list node used by the heap strategy.
#[derive(Debug, Clone, Copy)]
struct Node {
    start: usize,
    token: Rank,
    pair: Rank,
    prev: usize,
    next: usize,
}

/// Encode one chunk into token ids.
pub fn byte_pair_encode(piece: &[u8], vocab: &Vocabulary) -> Vec<Rank> {
    match piece.len() {
        0 => Vec::new(),
        1 => vec![vocab.byte_rank(piece[0])],
        n if n <= HEAP_THRESHOLD => merge_linear(piece, vocab)
            .into_iter()
            .map(|part| part.token)
            .collect(),
        _ => merge_heap(piece, vocab),
    }
}

/// Number of tokens [`byte_pair_encode`] would produce for `piece`.
pub fn byte_pair_count(piece: &[u8], vocab: &Vocabulary) -> usize {
    match piece.len() {
        0 | 1 => piece.len(),
        n if n <= HEAP_THRESHOLD => merge_linear(piece, vocab).len(),
        _ => merge_heap(piece, vocab).len(),
    }
}

/// Rank of the bytes `piece[start..end]`, or `Rank::MAX` if not a token.
#[inline]
fn span_rank(vocab: &Vocabulary, piece: &[u8], start: usize, end: usize) -> Rank {
    vocab.lookup_rank(&piece[start..end]).unwrap_or(Rank::MAX)
}

fn merge_linear(piece: &[u8], vocab: &Vocabulary) -> Vec<Part> {
    // Trailing sentinel marks the end of the last part.
    let mut parts: Vec<Part> = Vec::with_capacity(piece.len() + 1);
    parts.extend(piece.iter().enumerate().map(|(start, &b)| Part {
        start,
        token: vocab.byte_rank(b),
        pair: Rank::MAX,
    }));
    parts.push(Part {
        start: piece.len(),
        token: Rank::MAX,
        pair: Rank::MAX,
    });

    let pair_rank = |parts: &[Part], i: usize| -> Rank {
        if i + 2 < parts.len() {
            span_rank(vocab, piece, parts[i].start, parts[i + 2].start)
        } else {
            Rank::MAX
        }
    };

    for i in 0..parts.len() - 2 {
        let rank = pair_rank(&parts, i);
        parts[i].pair = rank;
    }

    loop {
        let mut min = (Rank::MAX, 0);
        for (i, part) in parts[..parts.len() - 1].iter().enumerate() {
            if part.pair < min.0 {
                min = (part.pair, i);
            }
        }
        let (rank, i) = min;
        if rank == Rank::MAX {
            break;
        }

        parts[i].token = rank;
        parts.remove(i + 1);

        let rank = pair_rank(&parts, i);
        parts[i].pair = rank;
        if i > 0 {
            let rank = pair_rank(&parts, i - 1);
            parts[i - 1].pair = rank;
        }
    }

    parts.pop();
    parts
}

fn merge_heap(piece: &[u8], vocab: &Vocabulary) -> Vec<Rank> {
    let n = piece.len();
    let mut nodes: Vec<Node> = piece
        .iter()
        .enumerate()
        .map(|(i, &b)| Node {
            start: i,
            token: vocab.byte_rank(b),
            pair: Rank::MAX,
            prev: if i > 0 { i - 1 } else { NONE },
            next: if i + 1 < n { i + 1 } else { NONE },
        })
        .collect();

    let end_of = |nodes: &[Node], i: usize| -> usize {
        match nodes[i].next {
            NONE => n,
            next => nodes[next].start,
        }
    };
    let pair_rank = |nodes: &[Node], i: usize| -> Rank {
        match nodes[i].next {
            NONE => Rank::MAX,
            next => span_rank(vocab, piece, nodes[i].start, end_of(nodes, next)),
        }
    };

    // Node indices never move, so a smaller index is always further left and
    // the `(rank, index)` order yields the leftmost pair on equal ranks.
    let mut heap: BinaryHeap<Reverse<(Rank, usize)>> = BinaryHeap::with_capacity(n);
    for i in 0..n - 1 {
        let rank = pair_rank(&nodes, i);
        nodes[i].pair = rank;
        if rank != Rank::MAX {
            heap.push(Reverse((rank, i)));
        }
    }

    while let Some(Reverse((rank, i))) = heap.pop() {
        // Stale: the pair starting at `i` changed or `i` was merged away.
        if nodes[i].pair != rank {
            continue;
        }

        let j = nodes[i].next;
        nodes[i].token = rank;
        let after = nodes[j].next;
        nodes[i].next = after;
        if after != NONE {
            nodes[after].prev = i;
        }
        nodes[j].pair = Rank::MAX;
        nodes[j].next = NONE;

        let rank = pair_rank(&nodes, i);
        nodes[i].pair = rank;
        if rank != Rank::MAX {
            heap.push(Reverse((rank, i)));
        }

        let prev = nodes[i].prev;
        if prev != NONE {
            let rank = pair_rank(&nodes, prev);
            nodes[prev].pair = rank;
            if rank != Rank::MAX {
                heap.push(Reverse((rank, prev)));
            }
        }
    }

    let mut tokens = Vec::new();
    let mut cur = 0;
    while cur != NONE {
        tokens.push(nodes[cur].token);
        cur = nodes[cur].next;
    }
    tokens
}
