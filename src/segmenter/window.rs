//! Window partitioning for the split phase
//!
//! Model context is bounded, so the token stream's text is cut into
//! character-budgeted windows that overlap at the edges. Each window
//! also carries an OWNED token range; owned ranges tile the stream
//! exactly, and a window's proposed boundaries only count inside its
//! owned range, which settles conflicting proposals in the overlap.

use crate::transcript::{Token, TranscriptStream};
use std::ops::Range;

/// One unit of work for the split phase
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub index: usize,
    /// Tokens whose text is sent to the model (includes overlap)
    pub tokens: Range<usize>,
    /// Tokens this window is authoritative for
    pub owned: Range<usize>,
}

impl Window {
    /// The text sent to the model for this window
    pub fn text(&self, stream: &TranscriptStream) -> String {
        join_tokens(&stream.tokens[self.tokens.clone()])
    }
}

fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if !out.is_empty() && token.kind != crate::transcript::TokenKind::Punctuation {
            out.push(' ');
        }
        out.push_str(&token.text);
    }
    out
}

fn token_chars(token: &Token) -> usize {
    // The joining space counts toward the character budget
    token.text.chars().count() + 1
}

/// Partition a stream into overlapping windows
///
/// Streams fitting in one window budget yield exactly one window
/// owning everything. Otherwise owned ranges are sized so each
/// window's sent text stays within `window_chars` after the overlap
/// margins are added on both sides. Cut positions between owned
/// ranges prefer a spot right after sentence-ending punctuation near
/// the budget boundary.
pub fn build_windows(
    stream: &TranscriptStream,
    window_chars: usize,
    overlap_chars: usize,
) -> Vec<Window> {
    let n = stream.tokens.len();
    if n == 0 {
        return Vec::new();
    }

    let total_chars: usize = stream.tokens.iter().map(token_chars).sum();
    if total_chars <= window_chars {
        return vec![Window {
            index: 0,
            tokens: 0..n,
            owned: 0..n,
        }];
    }

    let overlap = overlap_chars.min(window_chars / 4);
    let owned_budget = window_chars.saturating_sub(2 * overlap).max(window_chars / 2);

    // Owned cut positions, preferring sentence ends near each budget
    let mut cut_points = vec![0usize];
    let mut run_chars = 0usize;
    let mut last_sentence_end = None;
    for (i, token) in stream.tokens.iter().enumerate() {
        run_chars += token_chars(token);
        if ends_sentence(&token.text) {
            last_sentence_end = Some(i + 1);
        }
        if run_chars >= owned_budget && i + 1 < n {
            let cut = last_sentence_end
                .filter(|&c| c > *cut_points.last().unwrap_or(&0))
                .unwrap_or(i + 1);
            cut_points.push(cut);
            run_chars = consumed_since(stream, cut, i + 1);
            last_sentence_end = None;
        }
    }
    cut_points.push(n);
    cut_points.dedup();

    // Extend each owned range by the overlap margin on both sides
    let mut windows = Vec::with_capacity(cut_points.len() - 1);
    for (index, pair) in cut_points.windows(2).enumerate() {
        let owned = pair[0]..pair[1];
        let start = extend_back(stream, owned.start, overlap);
        let end = extend_forward(stream, owned.end, overlap);
        windows.push(Window {
            index,
            tokens: start..end,
            owned,
        });
    }
    windows
}

fn consumed_since(stream: &TranscriptStream, from: usize, to: usize) -> usize {
    stream.tokens[from..to].iter().map(token_chars).sum()
}

fn extend_back(stream: &TranscriptStream, from: usize, overlap: usize) -> usize {
    let mut chars = 0usize;
    let mut i = from;
    while i > 0 && chars < overlap {
        i -= 1;
        chars += token_chars(&stream.tokens[i]);
    }
    i
}

fn extend_forward(stream: &TranscriptStream, from: usize, overlap: usize) -> usize {
    let mut chars = 0usize;
    let mut i = from;
    while i < stream.tokens.len() && chars < overlap {
        chars += token_chars(&stream.tokens[i]);
        i += 1;
    }
    i
}

fn ends_sentence(text: &str) -> bool {
    matches!(
        text.chars().last(),
        Some('.' | '!' | '?' | '。' | '！' | '？' | '…')
    )
}
