//! Fuzzy alignment of model output back onto tokens
//!
//! The language model returns plain text lines, not token indices, and
//! it routinely drops a comma or normalizes a word while splitting.
//! Alignment therefore matches each returned line against candidate
//! token runs by similarity rather than exact text, and falls back to
//! a proportional split when nothing matches well enough.

use crate::transcript::Token;
use std::ops::Range;
use tracing::debug;

/// Similarity ratio between two strings in [0.0, 1.0]
///
/// Defined as 2*LCS / (|a| + |b|) over characters, so 1.0 means equal
/// and 0.0 means nothing in common. Whitespace is ignored on both
/// sides since token joins and model output space text differently.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Single-row LCS table
    let mut row = vec![0usize; b.len() + 1];
    for &ca in &a {
        let mut prev_diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag + 1
            } else {
                up.max(row[j])
            };
            prev_diag = up;
        }
    }
    let lcs = row[b.len()];
    2.0 * lcs as f64 / (a.len() + b.len()) as f64
}

fn joined_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.text);
    }
    out
}

fn char_len(tokens: &[Token]) -> usize {
    tokens.iter().map(|t| t.text.chars().count()).sum()
}

/// Align model output lines to token boundaries within `range`
///
/// Returns cut positions (token indices, exclusive of range edges)
/// partitioning `range` so each piece corresponds to one line. Lines
/// are consumed greedily in two passes: the end position with the best
/// similarity wins when it clears the threshold; otherwise a second
/// look compares with punctuation ignored against a relaxed 0.7x bar,
/// since the model freely drops or adds punctuation. A line matching
/// nothing either way is split off by proportional character count.
/// Leftover tokens after the last line always stay attached to the
/// final piece.
pub fn align_lines(
    tokens: &[Token],
    range: Range<usize>,
    lines: &[String],
    threshold: f64,
) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut cursor = range.start;
    let total_lines = lines.len();

    for (line_no, line) in lines.iter().enumerate() {
        if cursor >= range.end {
            break;
        }
        // The final line keeps everything left over
        if line_no + 1 == total_lines {
            break;
        }

        let line_chars = line.chars().filter(|c| !c.is_whitespace()).count();
        let (strict_end, strict_sim) =
            best_match(tokens, cursor, range.end, line, line_chars, similarity);

        let end = if strict_sim >= threshold && strict_end > cursor {
            strict_end
        } else {
            let (relaxed_end, relaxed_sim) =
                best_match(tokens, cursor, range.end, line, line_chars, relaxed_similarity);
            if relaxed_sim >= threshold * 0.7 && relaxed_end > cursor {
                relaxed_end
            } else {
                debug!(line_no, strict_sim, "line matched no token run, proportional split");
                proportional_end(tokens, cursor, range.end, line_chars)
            }
        };

        if end > cursor && end < range.end {
            cuts.push(end);
        }
        cursor = end.max(cursor + 1).min(range.end);
    }

    cuts
}

/// Best end position for `line` starting at `cursor`, by `sim_fn`
fn best_match(
    tokens: &[Token],
    cursor: usize,
    limit: usize,
    line: &str,
    line_chars: usize,
    sim_fn: fn(&str, &str) -> f64,
) -> (usize, f64) {
    let mut best_end = cursor;
    let mut best_sim = 0.0f64;
    let mut consumed_chars = 0usize;

    for end in (cursor + 1)..=limit {
        consumed_chars += tokens[end - 1].text.chars().count();
        let sim = sim_fn(line, &joined_text(&tokens[cursor..end]));
        if sim > best_sim {
            best_sim = sim;
            best_end = end;
        }
        // Well past the line length, nothing better is coming
        if consumed_chars > line_chars * 2 + 8 {
            break;
        }
    }
    (best_end, best_sim)
}

/// Similarity over letters and digits only
fn relaxed_similarity(a: &str, b: &str) -> f64 {
    let strip = |s: &str| -> String { s.chars().filter(|c| c.is_alphanumeric()).collect() };
    similarity(&strip(a), &strip(b))
}

/// Cut after roughly `line_chars` characters of tokens
fn proportional_end(tokens: &[Token], start: usize, limit: usize, line_chars: usize) -> usize {
    let mut consumed = 0usize;
    for end in start..limit {
        consumed += tokens[end].text.chars().count();
        if consumed >= line_chars.max(1) {
            return end + 1;
        }
    }
    limit
}

/// Split `range` at sentence-ending punctuation
///
/// The fallback when a window's model calls are exhausted. A cut is
/// placed after any token whose text ends a sentence; runs without
/// terminal punctuation longer than `max_chars` are cut at the last
/// clause punctuation or, failing that, at the character budget.
pub fn punctuation_cuts(tokens: &[Token], range: Range<usize>, max_chars: usize) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut run_start = range.start;
    let mut last_clause_end = None;

    for i in range.clone() {
        let text = &tokens[i].text;
        if ends_sentence(text) {
            if i + 1 < range.end {
                cuts.push(i + 1);
            }
            run_start = i + 1;
            last_clause_end = None;
            continue;
        }
        if ends_clause(text) {
            last_clause_end = Some(i + 1);
        }
        if char_len(&tokens[run_start..=i]) > max_chars {
            let cut = last_clause_end.unwrap_or(i + 1).min(range.end);
            if cut > run_start && cut < range.end {
                cuts.push(cut);
                run_start = cut;
                last_clause_end = None;
            }
        }
    }

    cuts
}

fn ends_sentence(text: &str) -> bool {
    matches!(
        text.chars().last(),
        Some('.' | '!' | '?' | '。' | '！' | '？' | '…')
    )
}

fn ends_clause(text: &str) -> bool {
    matches!(text.chars().last(), Some(',' | ';' | '，' | '；' | '、'))
}
