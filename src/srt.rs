//! SRT rendering and parsing
//!
//! Pure formatting: by the time this stage runs all times are final.
//! Entries are numbered from 1, timecodes carry millisecond
//! precision, and text is wrapped to the display width at whitespace,
//! never inside a parenthesized event marker. The parser is the exact
//! inverse of the renderer and exists mostly for round-trip checks
//! and the convert command.

use crate::error::{Result, SubweaveError};
use crate::timing::TimedSegment;
use crate::transcript::{TokenKind, TranscriptStream};

/// One rendered subtitle entry
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    /// 1-based, contiguous
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
}

impl SubtitleEntry {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Format seconds as `HH:MM:SS,mmm`
///
/// Rounds to the nearest millisecond, carrying into seconds and
/// beyond, so 1.9996s renders as 00:00:02,000 rather than a
/// fabricated 1,1000.
pub fn format_timecode(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Parse a `HH:MM:SS,mmm` timecode back to seconds
pub fn parse_timecode(text: &str) -> Option<f64> {
    let (hms, ms) = text.split_once(',')?;
    let mut parts = hms.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || m >= 60 || s >= 60 || ms.len() != 3 {
        return None;
    }
    let ms: u64 = ms.parse().ok()?;
    Some((h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0)
}

/// Wrap display text into lines of at most `max_chars` characters
///
/// Breaks at whitespace only. A parenthesized marker counts as one
/// unbreakable word even when it contains spaces; a single word (or
/// marker) longer than the limit gets its own overlong line rather
/// than being split.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let words = split_atoms(text);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in words {
        let word_chars = word.chars().count();
        if current_chars > 0 && current_chars + 1 + word_chars > max_chars {
            lines.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if current_chars > 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(&word);
        current_chars += word_chars;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Split text on whitespace, keeping parenthesized spans whole
fn split_atoms(text: &str) -> Vec<String> {
    let mut atoms = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    atoms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        atoms.push(current);
    }
    atoms
}

/// Build numbered entries from corrected segments
pub fn entries_from(
    stream: &TranscriptStream,
    segments: &[TimedSegment],
    max_chars: usize,
) -> Vec<SubtitleEntry> {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let tokens = &stream.tokens[segment.tokens.clone()];
            let mut text = String::new();
            for token in tokens {
                if !text.is_empty() && token.kind != TokenKind::Punctuation {
                    text.push(' ');
                }
                text.push_str(&token.text);
            }
            SubtitleEntry {
                index: i + 1,
                start: segment.start,
                end: segment.end,
                lines: wrap(&text, max_chars),
            }
        })
        .collect()
}

/// Serialize entries in SRT format
pub fn render(entries: &[SubtitleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            entry.index,
            format_timecode(entry.start),
            format_timecode(entry.end),
            entry.text(),
        ));
    }
    out
}

/// Parse an SRT document back into entries
pub fn parse(text: &str) -> Result<Vec<SubtitleEntry>> {
    let mut entries = Vec::new();

    for block in text.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut lines = block.lines();
        let entry_no = entries.len();

        let index: usize = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| SubweaveError::SrtParse {
                index: entry_no,
                message: "missing or invalid entry number".to_string(),
            })?;

        let times = lines.next().ok_or_else(|| SubweaveError::SrtParse {
            index: entry_no,
            message: "missing timecode line".to_string(),
        })?;
        let (start_text, end_text) =
            times.split_once(" --> ").ok_or_else(|| SubweaveError::SrtParse {
                index: entry_no,
                message: format!("invalid timecode line: {:?}", times),
            })?;
        let start = parse_timecode(start_text.trim()).ok_or_else(|| SubweaveError::SrtParse {
            index: entry_no,
            message: format!("invalid timecode: {:?}", start_text),
        })?;
        let end = parse_timecode(end_text.trim()).ok_or_else(|| SubweaveError::SrtParse {
            index: entry_no,
            message: format!("invalid timecode: {:?}", end_text),
        })?;

        let body: Vec<String> = lines.map(|l| l.to_string()).collect();
        if body.is_empty() {
            return Err(SubweaveError::SrtParse {
                index: entry_no,
                message: "entry has no text".to_string(),
            });
        }

        entries.push(SubtitleEntry {
            index,
            start,
            end,
            lines: body,
        });
    }

    Ok(entries)
}
