//! Token-level transcript model
//!
//! Every provider response is normalized into a flat stream of timed
//! tokens before any downstream stage runs. Words, punctuation and
//! non-speech event markers all become [`Token`]s so the segmenter and
//! timing corrector never need provider-specific logic.

pub mod adapters;
pub mod merge;

pub use adapters::{normalize, NormalizedTranscript, Provider};
pub use merge::{merge_streams, ChunkTranscript};

/// Classification of a transcript token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A spoken word (or CJK character run)
    Word,
    /// Punctuation attached to the preceding word
    Punctuation,
    /// A non-speech event marker such as "(laughs)"
    Event,
}

/// A single timed unit of transcript text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token text, with event markers already normalized to parentheses
    pub text: String,
    /// Start time in seconds from the beginning of the audio
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub kind: TokenKind,
    /// Speaker label when the provider supplies diarization
    pub speaker: Option<String>,
}

impl Token {
    pub fn word(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            kind: TokenKind::Word,
            speaker: None,
        }
    }

    pub fn punctuation(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            kind: TokenKind::Punctuation,
            speaker: None,
        }
    }

    pub fn event(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            kind: TokenKind::Event,
            speaker: None,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// An ordered sequence of tokens from a single audio source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptStream {
    pub tokens: Vec<Token>,
    /// Provider that produced the tokens, when known
    pub provider: Option<Provider>,
    /// Language hint carried along for downstream consumers
    pub language: Option<String>,
}

impl TranscriptStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            provider: None,
            language: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether token start times are non-decreasing and each token has
    /// a non-negative duration.
    pub fn is_ordered(&self) -> bool {
        let mut prev_start = f64::NEG_INFINITY;
        for token in &self.tokens {
            if token.start < prev_start || token.end < token.start {
                return false;
            }
            prev_start = token.start;
        }
        true
    }

    /// Concatenated text of all tokens, with single spaces between
    /// word tokens and punctuation joined flush to the preceding token.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            if !out.is_empty() && token.kind != TokenKind::Punctuation {
                out.push(' ');
            }
            out.push_str(&token.text);
        }
        out
    }

    /// Shift every token by `offset` seconds.
    pub fn shift(&mut self, offset: f64) {
        for token in &mut self.tokens {
            token.start += offset;
            token.end += offset;
        }
    }

    /// Start time of the first token, if any.
    pub fn start(&self) -> Option<f64> {
        self.tokens.first().map(|t| t.start)
    }

    /// End time of the last token, if any.
    pub fn end(&self) -> Option<f64> {
        self.tokens.last().map(|t| t.end)
    }
}
