//! Provider response adapters
//!
//! Each speech-to-text provider returns a different JSON shape. The
//! adapters detect which provider produced a payload and normalize it
//! into a [`TranscriptStream`], estimating missing end times and
//! rewriting square-bracket event markers to the parenthesized form
//! used everywhere downstream.

use crate::defaults;
use crate::error::{Result, SubweaveError};
use crate::transcript::{Token, TokenKind, TranscriptStream};
use serde::Deserialize;
use tracing::{debug, warn};

/// Supported speech-to-text providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    ElevenLabs,
    Soniox,
    WhisperVerbose,
}

impl Provider {
    /// Detect the provider from the shape of a raw JSON payload
    ///
    /// Detection looks only at top-level structure, never at field
    /// values, so it works on truncated or partial responses too.
    pub fn detect(value: &serde_json::Value) -> Option<Provider> {
        let obj = value.as_object()?;

        if let Some(words) = obj.get("words").and_then(|w| w.as_array()) {
            // ElevenLabs entries carry "text" and fractional-second "start"
            if words.is_empty()
                || words[0].get("text").is_some() && words[0].get("start_ms").is_none()
            {
                return Some(Provider::ElevenLabs);
            }
        }

        if let Some(tokens) = obj.get("tokens").and_then(|t| t.as_array()) {
            if tokens.is_empty() || tokens[0].get("start_ms").is_some() {
                return Some(Provider::Soniox);
            }
        }

        if let Some(segments) = obj.get("segments").and_then(|s| s.as_array()) {
            if segments.is_empty() || segments[0].get("words").is_some() {
                return Some(Provider::WhisperVerbose);
            }
        }

        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::ElevenLabs => "elevenlabs",
            Provider::Soniox => "soniox",
            Provider::WhisperVerbose => "whisper-verbose",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Provider::ElevenLabs),
            "soniox" => Ok(Provider::Soniox),
            "whisper" | "whisper-verbose" => Ok(Provider::WhisperVerbose),
            other => Err(format!(
                "unknown provider '{}', expected elevenlabs, soniox or whisper",
                other
            )),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A normalized transcript plus any warnings produced while adapting
#[derive(Debug, Clone, Default)]
pub struct NormalizedTranscript {
    pub stream: TranscriptStream,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ElevenLabsResponse {
    words: Vec<ElevenLabsWord>,
}

#[derive(Debug, Deserialize)]
struct ElevenLabsWord {
    text: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default, rename = "type")]
    word_type: Option<String>,
    #[serde(default)]
    speaker_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SonioxResponse {
    tokens: Vec<SonioxToken>,
}

#[derive(Debug, Deserialize)]
struct SonioxToken {
    text: String,
    #[serde(default)]
    start_ms: Option<u64>,
    #[serde(default)]
    end_ms: Option<u64>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    words: Vec<WhisperWord>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
}

/// Normalize a raw provider payload into a token stream
///
/// Detects the provider from the payload shape, or uses `provider`
/// when given. Returns [`SubweaveError::Schema`] when the payload
/// matches no known shape or fails to parse as that shape.
pub fn normalize(
    value: &serde_json::Value,
    provider: Option<Provider>,
) -> Result<NormalizedTranscript> {
    let provider = match provider.or_else(|| Provider::detect(value)) {
        Some(p) => p,
        None => {
            return Err(SubweaveError::Schema {
                message: "response matches no known provider shape".to_string(),
            });
        }
    };
    debug!(provider = provider.name(), "normalizing transcript payload");

    let mut warnings = Vec::new();
    let raw = match provider {
        Provider::ElevenLabs => parse_elevenlabs(value, &mut warnings)?,
        Provider::Soniox => parse_soniox(value, &mut warnings)?,
        Provider::WhisperVerbose => parse_whisper(value, &mut warnings)?,
    };

    let mut stream = finalize(raw, &mut warnings);
    stream.provider = Some(provider);
    stream.language = value
        .get("language_code")
        .or_else(|| value.get("language"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    if !warnings.is_empty() {
        warn!(count = warnings.len(), "transcript normalized with warnings");
    }
    Ok(NormalizedTranscript { stream, warnings })
}

/// A token before end-time estimation and ordering checks
struct RawToken {
    text: String,
    start: f64,
    end: Option<f64>,
    kind: TokenKind,
    speaker: Option<String>,
}

fn schema_err(provider: Provider, err: serde_json::Error) -> SubweaveError {
    SubweaveError::Schema {
        message: format!("{} payload did not parse: {}", provider.name(), err),
    }
}

fn parse_elevenlabs(
    value: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Result<Vec<RawToken>> {
    let response: ElevenLabsResponse = serde_json::from_value(value.clone())
        .map_err(|e| schema_err(Provider::ElevenLabs, e))?;

    let mut raw = Vec::with_capacity(response.words.len());
    for word in response.words {
        // Spacing entries carry no content worth keeping
        if word.word_type.as_deref() == Some("spacing") {
            continue;
        }
        let text = word.text.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let Some(start) = word.start else {
            warnings.push(format!("dropped token without start time: {:?}", text));
            continue;
        };
        let kind = if word.word_type.as_deref() == Some("audio_event") {
            TokenKind::Event
        } else {
            classify(&text)
        };
        raw.push(RawToken {
            text,
            start,
            end: word.end,
            kind,
            speaker: word.speaker_id,
        });
    }
    Ok(raw)
}

fn parse_soniox(value: &serde_json::Value, warnings: &mut Vec<String>) -> Result<Vec<RawToken>> {
    let response: SonioxResponse =
        serde_json::from_value(value.clone()).map_err(|e| schema_err(Provider::Soniox, e))?;

    let mut raw = Vec::with_capacity(response.tokens.len());
    for token in response.tokens {
        let text = token.text.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let Some(start_ms) = token.start_ms else {
            warnings.push(format!("dropped token without start time: {:?}", text));
            continue;
        };
        let end_ms = token.end_ms.or_else(|| token.duration_ms.map(|d| start_ms + d));
        let kind = classify(&text);
        raw.push(RawToken {
            text,
            start: start_ms as f64 / 1000.0,
            end: end_ms.map(|ms| ms as f64 / 1000.0),
            kind,
            speaker: token.speaker,
        });
    }
    Ok(raw)
}

fn parse_whisper(value: &serde_json::Value, warnings: &mut Vec<String>) -> Result<Vec<RawToken>> {
    let response: WhisperResponse =
        serde_json::from_value(value.clone()).map_err(|e| schema_err(Provider::WhisperVerbose, e))?;

    let mut raw = Vec::new();
    for segment in response.segments {
        for word in segment.words {
            let text = word.word.trim().to_string();
            if text.is_empty() {
                continue;
            }
            let Some(start) = word.start else {
                warnings.push(format!("dropped token without start time: {:?}", text));
                continue;
            };
            let kind = classify(&text);
            raw.push(RawToken {
                text,
                start,
                end: word.end,
                kind,
                speaker: None,
            });
        }
    }
    Ok(raw)
}

/// Classify trimmed token text as word, punctuation or event marker
fn classify(text: &str) -> TokenKind {
    if is_event_marker(text) {
        TokenKind::Event
    } else if !text.is_empty() && text.chars().all(is_punctuation_char) {
        TokenKind::Punctuation
    } else {
        TokenKind::Word
    }
}

fn is_punctuation_char(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '，' | '。' | '！' | '？' | '；' | '：' | '、' | '…' | '「' | '」' | '『' | '』'
        )
}

/// Bracket pairs recognized as event-marker delimiters
const BRACKET_PAIRS: [(char, char); 4] = [('[', ']'), ('(', ')'), ('（', '）'), ('【', '】')];

/// Whether the text is a standalone event marker like "[music]" or "(laughs)"
fn is_event_marker(text: &str) -> bool {
    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return false;
    };
    chars.next().is_some() && BRACKET_PAIRS.contains(&(first, last))
}

/// Rewrite bracketed markers to the "(event)" form used downstream
fn normalize_event_text(text: &str) -> String {
    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return text.to_string();
    };
    if first == '(' && last == ')' {
        return text.to_string();
    }
    if BRACKET_PAIRS.contains(&(first, last)) {
        format!("({})", chars.as_str())
    } else {
        text.to_string()
    }
}

/// Estimate missing end times, normalize event text and sort if needed
fn finalize(raw: Vec<RawToken>, warnings: &mut Vec<String>) -> TranscriptStream {
    let mut tokens = Vec::with_capacity(raw.len());
    let mut estimated = 0usize;

    for i in 0..raw.len() {
        let current = &raw[i];
        let end = match current.end {
            Some(end) if end >= current.start => end,
            _ => {
                estimated += 1;
                // Cap the estimate at the next token's start so it
                // never overlaps the following word.
                let guess = current.start + defaults::DEFAULT_TOKEN_SECS;
                match raw.get(i + 1) {
                    Some(next) if next.start > current.start => guess.min(next.start),
                    _ => guess,
                }
            }
        };
        let text = if current.kind == TokenKind::Event {
            normalize_event_text(&current.text)
        } else {
            current.text.clone()
        };
        tokens.push(Token {
            text,
            start: current.start,
            end,
            kind: current.kind,
            speaker: current.speaker.clone(),
        });
    }

    if estimated > 0 {
        warnings.push(format!("estimated end times for {} tokens", estimated));
    }

    let ordered = tokens
        .windows(2)
        .all(|pair| pair[0].start <= pair[1].start);
    if !ordered {
        warnings.push("token stream was out of order and has been sorted".to_string());
        tokens.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    TranscriptStream::new(tokens)
}
