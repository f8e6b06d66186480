use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Terminal marker of an OpenAI-compatible completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

impl ChunkPayload {
    pub fn content(&self) -> String {
        self.deltas().filter_map(|d| d.content.as_deref()).collect()
    }

    pub fn reasoning(&self) -> String {
        self.deltas()
            .filter_map(|d| d.reasoning_content.as_deref())
            .collect()
    }

    fn deltas(&self) -> impl Iterator<Item = &ChunkDelta> {
        self.choices.iter().filter_map(|c| c.delta.as_ref())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed stream chunk: {message}")]
pub struct DecodeError {
    pub message: String,
    pub line: String,
}

#[derive(Debug, Clone)]
pub enum ParsedLine {
    /// Blank lines, comments and SSE fields other than `data`.
    Ignored,
    Done,
    Chunk(ChunkPayload),
}

/// Parses one raw event line. `data:` framing is optional.
pub fn parse_line(line: &str) -> Result<ParsedLine, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return Ok(ParsedLine::Ignored);
    }

    let data = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(trimmed) => return Ok(ParsedLine::Ignored),
        None => trimmed,
    };

    if data == DONE_SENTINEL {
        return Ok(ParsedLine::Done);
    }
    if data.is_empty() {
        return Ok(ParsedLine::Ignored);
    }

    serde_json::from_str::<ChunkPayload>(data)
        .map(ParsedLine::Chunk)
        .map_err(|e| DecodeError {
            message: e.to_string(),
            line: line.to_string(),
        })
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_with_and_without_prefix() {
        assert!(matches!(parse_line("data: [DONE]"), Ok(ParsedLine::Done)));
        assert!(matches!(parse_line("data:[DONE]"), Ok(ParsedLine::Done)));
        assert!(matches!(parse_line("[DONE]"), Ok(ParsedLine::Done)));
    }

    #[test]
    fn framing_lines_are_ignored() {
        for line in ["", "   ", ": keep-alive", "event: message", "id: 7", "retry: 1000", "data:"] {
            assert!(
                matches!(parse_line(line), Ok(ParsedLine::Ignored)),
                "expected {line:?} to be ignored"
            );
        }
    }

    #[test]
    fn chunk_exposes_content_and_reasoning() {
        let parsed = parse_line(
            r#"data: {"choices":[{"delta":{"content":"Hi","reasoning_content":"think"},"finish_reason":null}]}"#,
        )
        .unwrap();
        let ParsedLine::Chunk(payload) = parsed else {
            panic!("expected a chunk");
        };
        assert_eq!(payload.content(), "Hi");
        assert_eq!(payload.reasoning(), "think");
    }

    #[test]
    fn bare_json_is_accepted() {
        let parsed = parse_line(r#"{"choices":[{"delta":{"content":"A"}}]}"#).unwrap();
        assert!(matches!(parsed, ParsedLine::Chunk(p) if p.content() == "A"));
    }

    #[test]
    fn malformed_json_reports_the_line() {
        let err = parse_line("data: {not json").unwrap_err();
        assert_eq!(err.line, "data: {not json");
    }
}
