use relaychat_types::Transcript;
use tracing::{debug, warn};

use crate::stream::{parse_line, ParsedLine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    Skipped,
    /// Text appended to the visible buffer. Empty for malformed chunks and
    /// for reasoning-only chunks when reasoning is not merged.
    Delta { visible: String },
    Finished,
}

/// Folds raw event lines into a [`Transcript`].
///
/// Malformed chunks are logged and treated as empty deltas. Once the
/// sentinel is seen every further line is ignored.
#[derive(Debug, Clone, Default)]
pub struct StreamDecoder {
    merge_reasoning: bool,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(merge_reasoning: bool) -> Self {
        Self {
            merge_reasoning,
            finished: false,
        }
    }

    pub fn feed_line(&mut self, line: &str, transcript: &mut Transcript) -> DecodeStep {
        if self.finished {
            debug!("ignoring line after stream termination");
            return DecodeStep::Skipped;
        }

        let payload = match parse_line(line) {
            Ok(ParsedLine::Ignored) => return DecodeStep::Skipped,
            Ok(ParsedLine::Done) => {
                self.finished = true;
                return DecodeStep::Finished;
            }
            Ok(ParsedLine::Chunk(payload)) => payload,
            Err(err) => {
                warn!(error = %err.message, "skipping malformed stream chunk");
                return DecodeStep::Delta {
                    visible: String::new(),
                };
            }
        };

        let reasoning = payload.reasoning();
        let mut visible = String::new();
        if self.merge_reasoning {
            visible.push_str(&reasoning);
        }
        visible.push_str(&payload.content());

        transcript.append_reasoning(&reasoning);
        transcript.append(&visible);

        DecodeStep::Delta { visible }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(lines: &[&str], merge_reasoning: bool) -> Transcript {
        let mut transcript = Transcript::streaming("cnv_test");
        let mut decoder = StreamDecoder::new(merge_reasoning);
        for line in lines {
            decoder.feed_line(line, &mut transcript);
        }
        transcript
    }

    #[test]
    fn invalid_line_between_chunks_is_swallowed() {
        let transcript = decode(
            &[
                r#"{"choices":[{"delta":{"content":"A"}}]}"#,
                "this is not json",
                r#"{"choices":[{"delta":{"content":"B"}}]}"#,
                "[DONE]",
            ],
            false,
        );
        assert_eq!(transcript.buffer(), "AB");
    }

    #[test]
    fn reasoning_is_kept_apart_by_default() {
        let transcript = decode(
            &[
                r#"data: {"choices":[{"delta":{"reasoning_content":"Let me think. "}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
                "data: [DONE]",
            ],
            false,
        );
        assert_eq!(transcript.buffer(), "Hi");
        assert_eq!(transcript.reasoning(), "Let me think. ");
    }

    #[test]
    fn merge_reasoning_puts_reasoning_ahead_of_content() {
        let transcript = decode(
            &[r#"data: {"choices":[{"delta":{"reasoning_content":"R","content":"C"}}]}"#],
            true,
        );
        assert_eq!(transcript.buffer(), "RC");
    }

    #[test]
    fn lines_after_sentinel_are_ignored() {
        let mut transcript = Transcript::streaming("cnv_test");
        let mut decoder = StreamDecoder::new(false);

        assert_eq!(
            decoder.feed_line("data: [DONE]", &mut transcript),
            DecodeStep::Finished
        );
        assert_eq!(
            decoder.feed_line(r#"data: {"choices":[{"delta":{"content":"late"}}]}"#, &mut transcript),
            DecodeStep::Skipped
        );
        assert_eq!(transcript.buffer(), "");
    }

    #[test]
    fn fold_appends_once_per_chunk() {
        let mut transcript = Transcript::streaming("cnv_test");
        let mut decoder = StreamDecoder::new(false);
        let step = decoder.feed_line(r#"data: {"choices":[{"delta":{"content":"Hi th"}}]}"#, &mut transcript);
        assert_eq!(
            step,
            DecodeStep::Delta {
                visible: "Hi th".to_string(),
            }
        );
        decoder.feed_line(r#"data: {"choices":[{"delta":{"content":"ere"}}]}"#, &mut transcript);
        assert_eq!(transcript.buffer(), "Hi there");
    }
}
