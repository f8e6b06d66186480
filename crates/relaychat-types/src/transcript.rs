use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    #[default]
    Idle,
    Streaming,
    Aborted,
    Completed,
}

impl TranscriptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptStatus::Aborted | TranscriptStatus::Completed)
    }
}

/// In-progress text of one assistant reply.
///
/// The buffer only grows while `Streaming`; once the transcript is aborted or
/// completed it is frozen and every further append is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    conversation_id: String,
    buffer: String,
    reasoning: String,
    status: TranscriptStatus,
}

impl Transcript {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            buffer: String::new(),
            reasoning: String::new(),
            status: TranscriptStatus::Idle,
        }
    }

    pub fn streaming(conversation_id: impl Into<String>) -> Self {
        let mut transcript = Self::new(conversation_id);
        transcript.status = TranscriptStatus::Streaming;
        transcript
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn status(&self) -> TranscriptStatus {
        self.status
    }

    pub fn is_streaming(&self) -> bool {
        self.status == TranscriptStatus::Streaming
    }

    /// Returns false when the transcript is not accepting text.
    pub fn append(&mut self, delta: &str) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.buffer.push_str(delta);
        true
    }

    pub fn append_reasoning(&mut self, delta: &str) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.reasoning.push_str(delta);
        true
    }

    pub fn complete(&mut self) {
        if self.is_streaming() {
            self.status = TranscriptStatus::Completed;
        }
    }

    pub fn abort(&mut self) {
        if !self.status.is_terminal() {
            self.status = TranscriptStatus::Aborted;
        }
    }

    pub fn into_buffer(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_only_while_streaming() {
        let mut idle = Transcript::new("cnv_1");
        assert!(!idle.append("x"));

        let mut transcript = Transcript::streaming("cnv_1");
        assert!(transcript.append("Hi "));
        assert!(transcript.append("there"));
        transcript.complete();
        assert!(!transcript.append("!"));
        assert_eq!(transcript.buffer(), "Hi there");
        assert_eq!(transcript.status(), TranscriptStatus::Completed);
    }

    #[test]
    fn abort_freezes_and_does_not_override_completion() {
        let mut transcript = Transcript::streaming("cnv_1");
        transcript.append("Hi th");
        transcript.abort();
        assert_eq!(transcript.status(), TranscriptStatus::Aborted);
        assert!(!transcript.append("ere"));

        let mut done = Transcript::streaming("cnv_1");
        done.complete();
        done.abort();
        assert_eq!(done.status(), TranscriptStatus::Completed);
    }
}
