//! Chunk classification.
//!
//! A [`Responder`] is the raw text-generation transport: prompt in, reply
//! text out. [`Classifier`] wraps one with the prompt template and the reply
//! parser, so callers deal only in chunks and [`Verdict`]s.

use std::future::Future;

use thiserror::Error;

use crate::chunker::Chunk;
use crate::vcr::{Recorder, ReplayResponder};

pub mod claude;
pub mod gemini;
pub mod prompt;
pub mod verdict;

pub use prompt::PromptTemplate;
pub use verdict::{SummaryEntry, Verdict, parse_verdict};

use claude::ClaudeResponder;
use gemini::GeminiResponder;

/// Why a chunk could not be classified.
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// The prompt template could not be rendered for this chunk.
    #[error("failed to render prompt: {0}")]
    Prompt(String),

    /// The request itself failed (network, subprocess, API error status).
    #[error("request failed: {0}")]
    Transport(String),

    /// A reply arrived but no verdict could be read from it.
    #[error("reply is not a valid verdict: {reason}")]
    Malformed { reason: String, raw: String },
}

impl ClassificationError {
    /// The unparsed reply, when one was received.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw, .. } => Some(raw),
            Self::Prompt(_) | Self::Transport(_) => None,
        }
    }
}

/// A text-generation backend.
pub trait Responder {
    /// Send `prompt` and return the reply text.
    fn respond(
        &mut self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ClassificationError>> + Send;
}

/// Runtime choice of responder.
pub enum Backend {
    Gemini(GeminiResponder),
    Claude(ClaudeResponder),
    Replay(ReplayResponder),
}

impl Responder for Backend {
    async fn respond(&mut self, prompt: &str) -> Result<String, ClassificationError> {
        match self {
            Self::Gemini(r) => r.respond(prompt).await,
            Self::Claude(r) => r.respond(prompt).await,
            Self::Replay(r) => r.respond(prompt).await,
        }
    }
}

impl<R: Responder + Send> Responder for Recorder<R> {
    async fn respond(&mut self, prompt: &str) -> Result<String, ClassificationError> {
        let result = self.inner_mut().respond(prompt).await;
        self.record(&result).map_err(|e| {
            ClassificationError::Transport(format!("failed to record response: {e}"))
        })?;
        result
    }
}

/// Classifies chunks by prompting a [`Responder`] and parsing its reply.
pub struct Classifier<R> {
    responder: R,
    template: PromptTemplate,
}

impl<R: Responder> Classifier<R> {
    pub fn new(responder: R, template: PromptTemplate) -> Self {
        Self {
            responder,
            template,
        }
    }

    pub async fn classify(&mut self, chunk: &Chunk<'_>) -> Result<Verdict, ClassificationError> {
        let prompt = self.template.render(chunk)?;
        let raw = self.responder.respond(&prompt).await?;
        parse_verdict(&raw)
    }

    pub fn into_responder(self) -> R {
        self.responder
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chunker::chunks;
    use crate::message::tests::msgs;
    use crate::vcr::RecordedResponse;
    use std::num::NonZeroUsize;

    fn classifier(responses: Vec<RecordedResponse>) -> Classifier<ReplayResponder> {
        Classifier::new(
            ReplayResponder::new(responses),
            PromptTemplate::new(prompt::DEFAULT_TEMPLATE).unwrap(),
        )
    }

    #[tokio::test]
    async fn classify_parses_reply() {
        let messages = msgs(&["1", "2"]);
        let chunk = chunks(&messages, NonZeroUsize::MIN.saturating_add(1), 0, None)
            .next()
            .unwrap();
        let mut c = classifier(vec![RecordedResponse::text(
            "```json\n{\"debugging_message_ids\": [\"2\"]}\n```",
        )]);
        let verdict = c.classify(&chunk).await.unwrap();
        assert!(verdict.debugging_message_ids.contains("2"));
    }

    #[tokio::test]
    async fn transport_failure_passes_through() {
        let messages = msgs(&["1"]);
        let chunk = chunks(&messages, NonZeroUsize::MIN, 0, None).next().unwrap();
        let mut c = classifier(vec![RecordedResponse::error("connection reset")]);
        let err = c.classify(&chunk).await.unwrap_err();
        assert!(matches!(err, ClassificationError::Transport(ref m) if m == "connection reset"));
        assert_eq!(err.raw_response(), None);
    }

    #[tokio::test]
    async fn malformed_reply_keeps_raw_text() {
        let messages = msgs(&["1"]);
        let chunk = chunks(&messages, NonZeroUsize::MIN, 0, None).next().unwrap();
        let mut c = classifier(vec![RecordedResponse::text("no json here")]);
        let err = c.classify(&chunk).await.unwrap_err();
        assert_eq!(err.raw_response(), Some("no json here"));
    }
}
