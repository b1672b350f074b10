//! Recording and replaying classifier responses.
//!
//! A cassette is a TOML file holding one `[[responses]]` entry per
//! classified chunk, in order. Each entry is the reply `text`, the `error`
//! the transport raised, or a `malformed` reply the backend itself could not
//! unpack (with its `reason` and `raw` body). Recording a live run produces a cassette;
//! replaying one reruns the pipeline offline with identical replies.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::write_atomic;
use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::classifier::ClassificationError;
use crate::error::AnalysisError;
use crate::message::Message;

/// One recorded classifier outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedResponse {
    Text { text: String },
    Error { error: String },
    Malformed { malformed: MalformedReply },
}

/// A backend reply that carried no usable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedReply {
    pub reason: String,
    pub raw: String,
}

impl RecordedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Malformed {
            malformed: MalformedReply {
                reason: reason.into(),
                raw: raw.into(),
            },
        }
    }
}

/// An ordered list of recorded responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    #[serde(default)]
    pub responses: Vec<RecordedResponse>,
}

impl Cassette {
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("failed to read cassette {}: {e}", path.display()))
        })?;
        toml::from_str(&contents).map_err(|e| {
            AnalysisError::Config(format!("invalid cassette {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AnalysisError> {
        let contents = toml::to_string(self)
            .map_err(|e| AnalysisError::persistence("serialize", path, std::io::Error::other(e)))?;
        write_atomic(path, contents.as_bytes())
            .map_err(|e| AnalysisError::persistence("write", path, e))
    }
}

/// Plays back a cassette, one response per prompt.
#[derive(Debug, Clone, Default)]
pub struct ReplayResponder {
    responses: VecDeque<RecordedResponse>,
}

impl ReplayResponder {
    pub fn new(responses: impl IntoIterator<Item = RecordedResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
        }
    }

    pub fn from_cassette(cassette: Cassette) -> Self {
        Self::new(cassette.responses)
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }

    pub(crate) fn next_response(&mut self) -> Result<String, ClassificationError> {
        match self.responses.pop_front() {
            Some(RecordedResponse::Text { text }) => Ok(text),
            Some(RecordedResponse::Error { error }) => Err(ClassificationError::Transport(error)),
            Some(RecordedResponse::Malformed {
                malformed: MalformedReply { reason, raw },
            }) => Err(ClassificationError::Malformed { reason, raw }),
            None => Err(ClassificationError::Transport(
                "cassette has no more recorded responses".to_string(),
            )),
        }
    }
}

impl crate::classifier::Responder for ReplayResponder {
    async fn respond(&mut self, _prompt: &str) -> Result<String, ClassificationError> {
        self.next_response()
    }
}

/// Wraps a live responder and appends every outcome to a cassette file.
///
/// The cassette is rewritten after each response so an interrupted run
/// still leaves a usable recording.
pub struct Recorder<R> {
    inner: R,
    path: PathBuf,
    cassette: Cassette,
}

impl<R> Recorder<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            cassette: Cassette::default(),
        }
    }

    pub(crate) fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn cassette(&self) -> &Cassette {
        &self.cassette
    }

    pub(crate) fn record(
        &mut self,
        result: &Result<String, ClassificationError>,
    ) -> Result<(), AnalysisError> {
        let entry = match result {
            Ok(text) => RecordedResponse::text(text.clone()),
            // The backend rejected its own envelope (no candidates, bad CLI
            // output). Recording only the body would replay as a reply.
            Err(ClassificationError::Malformed { reason, raw }) => {
                RecordedResponse::malformed(reason.clone(), raw.clone())
            }
            Err(ClassificationError::Transport(message)) => RecordedResponse::error(message.clone()),
            Err(e @ ClassificationError::Prompt(_)) => RecordedResponse::error(e.to_string()),
        };
        self.cassette.responses.push(entry);
        self.cassette.save(&self.path)
    }
}

/// An end-to-end test case: a chat log, a window size, optional run
/// overrides, and the cassette the classifier replays.
#[derive(Debug, Deserialize)]
pub struct TestCase {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: NonZeroUsize,
    #[serde(default)]
    pub start_chunk: Option<NonZeroUsize>,
    #[serde(default)]
    pub num_chunks: Option<usize>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub responses: Vec<RecordedResponse>,
}

fn default_chunk_size() -> NonZeroUsize {
    DEFAULT_CHUNK_SIZE
}

impl TestCase {
    pub fn cassette(&self) -> Cassette {
        Cassette {
            responses: self.responses.clone(),
        }
    }

    /// The chat log file contents for this case.
    pub fn chat_log_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&serde_json::json!({ "messages": self.messages }))
    }
}
