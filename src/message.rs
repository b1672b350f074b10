//! Chat log loading.
//!
//! A chat log is a JSON object whose `messages` field holds the ordered
//! conversation. Each message is kept as the raw JSON object it was read
//! from, so every field the recorder wrote survives into the output files
//! in its original order. Only `id` is interpreted.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AnalysisError;

/// One chat message, identified by its `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Message {
    id: String,
    fields: Map<String, Value>,
}

impl Message {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All fields of the message, `id` included.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for Message {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get("id") {
            Some(Value::String(id)) => Ok(Self {
                id: id.clone(),
                fields,
            }),
            Some(other) => Err(format!("message id must be a string, got {other}")),
            None => Err("message is missing an `id` field".to_string()),
        }
    }
}

impl From<Message> for Map<String, Value> {
    fn from(message: Message) -> Self {
        message.fields
    }
}

#[derive(Deserialize)]
struct ChatLog {
    messages: Vec<Message>,
}

/// Load the ordered message sequence from a chat log file.
///
/// Fails with [`AnalysisError::Input`] when the file is missing, is not a
/// JSON object with a `messages` array, or contains duplicate ids.
pub fn load(path: &Path) -> Result<Vec<Message>, AnalysisError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            AnalysisError::Input(format!("chat file not found at '{}'", path.display()))
        }
        _ => AnalysisError::Input(format!("failed to read '{}': {e}", path.display())),
    })?;
    parse(&contents).map_err(|reason| {
        AnalysisError::Input(format!("'{}' is not a usable chat log: {reason}", path.display()))
    })
}

fn parse(contents: &str) -> Result<Vec<Message>, String> {
    let log: ChatLog = serde_json::from_str(contents).map_err(|e| e.to_string())?;
    let mut seen = HashSet::new();
    for message in &log.messages {
        if !seen.insert(message.id()) {
            return Err(format!("duplicate message id '{}'", message.id()));
        }
    }
    Ok(log.messages)
}
