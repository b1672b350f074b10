//! Turning a model reply into a [`Verdict`].
//!
//! Replies are loosely shaped. The JSON object may be wrapped in a fenced
//! code block or surrounded by prose, `debugging_message_ids` may list bare
//! ids or `{ "id": ... }` objects, and any field may be `null`. Everything is
//! normalized here so the session logic only ever sees canonical values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::ClassificationError;

/// The classifier's reading of one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Informational only; `debugging_message_ids` decides attribution.
    pub is_debugging: bool,
    pub debugging_summary: Option<String>,
    pub debugging_message_ids: BTreeSet<String>,
    pub chunk_summary: Vec<SummaryEntry>,
}

/// A one-line summary of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub id: String,
    pub summary: String,
}

const FENCE: &str = "```";

/// Parse a raw model reply into a [`Verdict`].
pub fn parse_verdict(raw: &str) -> Result<Verdict, ClassificationError> {
    // A bare object is taken as is, so fences quoted inside its strings
    // are never mistaken for wrapping.
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(_) => serde_json::from_str(extract_payload(raw)).map_err(|e| {
            ClassificationError::Malformed {
                reason: e.to_string(),
                raw: raw.to_string(),
            }
        })?,
    };
    let Value::Object(map) = value else {
        return Err(ClassificationError::Malformed {
            reason: "reply is not a JSON object".to_string(),
            raw: raw.to_string(),
        });
    };
    Ok(verdict_from_map(&map))
}

/// Strip fences and prose around the JSON object in a reply.
///
/// An opening fence only counts at the start of a line, and the block runs
/// to the last fence after it, so fences inside the payload's strings stay
/// part of the payload. Within the block (or the whole reply when there is
/// no usable block) the text from the first `{` to the last `}` is taken.
pub fn extract_payload(raw: &str) -> &str {
    fenced_body(raw)
        .and_then(outermost_object)
        .or_else(|| outermost_object(raw))
        .unwrap_or_else(|| raw.trim())
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = opening_fence(text)?;
    let after_open = &text[open + FENCE.len()..];
    let body = match after_open.rfind(FENCE) {
        Some(close) => &after_open[..close],
        None => after_open,
    };
    // Drop a language tag such as `json` right after the opening fence.
    Some(body.trim_start_matches(|c: char| c.is_ascii_alphanumeric()))
}

/// Byte offset of the first fence that begins a line (after indentation).
fn opening_fence(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if line[indent..].starts_with(FENCE) {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn verdict_from_map(map: &Map<String, Value>) -> Verdict {
    let is_debugging = map
        .get("is_debugging")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let debugging_summary = map
        .get("debugging_summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let debugging_message_ids = list_field(map, "debugging_message_ids")
        .iter()
        .filter_map(|item| {
            let id = normalize_id(item);
            if id.is_none() {
                warn!(entry = %item, "dropping unrecognized debugging_message_ids entry");
            }
            id
        })
        .collect();

    let chunk_summary = list_field(map, "chunk_summary")
        .iter()
        .filter_map(|item| {
            let entry = summary_entry(item);
            if entry.is_none() {
                warn!(entry = %item, "dropping unrecognized chunk_summary entry");
            }
            entry
        })
        .collect();

    Verdict {
        is_debugging,
        debugging_summary,
        debugging_message_ids,
        chunk_summary,
    }
}

fn list_field<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Accepts `"id"`, `42`, or `{"id": ...}`.
fn normalize_id(item: &Value) -> Option<String> {
    match item {
        Value::Object(obj) => obj.get("id").and_then(scalar_id),
        other => scalar_id(other),
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn summary_entry(item: &Value) -> Option<SummaryEntry> {
    let obj = item.as_object()?;
    Some(SummaryEntry {
        id: obj.get("id").and_then(scalar_id)?,
        summary: obj.get("summary")?.as_str()?.to_string(),
    })
}
