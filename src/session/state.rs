use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::classifier::SummaryEntry;
use crate::message::Message;

/// Text used for a session's marker when the classifier gave no summary.
pub const FALLBACK_SUMMARY: &str = "A debugging session occurred.";

/// Key of the `n`th debugging session (1-based).
pub fn session_key(n: u32) -> String {
    format!("debug_session_{n}")
}

/// Stands in the main branch where a debugging session was split off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryMarker {
    #[serde(rename = "type")]
    kind: MarkerKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MarkerKind {
    Summary,
}

impl SummaryMarker {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            kind: MarkerKind::Summary,
            content: content.into(),
        }
    }
}

/// An entry in the main branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchEntry {
    Summary(SummaryMarker),
    Message(Message),
}

impl BranchEntry {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Summary(_) => None,
        }
    }
}

/// Where the pipeline stands between chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    InSession(String),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::InSession(key) => write!(f, "in {key}"),
        }
    }
}

/// All mutable pipeline state. This is exactly what a checkpoint holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub main_branch: Vec<BranchEntry>,
    #[serde(default)]
    pub summary_log: Vec<SummaryEntry>,
    /// Session key to its messages, in the order sessions were opened.
    #[serde(default)]
    pub debugging_branches: IndexMap<String, Vec<Message>>,
    #[serde(default)]
    pub debugging_session_count: u32,
    #[serde(default)]
    pub is_currently_debugging: bool,
    /// -1 until the first chunk is folded in.
    #[serde(default = "no_chunk", alias = "last_processed_chunk")]
    pub last_processed_chunk_index: i64,
}

fn no_chunk() -> i64 {
    -1
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            main_branch: Vec::new(),
            summary_log: Vec::new(),
            debugging_branches: IndexMap::new(),
            debugging_session_count: 0,
            is_currently_debugging: false,
            last_processed_chunk_index: no_chunk(),
        }
    }
}

impl RunState {
    /// Index of the first chunk not yet folded into this state.
    pub fn next_chunk_index(&self) -> usize {
        usize::try_from(self.last_processed_chunk_index + 1).unwrap_or(0)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_currently_debugging {
            SessionPhase::InSession(session_key(self.debugging_session_count))
        } else {
            SessionPhase::Idle
        }
    }

    /// Messages in the main branch, skipping summary markers.
    pub fn main_messages(&self) -> impl Iterator<Item = &Message> {
        self.main_branch.iter().filter_map(BranchEntry::as_message)
    }

    pub fn summary_markers(&self) -> impl Iterator<Item = &SummaryMarker> {
        self.main_branch.iter().filter_map(|e| match e {
            BranchEntry::Summary(s) => Some(s),
            BranchEntry::Message(_) => None,
        })
    }

    /// Total messages placed so far, across all branches.
    pub fn placed_messages(&self) -> usize {
        self.main_messages().count() + self.debugging_branches.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::tests::msg;
    use serde_json::json;

    #[test]
    fn marker_serializes_as_summary_object() {
        let value = serde_json::to_value(BranchEntry::Summary(SummaryMarker::new("fixed it"))).unwrap();
        assert_eq!(value, json!({"type": "summary", "content": "fixed it"}));
    }

    #[test]
    fn branch_entries_deserialize_to_the_right_variant() {
        let entries: Vec<BranchEntry> = serde_json::from_value(json!([
            {"type": "summary", "content": "fixed it"},
            {"id": "1", "type": "user", "content": "hello"},
            {"id": "2", "type": "summary", "content": "a message that happens to look similar"}
        ]))
        .unwrap();
        assert_eq!(entries[0], BranchEntry::Summary(SummaryMarker::new("fixed it")));
        assert_eq!(entries[1].as_message().unwrap().id(), "1");
        assert_eq!(entries[2].as_message().unwrap().id(), "2");
    }

    #[test]
    fn legacy_checkpoint_key_is_accepted() {
        let state: RunState = serde_json::from_value(json!({
            "main_branch": [],
            "summary_log": [],
            "debugging_branches": {},
            "debugging_session_count": 0,
            "is_currently_debugging": false,
            "last_processed_chunk": 4
        }))
        .unwrap();
        assert_eq!(state.last_processed_chunk_index, 4);
        assert_eq!(state.next_chunk_index(), 5);
    }

    #[test]
    fn fresh_state_starts_at_chunk_zero() {
        let state = RunState::default();
        assert_eq!(state.last_processed_chunk_index, -1);
        assert_eq!(state.next_chunk_index(), 0);
        assert_eq!(state.phase(), SessionPhase::Idle);
    }

    #[test]
    fn phase_names_open_session() {
        let state = RunState {
            debugging_session_count: 3,
            is_currently_debugging: true,
            ..RunState::default()
        };
        assert_eq!(state.phase(), SessionPhase::InSession("debug_session_3".into()));
        assert_eq!(state.phase().to_string(), "in debug_session_3");
    }

    #[test]
    fn placed_messages_counts_all_branches() {
        let mut state = RunState::default();
        state.main_branch.push(BranchEntry::Summary(SummaryMarker::new("s")));
        state.main_branch.push(BranchEntry::Message(msg("1")));
        state
            .debugging_branches
            .insert(session_key(1), vec![msg("2"), msg("3")]);
        assert_eq!(state.placed_messages(), 3);
        assert_eq!(state.summary_markers().count(), 1);
    }
}
