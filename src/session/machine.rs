//! Folding one classified chunk into the run state.
//!
//! Attribution is decided per chunk because the classifier only ever sees
//! one window. A session carries across window boundaries only through
//! `is_currently_debugging` and the counter-derived session key. Once a chunk
//! comes back with no debugging ids, the session is closed for good; a later
//! excursion always gets a fresh key.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::state::{BranchEntry, FALLBACK_SUMMARY, RunState, SummaryMarker, session_key};
use crate::chunker::Chunk;
use crate::classifier::Verdict;

/// What applying a chunk did, for progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Key of the session this chunk opened, if any.
    pub opened: Option<String>,
    /// Key of the session that received messages from this chunk.
    pub session: Option<String>,
    /// Key of the session this chunk closed, if any.
    pub closed: Option<String>,
    pub to_main: usize,
    pub to_session: usize,
}

/// Attribute the messages of `chunk` according to `verdict`.
///
/// The verdict's `is_debugging` flag is not consulted: a non-empty set of
/// debugging ids that name messages in this chunk is what keeps or opens a
/// session. Ids that do not belong to the chunk are ignored.
pub fn apply(state: &mut RunState, chunk: &Chunk<'_>, verdict: Verdict) -> ChunkOutcome {
    let Verdict {
        is_debugging,
        debugging_summary,
        debugging_message_ids,
        chunk_summary,
    } = verdict;

    let ids: BTreeSet<String> = debugging_message_ids
        .into_iter()
        .filter(|id| {
            let known = chunk.contains(id);
            if !known {
                warn!(chunk = chunk.index, id = %id, "ignoring debugging id not in chunk");
            }
            known
        })
        .collect();

    debug!(
        chunk = chunk.index,
        messages = chunk.messages.len(),
        debugging_ids = ids.len(),
        is_debugging,
        "applying verdict"
    );

    let mut outcome = ChunkOutcome::default();

    if ids.is_empty() {
        if state.is_currently_debugging {
            outcome.closed = Some(session_key(state.debugging_session_count));
        }
        state.is_currently_debugging = false;
        state
            .main_branch
            .extend(chunk.messages.iter().cloned().map(BranchEntry::Message));
        outcome.to_main = chunk.messages.len();
    } else {
        if !state.is_currently_debugging {
            state.debugging_session_count += 1;
            state.is_currently_debugging = true;
            let summary = debugging_summary.unwrap_or_else(|| FALLBACK_SUMMARY.to_string());
            state
                .main_branch
                .push(BranchEntry::Summary(SummaryMarker::new(summary)));
            outcome.opened = Some(session_key(state.debugging_session_count));
        }

        let key = session_key(state.debugging_session_count);
        let branch = state.debugging_branches.entry(key.clone()).or_default();
        for message in chunk.messages {
            if ids.contains(message.id()) {
                branch.push(message.clone());
                outcome.to_session += 1;
            } else {
                state.main_branch.push(BranchEntry::Message(message.clone()));
                outcome.to_main += 1;
            }
        }
        outcome.session = Some(key);
    }

    state.summary_log.extend(chunk_summary);
    state.last_processed_chunk_index = i64::try_from(chunk.index).unwrap_or(i64::MAX);
    outcome
}
