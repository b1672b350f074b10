//! Final output files.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::checkpoint::write_atomic;
use crate::error::AnalysisError;
use crate::session::{BranchEntry, RunState};

pub const DEFAULT_OUTPUT_DIR: &str = "analysis_output";
pub const MAIN_BRANCH_FILE: &str = "main_branch.json";
pub const SUMMARY_LOG_FILE: &str = "summary_log.json";

/// Write the branches and summary log of `state` into `dir`.
///
/// Produces `main_branch.json`, `summary_log.json` and one
/// `<session key>.json` per debugging session, each as pretty JSON. Returns
/// the written paths in that order.
pub fn write_outputs(dir: &Path, state: &RunState) -> Result<Vec<PathBuf>, AnalysisError> {
    std::fs::create_dir_all(dir).map_err(|e| AnalysisError::persistence("create", dir, e))?;

    let mut written = Vec::with_capacity(2 + state.debugging_branches.len());
    written.push(write_json(&dir.join(MAIN_BRANCH_FILE), &state.main_branch)?);
    written.push(write_json(&dir.join(SUMMARY_LOG_FILE), &state.summary_log)?);
    for (key, messages) in &state.debugging_branches {
        written.push(write_json(&dir.join(format!("{key}.json")), messages)?);
    }
    Ok(written)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf, AnalysisError> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| AnalysisError::persistence("serialize", path, std::io::Error::other(e)))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).map_err(|e| AnalysisError::persistence("write", path, e))?;
    Ok(path.to_path_buf())
}

/// A compact text rendering of where every message ended up.
///
/// ```text
/// main_branch (3 entries)
///   [summary] fixed the parser
///   1
///   4
/// debug_session_1 (2 messages)
///   2
///   3
/// summary_log (0 entries)
/// ```
pub fn outline(state: &RunState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "main_branch ({} entries)", state.main_branch.len());
    for entry in &state.main_branch {
        match entry {
            BranchEntry::Summary(marker) => {
                let _ = writeln!(out, "  [summary] {}", marker.content);
            }
            BranchEntry::Message(message) => {
                let _ = writeln!(out, "  {}", message.id());
            }
        }
    }
    for (key, messages) in &state.debugging_branches {
        let _ = writeln!(out, "{key} ({} messages)", messages.len());
        for message in messages {
            let _ = writeln!(out, "  {}", message.id());
        }
    }
    let _ = writeln!(out, "summary_log ({} entries)", state.summary_log.len());
    for entry in &state.summary_log {
        let _ = writeln!(out, "  {}: {}", entry.id, entry.summary);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classifier::SummaryEntry;
    use crate::message::tests::msg;
    use crate::session::{SummaryMarker, session_key};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn state() -> RunState {
        let mut state = RunState::default();
        state.main_branch = vec![
            BranchEntry::Message(msg("1")),
            BranchEntry::Summary(SummaryMarker::new("fixed the parser")),
            BranchEntry::Message(msg("4")),
        ];
        state
            .debugging_branches
            .insert(session_key(1), vec![msg("2"), msg("3")]);
        state.debugging_session_count = 1;
        state.summary_log.push(SummaryEntry {
            id: "1".into(),
            summary: "asks about parsing".into(),
        });
        state
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_every_branch() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let written = write_outputs(&out, &state()).unwrap();

        assert_eq!(
            written,
            [
                out.join("main_branch.json"),
                out.join("summary_log.json"),
                out.join("debug_session_1.json"),
            ]
        );

        let main = read(&written[0]);
        assert_eq!(main[1], json!({"type": "summary", "content": "fixed the parser"}));
        assert_eq!(main[2]["id"], "4");
        assert_eq!(
            read(&written[1]),
            json!([{"id": "1", "summary": "asks about parsing"}])
        );
        let session = read(&written[2]);
        assert_eq!(session.as_array().unwrap().len(), 2);
        assert_eq!(session[0]["content"], "message 2");
    }

    #[test]
    fn empty_state_still_writes_main_and_summary() {
        let dir = TempDir::new().unwrap();
        let written = write_outputs(dir.path(), &RunState::default()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(read(&written[0]), json!([]));
    }

    #[test]
    fn outline_lists_branches_in_order() {
        assert_eq!(
            outline(&state()),
            "main_branch (3 entries)\n  1\n  [summary] fixed the parser\n  4\n\
             debug_session_1 (2 messages)\n  2\n  3\n\
             summary_log (1 entries)\n  1: asks about parsing\n"
        );
    }
}
