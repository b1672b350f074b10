pub mod machine;
pub mod state;

pub use machine::{ChunkOutcome, apply};
pub use state::{BranchEntry, RunState, SessionPhase, SummaryMarker, session_key};
