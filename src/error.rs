use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::classifier::ClassificationError;

/// Every way an analysis run can stop early.
///
/// All variants are fatal: the run loop never retries and never continues
/// past one of these.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The chat log is missing or does not have the expected shape.
    #[error("input error: {0}")]
    Input(String),

    /// Missing credentials, an invalid config file, or an unusable template.
    #[error("config error: {0}")]
    Config(String),

    /// The classifier failed or replied with something unparseable.
    #[error("chunk {} could not be classified: {source}", .chunk_index + 1)]
    Classification {
        chunk_index: usize,
        #[source]
        source: ClassificationError,
    },

    /// A checkpoint, lock or output file could not be read or written.
    #[error("failed to {action} {}: {source}", .path.display())]
    Persistence {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AnalysisError {
    pub(crate) fn persistence(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Persistence {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
