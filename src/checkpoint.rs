//! Resumable-run checkpoints.
//!
//! The whole [`RunState`] is rewritten after every chunk of a full run. The
//! write goes to a sibling temp file which is then renamed over the
//! checkpoint, so a crash mid-write leaves the previous checkpoint intact.
//! A sidecar `.lock` file held with an exclusive `fs2` lock keeps two full
//! runs from sharing one checkpoint.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;
use crate::session::RunState;

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_CHECKPOINT: &str = "analysis_checkpoint.json";

/// What a checkpoint file holds: the run state plus the window size it was
/// produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(flatten)]
    pub state: RunState,
    /// Absent in checkpoints written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<NonZeroUsize>,
}

/// Reads and writes the checkpoint at one path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

/// Held for the duration of a full run. Dropping it releases the lock; the
/// lock file itself stays so every run locks the same inode.
#[derive(Debug)]
pub struct CheckpointLock {
    file: File,
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, ".lock")
    }

    /// Take the exclusive run lock without waiting.
    pub fn lock(&self) -> Result<CheckpointLock, AnalysisError> {
        let path = self.lock_path();
        if let Some(parent) = non_empty_parent(&path) {
            fs::create_dir_all(parent)
                .map_err(|e| AnalysisError::persistence("create", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| AnalysisError::persistence("open", &path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(CheckpointLock { file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(AnalysisError::persistence(
                    "lock",
                    &path,
                    io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "another full run is using this checkpoint",
                    ),
                ))
            }
            Err(e) => Err(AnalysisError::persistence("lock", &path, e)),
        }
    }

    /// Restore the last saved checkpoint, or `None` if there is none.
    pub fn load(&self) -> Result<Option<Checkpoint>, AnalysisError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AnalysisError::persistence("read", &self.path, e)),
        };
        let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
            AnalysisError::persistence("parse", &self.path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        Ok(Some(checkpoint))
    }

    /// Atomically replace the checkpoint with `state`.
    pub fn save(&self, state: &RunState, chunk_size: NonZeroUsize) -> Result<(), AnalysisError> {
        let checkpoint = Checkpoint {
            state: state.clone(),
            chunk_size: Some(chunk_size),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| AnalysisError::persistence("serialize", &self.path, io::Error::other(e)))?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| AnalysisError::persistence("write", &self.path, e))?;
        debug!(
            path = %self.path.display(),
            last_chunk = state.last_processed_chunk_index,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint. A missing file is not an error.
    pub fn clear(&self) -> Result<(), AnalysisError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AnalysisError::persistence("remove", &self.path, e)),
        }
    }
}

/// Write `bytes` to `path` through a temp file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = non_empty_parent(path) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(path, ".tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
