use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::checkpoint::CheckpointStore;
use crate::chunker::{chunks, total_chunks};
use crate::classifier::{Classifier, Responder};
use crate::display::renderer::Renderer;
use crate::error::AnalysisError;
use crate::message;
use crate::output::write_outputs;
use crate::session::{self, RunState};

/// Everything an analysis run needs besides the classifier.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub chat_file: PathBuf,
    pub chunk_size: NonZeroUsize,
    /// 1-based chunk to begin at. Setting this makes the run bounded.
    pub start_chunk: Option<NonZeroUsize>,
    /// Most chunks to process. Setting this makes the run bounded.
    pub num_chunks: Option<usize>,
    pub output_dir: PathBuf,
    pub checkpoint_path: PathBuf,
}

/// How a run relates to the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resume from the checkpoint, save after every chunk, clear at the end.
    Full,
    /// Process a slice of chunks from a fresh state. The checkpoint is never
    /// read, written or removed.
    Bounded { start: usize, limit: Option<usize> },
}

impl AnalyzeConfig {
    pub fn mode(&self) -> RunMode {
        if self.start_chunk.is_none() && self.num_chunks.is_none() {
            RunMode::Full
        } else {
            RunMode::Bounded {
                start: self.start_chunk.map_or(0, |n| n.get() - 1),
                limit: self.num_chunks,
            }
        }
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct AnalysisSummary {
    /// Chunks classified by this invocation, not counting resumed ones.
    pub chunks_processed: usize,
    pub sessions: u32,
    pub output_files: Vec<PathBuf>,
    pub state: RunState,
}

/// Classify the chat log chunk by chunk and write the resulting branches.
///
/// A classification failure stops the run immediately. In a full run the
/// checkpoint then still holds the last successful chunk, so the next
/// invocation picks up at the failed one.
pub async fn analyze<R: Responder, W: Write>(
    config: &AnalyzeConfig,
    classifier: &mut Classifier<R>,
    renderer: &mut Renderer<W>,
) -> Result<AnalysisSummary, AnalysisError> {
    let messages = message::load(&config.chat_file)?;
    let total = total_chunks(messages.len(), config.chunk_size);
    let mode = config.mode();
    renderer.render_start(&config.chat_file, messages.len(), total, config.chunk_size.get());
    info!(
        chat_file = %config.chat_file.display(),
        messages = messages.len(),
        chunks = total,
        ?mode,
        "starting analysis"
    );

    let store = CheckpointStore::new(&config.checkpoint_path);
    let (_lock, mut state, start, limit) = match mode {
        RunMode::Full => {
            let lock = store.lock()?;
            let state = match store.load()? {
                Some(checkpoint) => {
                    if let Some(saved) = checkpoint.chunk_size
                        && saved != config.chunk_size
                    {
                        return Err(AnalysisError::Config(format!(
                            "{} was written with chunk size {saved}, not {}; \
                             rerun with --chunk-size {saved} or remove the checkpoint",
                            store.path().display(),
                            config.chunk_size
                        )));
                    }
                    let state = checkpoint.state;
                    info!(
                        next_chunk = state.next_chunk_index(),
                        phase = %state.phase(),
                        "Resuming from checkpoint"
                    );
                    renderer.render_resume(state.next_chunk_index() + 1, total, &state.phase());
                    state
                }
                None => RunState::default(),
            };
            let start = state.next_chunk_index();
            (Some(lock), state, start, None)
        }
        RunMode::Bounded { start, limit } => {
            renderer.render_bounded(start + 1, limit);
            if start >= total {
                renderer.render_warning(&format!(
                    "start chunk {} is past the last chunk ({total}); nothing to do",
                    start + 1
                ));
            }
            (None, RunState::default(), start, limit)
        }
    };

    let mut chunks_processed = 0;
    for chunk in chunks(&messages, config.chunk_size, start, limit) {
        renderer.render_chunk_sent(chunk.index + 1, total, chunk.messages.len());
        debug!(chunk = chunk.index, messages = chunk.messages.len(), "classifying chunk");

        let verdict = match classifier.classify(&chunk).await {
            Ok(verdict) => verdict,
            Err(source) => {
                error!(
                    chunk = chunk.index,
                    error = %source,
                    raw_response = source.raw_response().unwrap_or_default(),
                    "classification failed"
                );
                renderer.render_classification_error(chunk.index + 1, &source);
                return Err(AnalysisError::Classification {
                    chunk_index: chunk.index,
                    source,
                });
            }
        };

        let outcome = session::apply(&mut state, &chunk, verdict);
        let opened_summary = outcome
            .opened
            .as_ref()
            .and_then(|_| state.summary_markers().last())
            .map(|marker| marker.content.as_str());
        renderer.render_chunk_done(&outcome, opened_summary);

        if mode == RunMode::Full {
            store.save(&state, config.chunk_size)?;
        }
        chunks_processed += 1;
    }

    let output_files = write_outputs(&config.output_dir, &state)?;
    if mode == RunMode::Full {
        store.clear()?;
    }

    info!(
        chunks_processed,
        sessions = state.debugging_session_count,
        output_dir = %config.output_dir.display(),
        "analysis complete"
    );
    renderer.render_complete(chunks_processed, state.debugging_session_count, &output_files);

    Ok(AnalysisSummary {
        chunks_processed,
        sessions: state.debugging_session_count,
        output_files,
        state,
    })
}
