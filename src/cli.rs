use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Which responder classifies chunks.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Generative Language API (needs GEMINI_API_KEY).
    Gemini,
    /// A `claude -p` subprocess.
    Claude,
    /// Responses recorded in a cassette (see --replay).
    Replay,
}

/// Options for an analysis run. Unset values come from chatbranch.toml.
#[derive(clap::Args, Debug)]
pub struct RunOpts {
    /// Messages per chunk sent to the classifier.
    #[arg(long)]
    pub chunk_size: Option<NonZeroUsize>,

    /// 1-based chunk to start at. Makes the run bounded: the checkpoint is
    /// neither read nor written.
    #[arg(long)]
    pub start_chunk: Option<NonZeroUsize>,

    /// Process at most this many chunks. Makes the run bounded.
    #[arg(long)]
    pub num_chunks: Option<usize>,

    /// Directory for the branch files.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Checkpoint file used by full runs.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Classifier backend. Defaults to replay when --replay is given, else gemini.
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Model name for the backend.
    #[arg(long)]
    pub model: Option<String>,

    /// Replay classifier responses from this cassette instead of calling a model.
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Record every classifier response into this cassette.
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Extra arguments to pass through to claude (after --).
    #[arg(last = true)]
    pub claude_args: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "chatbranch",
    about = "Split a recorded chat log into a main branch and debugging branches",
    version,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Chat log to analyze (a JSON object with a `messages` array).
    #[arg(value_name = "CHAT_FILE", required = true)]
    pub chat_file: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunOpts,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the Gemini models that support generateContent.
    Models,
}

impl RunOpts {
    pub fn backend_kind(&self) -> BackendKind {
        match (self.backend, &self.replay) {
            (Some(kind), _) => kind,
            (None, Some(_)) => BackendKind::Replay,
            (None, None) => BackendKind::Gemini,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "chatbranch",
            "chat.json",
            "--chunk-size",
            "5",
            "--start-chunk",
            "3",
            "--num-chunks",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.chat_file, Some(PathBuf::from("chat.json")));
        assert_eq!(cli.run.chunk_size.map(NonZeroUsize::get), Some(5));
        assert_eq!(cli.run.start_chunk.map(NonZeroUsize::get), Some(3));
        assert_eq!(cli.run.num_chunks, Some(2));
        assert_eq!(cli.run.backend_kind(), BackendKind::Gemini);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(Cli::try_parse_from(["chatbranch", "chat.json", "--chunk-size", "0"]).is_err());
    }

    #[test]
    fn chat_file_required_without_subcommand() {
        assert!(Cli::try_parse_from(["chatbranch"]).is_err());
        let cli = Cli::try_parse_from(["chatbranch", "models"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Models)));
    }

    #[test]
    fn replay_file_selects_replay_backend() {
        let cli = Cli::try_parse_from(["chatbranch", "chat.json", "--replay", "run.toml"]).unwrap();
        assert_eq!(cli.run.backend_kind(), BackendKind::Replay);

        let cli = Cli::try_parse_from(["chatbranch", "chat.json", "--backend", "claude"]).unwrap();
        assert_eq!(cli.run.backend_kind(), BackendKind::Claude);
    }
}
