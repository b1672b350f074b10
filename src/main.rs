mod cli;

use anyhow::{Context, Result};
use chatbranch::classifier::claude::ClaudeResponder;
use chatbranch::classifier::gemini::GeminiResponder;
use chatbranch::classifier::{Backend, Classifier, PromptTemplate, Responder};
use chatbranch::commands;
use chatbranch::commands::analyze::AnalyzeConfig;
use chatbranch::config::{self, Config};
use chatbranch::display::renderer::Renderer;
use chatbranch::vcr::{Cassette, Recorder, ReplayResponder};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{BackendKind, Cli, Command, RunOpts};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let config = config::load(&cwd)?;

    match cli.command {
        Some(Command::Models) => {
            let model = cli.run.model.unwrap_or_else(|| config.model.clone());
            let responder = GeminiResponder::from_env(model)?;
            commands::models::models(&responder, &mut std::io::stdout()).await?;
        }
        None => {
            let chat_file = cli.chat_file.context("CHAT_FILE is required")?;
            let analyze_config = AnalyzeConfig {
                chat_file,
                chunk_size: cli.run.chunk_size.unwrap_or(config.chunk_size),
                start_chunk: cli.run.start_chunk,
                num_chunks: cli.run.num_chunks,
                output_dir: cli.run.output_dir.clone().unwrap_or_else(|| config.output_dir.clone()),
                checkpoint_path: cli.run.checkpoint.clone().unwrap_or_else(|| config.checkpoint.clone()),
            };
            let template = config.prompt()?;
            let backend = build_backend(&cli.run, &config)?;
            match &cli.run.record {
                Some(path) => run(Recorder::new(backend, path), template, &analyze_config).await?,
                None => run(backend, template, &analyze_config).await?,
            }
        }
    }

    Ok(())
}

/// Log to stderr so progress on stdout stays readable. `RUST_LOG` overrides
/// the default `warn` level.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn build_backend(opts: &RunOpts, config: &Config) -> Result<Backend> {
    let kind = opts.backend_kind();
    if opts.replay.is_some() && kind != BackendKind::Replay {
        anyhow::bail!("--replay only applies to the replay backend");
    }
    let backend = match kind {
        BackendKind::Gemini => {
            let model = opts.model.clone().unwrap_or_else(|| config.model.clone());
            Backend::Gemini(GeminiResponder::from_env(model)?)
        }
        // The configured model names a Gemini model; only an explicit
        // --model is forwarded to claude.
        BackendKind::Claude => Backend::Claude(ClaudeResponder {
            model: opts.model.clone(),
            extra_args: opts.claude_args.clone(),
        }),
        BackendKind::Replay => {
            let path = opts
                .replay
                .as_deref()
                .context("the replay backend needs a cassette (--replay FILE)")?;
            Backend::Replay(ReplayResponder::from_cassette(Cassette::load(path)?))
        }
    };
    Ok(backend)
}

async fn run<R: Responder>(responder: R, template: PromptTemplate, config: &AnalyzeConfig) -> Result<()> {
    let mut classifier = Classifier::new(responder, template);
    let mut renderer = Renderer::new();
    commands::analyze::analyze(config, &mut classifier, &mut renderer).await?;
    Ok(())
}
