use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::DEFAULT_CHECKPOINT;
use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::classifier::PromptTemplate;
use crate::classifier::gemini::DEFAULT_MODEL;
use crate::classifier::prompt::DEFAULT_TEMPLATE;
use crate::error::AnalysisError;
use crate::output::DEFAULT_OUTPUT_DIR;

pub const CONFIG_PATH: &str = "chatbranch.toml";

/// Settings from `chatbranch.toml`. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model used by the selected backend.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: NonZeroUsize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,
    /// Handlebars file replacing the built-in classification prompt,
    /// relative to the config file.
    #[serde(default)]
    pub prompt_template: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_chunk_size() -> NonZeroUsize {
    DEFAULT_CHUNK_SIZE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_checkpoint() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            chunk_size: default_chunk_size(),
            output_dir: default_output_dir(),
            checkpoint: default_checkpoint(),
            prompt_template: None,
        }
    }
}

/// Load configuration from `chatbranch.toml` under `dir`.
///
/// Falls back to defaults if the file is missing.
pub fn load(dir: &Path) -> Result<Config, AnalysisError> {
    let path = dir.join(CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| AnalysisError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut config: Config = toml::from_str(&contents)
        .map_err(|e| AnalysisError::Config(format!("invalid {}: {e}", path.display())))?;
    if let Some(template) = config.prompt_template.take() {
        config.prompt_template = Some(dir.join(template));
    }
    Ok(config)
}

impl Config {
    /// Compile the configured prompt template, or the built-in one.
    pub fn prompt(&self) -> Result<PromptTemplate, AnalysisError> {
        match &self.prompt_template {
            None => PromptTemplate::new(DEFAULT_TEMPLATE)
                .map_err(|e| AnalysisError::Config(format!("built-in prompt: {e}"))),
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    AnalysisError::Config(format!(
                        "failed to read prompt template {}: {e}",
                        path.display()
                    ))
                })?;
                PromptTemplate::new(&source).map_err(|e| {
                    AnalysisError::Config(format!("invalid prompt template {}: {e}", path.display()))
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.chunk_size.get(), 10);
        assert_eq!(config.output_dir, PathBuf::from("analysis_output"));
        assert_eq!(config.checkpoint, PathBuf::from("analysis_checkpoint.json"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_PATH),
            "chunk_size = 25\nprompt_template = \"prompt.hbs\"\n",
        )
        .unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.chunk_size.get(), 25);
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.prompt_template, Some(dir.path().join("prompt.hbs")));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_PATH), "chunk_size = 0\n").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)), "{err}");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_PATH), "chunk = 5\n").unwrap();
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn prompt_falls_back_to_built_in() {
        Config::default().prompt().unwrap();
    }

    #[test]
    fn prompt_template_file_is_compiled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.hbs");
        std::fs::write(&path, "Classify: {{chunk}}").unwrap();
        let config = Config {
            prompt_template: Some(path),
            ..Config::default()
        };
        config.prompt().unwrap();

        let broken = Config {
            prompt_template: Some(dir.path().join("missing.hbs")),
            ..Config::default()
        };
        assert!(matches!(broken.prompt(), Err(AnalysisError::Config(_))));
    }
}
