use std::io::Write;

use anyhow::{Context, Result};

use crate::classifier::gemini::{GeminiResponder, ModelInfo};

const GENERATE_CONTENT: &str = "generateContent";

/// List the Gemini models that can classify chunks.
pub async fn models(responder: &GeminiResponder, writer: &mut impl Write) -> Result<()> {
    let models = responder
        .list_models()
        .await
        .context("failed to list Gemini models")?;
    write_models(&models, writer)
}

fn write_models(models: &[ModelInfo], writer: &mut impl Write) -> Result<()> {
    let usable: Vec<_> = models.iter().filter(|m| m.supports(GENERATE_CONTENT)).collect();
    if usable.is_empty() {
        writeln!(writer, "No models support {GENERATE_CONTENT}.")?;
        return Ok(());
    }

    writeln!(writer, "{} model(s) support {GENERATE_CONTENT}:\n", usable.len())?;
    for model in usable {
        let name = model.name.strip_prefix("models/").unwrap_or(&model.name);
        match &model.display_name {
            Some(display) => writeln!(writer, "  {name}  ({display})")?,
            None => writeln!(writer, "  {name}")?,
        }
    }
    Ok(())
}
