use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{ClassificationError, Responder};

/// Runs `claude -p` once per prompt, passing the prompt on stdin.
#[derive(Debug, Clone, Default)]
pub struct ClaudeResponder {
    /// Model alias or name passed as `--model`.
    pub model: Option<String>,
    /// Extra arguments appended to the claude command line.
    pub extra_args: Vec<String>,
}

/// Final result object printed by `claude -p --output-format json`.
#[derive(Debug, Deserialize)]
struct ClaudeResult {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: String,
}

impl ClaudeResponder {
    /// Build the claude CLI arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Responder for ClaudeResponder {
    async fn respond(&mut self, prompt: &str) -> Result<String, ClassificationError> {
        let args = self.build_args();
        debug!(?args, prompt_len = prompt.len(), "spawning claude");

        let mut child = tokio::process::Command::new("claude")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassificationError::Transport(format!("failed to spawn claude: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClassificationError::Transport("claude stdin not piped".to_string()))?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| ClassificationError::Transport(format!("failed to write prompt: {e}")))?;
        // Closing stdin tells claude the prompt is complete.
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClassificationError::Transport(format!("claude did not finish: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassificationError::Transport(format!(
                "claude exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_result(&stdout)
    }
}

fn parse_result(stdout: &str) -> Result<String, ClassificationError> {
    let result: ClaudeResult =
        serde_json::from_str(stdout.trim()).map_err(|e| ClassificationError::Malformed {
            reason: format!("unexpected claude output: {e}"),
            raw: stdout.to_string(),
        })?;
    if result.is_error {
        return Err(ClassificationError::Transport(result.result));
    }
    Ok(result.result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_args() {
        let args = ClaudeResponder::default().build_args();
        assert_eq!(args, ["-p", "--output-format", "json"]);
    }

    #[test]
    fn model_and_extra_args() {
        let responder = ClaudeResponder {
            model: Some("haiku".into()),
            extra_args: vec!["--max-turns".into(), "1".into()],
        };
        assert_eq!(
            responder.build_args(),
            [
                "-p",
                "--output-format",
                "json",
                "--model",
                "haiku",
                "--max-turns",
                "1"
            ]
        );
    }

    #[test]
    fn parse_success_result() {
        let stdout = r#"{"type":"result","subtype":"success","is_error":false,"result":"{\"is_debugging\":false}","session_id":"abc","num_turns":1}"#;
        assert_eq!(parse_result(stdout).unwrap(), r#"{"is_debugging":false}"#);
    }

    #[test]
    fn parse_error_result() {
        let stdout = r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"rate limited"}"#;
        let err = parse_result(stdout).unwrap_err();
        assert!(matches!(err, ClassificationError::Transport(ref m) if m == "rate limited"));
    }

    #[test]
    fn parse_garbage_output() {
        let err = parse_result("not json").unwrap_err();
        assert_eq!(err.raw_response(), Some("not json"));
    }
}
