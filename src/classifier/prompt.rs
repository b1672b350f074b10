use handlebars::Handlebars;
use serde_json::json;

use super::ClassificationError;
use crate::chunker::Chunk;

const TEMPLATE_NAME: &str = "classify";

/// Built-in classification prompt.
///
/// Variables: `chunk` (the window's messages as pretty JSON), `chunk_number`
/// (1-based), `message_count`.
pub const DEFAULT_TEMPLATE: &str = r#"You are reviewing one window of a recorded conversation between a developer and a coding assistant.

Look for debugging excursions. An excursion starts when a defect shows up (a compiler error, a crash, a failing test, output that is not what was expected) and ends once that defect is fixed.

For this window:
1. Decide whether a debugging excursion is under way.
2. If one is, summarize the defect and its fix in a sentence or two, and list the ids of the messages in this window that belong to it.
3. Give a one-line summary of every message in the window.

Window {{chunk_number}} ({{message_count}} messages):
{{chunk}}

Reply with a single JSON object and nothing else. Do not wrap it in markdown. Use exactly this shape:
{
  "is_debugging": true or false,
  "debugging_summary": "what broke and how it was fixed, or null",
  "debugging_message_ids": ["<id>", ...],
  "chunk_summary": [{"id": "<id>", "summary": "<one line>"}, ...]
}
"#;

/// A compiled classification prompt.
pub struct PromptTemplate {
    hbs: Handlebars<'static>,
}

impl PromptTemplate {
    /// Compile `template`. Unknown variables are rejected at render time.
    pub fn new(template: &str) -> Result<Self, handlebars::TemplateError> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.set_strict_mode(true);
        hbs.register_template_string(TEMPLATE_NAME, template)?;
        Ok(Self { hbs })
    }

    pub fn render(&self, chunk: &Chunk<'_>) -> Result<String, ClassificationError> {
        let messages = serde_json::to_string_pretty(chunk.messages)
            .map_err(|e| ClassificationError::Prompt(e.to_string()))?;
        let data = json!({
            "chunk": messages,
            "chunk_number": chunk.index + 1,
            "message_count": chunk.messages.len(),
        });
        self.hbs
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| ClassificationError::Prompt(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::tests::msgs;
    use std::num::NonZeroUsize;

    #[test]
    fn default_template_embeds_chunk() {
        let messages = msgs(&["m1", "m2", "m3"]);
        let chunk = crate::chunker::chunks(&messages, NonZeroUsize::MIN.saturating_add(1), 1, None)
            .next()
            .unwrap();
        let prompt = PromptTemplate::new(DEFAULT_TEMPLATE)
            .unwrap()
            .render(&chunk)
            .unwrap();
        assert!(prompt.contains("Window 2 (1 messages):"));
        assert!(prompt.contains(r#""id": "m3""#));
        assert!(!prompt.contains(r#""id": "m1""#));
        // JSON quotes must not be HTML-escaped.
        assert!(!prompt.contains("&quot;"));
        assert!(prompt.contains(r#""debugging_message_ids": ["<id>", ...]"#));
    }

    #[test]
    fn custom_template() {
        let messages = msgs(&["a"]);
        let chunk = crate::chunker::chunks(&messages, NonZeroUsize::MIN, 0, None)
            .next()
            .unwrap();
        let prompt = PromptTemplate::new("n={{message_count}}")
            .unwrap()
            .render(&chunk)
            .unwrap();
        assert_eq!(prompt, "n=1");
    }

    #[test]
    fn unknown_variable_fails_render() {
        let messages = msgs(&["a"]);
        let chunk = crate::chunker::chunks(&messages, NonZeroUsize::MIN, 0, None)
            .next()
            .unwrap();
        let template = PromptTemplate::new("{{transcript}}").unwrap();
        assert!(matches!(
            template.render(&chunk),
            Err(ClassificationError::Prompt(_))
        ));
    }

    #[test]
    fn unbalanced_template_is_rejected() {
        assert!(PromptTemplate::new("{{#if chunk}}never closed").is_err());
    }
}
