use std::path::Path;

use anyhow::Context;
use tokio::fs;

/// System prompt for the component generation model. Opaque to the server.
pub const GENERATION_PROMPT: &str = include_str!("prompts/generation.md");

/// Returns the override file's contents when one is configured and non-empty,
/// otherwise the built-in prompt.
pub async fn load_generation_prompt(override_path: Option<&Path>) -> anyhow::Result<String> {
    let Some(path) = override_path else {
        return Ok(GENERATION_PROMPT.to_string());
    };
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading generation prompt {}", path.display()))?;
    if raw.trim().is_empty() {
        tracing::warn!(
            "generation prompt override {} is empty; using built-in prompt",
            path.display()
        );
        return Ok(GENERATION_PROMPT.to_string());
    }
    Ok(raw)
}
