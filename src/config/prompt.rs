use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a pediatric care assistant. Provide:
- Clear, accurate pediatric advice
- Simple language for parents
- Markdown formatting for readability
- Warnings for serious symptoms
- Always recommend professional care when needed
- use minimum words to answer the question";

/// Lower-case substrings that make a prompt pull in the uploaded document.
pub const DOCUMENT_KEYWORDS: [&str; 5] = ["document", "report", "file", "pdf", "attachment"];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error: {0}")] IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")] JsonError(#[from] serde_json::Error),
    #[error("Prompt field '{0}' must not be empty")] EmptyField(&'static str),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PromptError::EmptyField("system_prompt"));
        }
        Ok(())
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    info!("Loaded prompts from '{}'", path.as_ref().display());
    Ok(config)
}

/// Built-in prompts unless a prompt file is configured.
pub fn resolve_prompts(path: Option<&str>) -> Result<PromptConfig, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => Ok(PromptConfig::default()),
    }
}
