pub mod ollama;

use serde::{Deserialize, Serialize};

pub use ollama::{FragmentDecoder, OllamaClient, OllamaConfig};

/// Entry of `GET /api/tags`. Sizes, digests and details are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// One newline-delimited object of a streamed generate response.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GenerateFragment {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Incremental piece of a reply, handed to the caller as it arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// Outcome of one fully consumed generate stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub text: String,
    pub fragments: usize,
    /// Lines that were not valid fragments and were dropped.
    pub skipped_fragments: usize,
    /// Whether a fragment with `"done": true` arrived. Informational only;
    /// the stream ends when the transport does.
    pub saw_done: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("failed to load models: {0}")]
    ModelList(String),
    #[error("inference failed: {message}")]
    Inference { message: String, partial: String },
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("no model selected")]
    NoModelSelected,
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl LlmError {
    /// Text received before an inference failure, if any.
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            LlmError::Inference { partial, .. } if !partial.is_empty() => Some(partial),
            _ => None,
        }
    }
}
