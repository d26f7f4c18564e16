//! Client for the Ollama HTTP API: model listing and streamed generation.

use super::{GenerateFragment, GenerateRequest, LlmError, ModelList, StreamChunk, StreamSummary};
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Longest silence tolerated between two reads of a response body.
    pub read_timeout: Duration,
    /// Upper bound for the whole model-listing request.
    pub list_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_HOST.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
            list_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http_client: Client,
    list_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| LlmError::Client(error_chain(&e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            list_timeout: config.list_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the locally available models, in server order.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        tracing::debug!(%url, "listing models");

        let resp = self
            .http_client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await
            .map_err(|e| LlmError::ModelList(describe_transport_error(&e, &url)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ModelList(format!(
                "server returned {status}: {}",
                server_message(&text)
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| LlmError::ModelList(describe_transport_error(&e, &url)))?;
        let list: ModelList = serde_json::from_slice(&body)
            .map_err(|e| LlmError::ModelList(format!("unexpected model list body: {e}")))?;

        Ok(list
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| !name.trim().is_empty())
            .collect())
    }

    /// Send `prompt` to `model` and consume the streamed reply.
    ///
    /// Each fragment's `response` text is appended in arrival order and also
    /// passed to `on_chunk`. The reply is complete when the transport reaches
    /// end of stream. Lines that do not parse are skipped and counted.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        mut on_chunk: impl FnMut(StreamChunk) + Send,
    ) -> Result<StreamSummary, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
        };
        tracing::debug!(%url, model, prompt_len = prompt.len(), "starting generation");

        let resp = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Inference {
                message: describe_transport_error(&e, &url),
                partial: String::new(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Inference {
                message: format!("server returned {status}: {}", server_message(&text)),
                partial: String::new(),
            });
        }

        let mut summary = StreamSummary::default();
        let mut decoder = FragmentDecoder::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // An unterminated last line may still be a whole fragment.
                    if let Some(fragment) = decoder.finish() {
                        absorb(&mut summary, fragment, &mut on_chunk)?;
                    }
                    tracing::warn!(
                        error = %e,
                        received = summary.text.len(),
                        fragments = decoder.fragments(),
                        skipped = decoder.skipped(),
                        "generation stream broke off"
                    );
                    return Err(LlmError::Inference {
                        message: describe_transport_error(&e, &url),
                        partial: summary.text,
                    });
                }
            };

            for fragment in decoder.push(&chunk) {
                absorb(&mut summary, fragment, &mut on_chunk)?;
            }
        }

        if let Some(fragment) = decoder.finish() {
            absorb(&mut summary, fragment, &mut on_chunk)?;
        }

        summary.fragments = decoder.fragments();
        summary.skipped_fragments = decoder.skipped();
        if summary.skipped_fragments > 0 {
            tracing::warn!(
                skipped = summary.skipped_fragments,
                "generation stream contained malformed fragments"
            );
        }
        tracing::debug!(
            fragments = summary.fragments,
            saw_done = summary.saw_done,
            reply_len = summary.text.len(),
            "generation finished"
        );

        on_chunk(StreamChunk {
            delta: String::new(),
            done: true,
        });
        Ok(summary)
    }
}

fn absorb(
    summary: &mut StreamSummary,
    fragment: GenerateFragment,
    on_chunk: &mut impl FnMut(StreamChunk),
) -> Result<(), LlmError> {
    if let Some(error) = fragment.error {
        return Err(LlmError::Inference {
            message: format!("server reported: {error}"),
            partial: std::mem::take(&mut summary.text),
        });
    }

    summary.saw_done |= fragment.done;

    if let Some(delta) = fragment.response.filter(|r| !r.is_empty()) {
        summary.text.push_str(&delta);
        on_chunk(StreamChunk { delta, done: false });
    }
    Ok(())
}

/// Splits a byte stream into newline-delimited generate fragments.
///
/// Lines are cut on raw bytes so a multi-byte character split across two
/// network chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
    fragments: usize,
    skipped: usize,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<GenerateFragment> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(fragment) = self.parse_line(&line[..pos]) {
                out.push(fragment);
            }
        }
        out
    }

    /// Parse a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<GenerateFragment> {
        let rest = std::mem::take(&mut self.buffer);
        self.parse_line(&rest)
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<GenerateFragment> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_slice::<GenerateFragment>(line) {
            Ok(fragment) => {
                self.fragments += 1;
                Some(fragment)
            }
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, skipped = self.skipped, "skipping malformed fragment");
                None
            }
        }
    }
}

fn describe_transport_error(e: &reqwest::Error, url: &str) -> String {
    let detail = error_chain(e);
    if e.is_timeout() {
        format!("request to {url} timed out: {detail}")
    } else if e.is_connect() {
        format!("could not connect to {url}: {detail}")
    } else {
        detail
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn server_message(body: &str) -> String {
    serde_json::from_str::<GenerateFragment>(body)
        .ok()
        .and_then(|f| f.error)
        .unwrap_or_else(|| body.trim().to_string())
}
