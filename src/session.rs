use crate::doc_processor::ExtractedDocument;
use crate::llm::{LlmError, OllamaClient, StreamChunk};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document text attached to the conversation. A snapshot: the source file
/// is never read again once this exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub display_name: String,
    pub text: String,
}

impl From<&ExtractedDocument> for ConversationContext {
    fn from(doc: &ExtractedDocument) -> Self {
        Self {
            display_name: doc.display_name.clone(),
            text: doc.text.clone(),
        }
    }
}

/// Final text of one prompt/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    /// Stream lines that were not valid fragments and were dropped.
    pub skipped_fragments: usize,
}

/// One conversation with the inference server.
///
/// Holds the model list, the selected model and at most one attached
/// document. Sends take `&mut self`, so one session never has two prompts
/// in flight; independent sessions share nothing.
pub struct InferenceSession {
    id: Uuid,
    client: OllamaClient,
    available_models: Vec<String>,
    selected_model: Option<String>,
    context: Option<ConversationContext>,
}

impl InferenceSession {
    pub fn new(settings: &Settings) -> Result<Self, LlmError> {
        let client = OllamaClient::new(&settings.ollama())?;
        Ok(Self::with_client(client, settings.default_model.clone()))
    }

    pub fn with_client(client: OllamaClient, selected_model: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            available_models: Vec::new(),
            selected_model: selected_model.filter(|m| !m.trim().is_empty()),
            context: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Reload the model list from the server.
    ///
    /// On failure the previous list is kept. A selection that is missing
    /// from a non-empty new list moves to the first listed model.
    #[tracing::instrument(skip_all, fields(session = %self.id))]
    pub async fn refresh_models(&mut self) -> Result<&[String], LlmError> {
        let models = match self.client.list_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, kept = self.available_models.len(), "model refresh failed");
                return Err(e);
            }
        };

        let keep_selection = self
            .selected_model
            .as_ref()
            .is_some_and(|current| models.contains(current));
        if !keep_selection {
            if let Some(first) = models.first() {
                self.selected_model = Some(first.clone());
            }
        }

        tracing::debug!(count = models.len(), selected = ?self.selected_model, "models refreshed");
        self.available_models = models;
        Ok(&self.available_models)
    }

    /// Switch to `name`. Once a list has been loaded the name must be in it.
    pub fn select_model(&mut self, name: &str) -> Result<(), LlmError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LlmError::InvalidModel("model name is empty".to_string()));
        }
        if !self.available_models.is_empty() && !self.available_models.iter().any(|m| m == name) {
            return Err(LlmError::InvalidModel(format!("model not found: {name}")));
        }
        self.selected_model = Some(name.to_string());
        Ok(())
    }

    /// Replace the attached document. Attaching the same document twice
    /// leaves the session unchanged.
    pub fn attach_context(&mut self, doc: &ExtractedDocument) {
        tracing::debug!(
            session = %self.id,
            document = %doc.display_name,
            chars = doc.text.chars().count(),
            "attaching document context"
        );
        self.context = Some(ConversationContext::from(doc));
    }

    pub fn clear_context(&mut self) {
        self.context = None;
    }

    pub fn context(&self) -> Option<&ConversationContext> {
        self.context.as_ref()
    }

    /// The prompt actually sent for `user_text`: the text itself, or the
    /// attached document followed by the question.
    pub fn build_prompt(&self, user_text: &str) -> String {
        match &self.context {
            None => user_text.to_string(),
            Some(ctx) => format!(
                "Context from file '{}':\n{}\n\nUser question: {}",
                ctx.display_name, ctx.text, user_text
            ),
        }
    }

    /// Send a prompt and wait for the complete reply.
    ///
    /// Blank input sends nothing and returns `Ok(None)`.
    pub async fn send_prompt(&mut self, user_text: &str) -> Result<Option<Reply>, LlmError> {
        self.send_prompt_streaming(user_text, |_| {}).await
    }

    /// Like [`send_prompt`](Self::send_prompt), also handing every piece of
    /// the reply to `on_chunk` as it arrives.
    #[tracing::instrument(skip_all, fields(session = %self.id))]
    pub async fn send_prompt_streaming(
        &mut self,
        user_text: &str,
        on_chunk: impl FnMut(StreamChunk) + Send,
    ) -> Result<Option<Reply>, LlmError> {
        if user_text.trim().is_empty() {
            return Ok(None);
        }
        let model = self
            .selected_model
            .clone()
            .ok_or(LlmError::NoModelSelected)?;

        let prompt = self.build_prompt(user_text);
        let summary = self
            .client
            .generate_stream(&model, &prompt, on_chunk)
            .await?;

        Ok(Some(Reply {
            text: summary.text,
            skipped_fragments: summary.skipped_fragments,
        }))
    }
}
