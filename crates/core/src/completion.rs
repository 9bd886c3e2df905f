use crate::error::ProviderError;
use crate::models::Role;
use crate::provider::ProviderEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T> CompletionProvider for Arc<T>
where
    T: CompletionProvider + ?Sized,
{
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, ProviderError> {
        (**self).complete(turns).await
    }
}

/// System instruction followed by one user turn carrying context and question.
pub fn build_prompt(system_prompt: &str, context: &str, question: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn::new(Role::System, system_prompt),
        ChatTurn::new(
            Role::User,
            format!("Context:\n{context}\n\nQuestion: {question}"),
        ),
    ]
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpCompletionClient {
    endpoint: ProviderEndpoint,
    model: String,
    temperature: f32,
}

impl HttpCompletionClient {
    pub fn new(endpoint: ProviderEndpoint, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionClient {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, ProviderError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
        };
        let response: CompletionResponse = self
            .endpoint
            .post_json("chat-completions", "chat/completions", &payload)
            .await?;

        answer_text(response)
    }
}

fn answer_text(response: CompletionResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse {
            provider: "chat-completions".to_string(),
            details: "response contained no message content".to_string(),
        })
}

/// Offline completion that answers with the retrieved context verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextEchoCompletion;

#[async_trait]
impl CompletionProvider for ContextEchoCompletion {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, ProviderError> {
        let prompt = turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();

        let context = prompt
            .strip_prefix("Context:\n")
            .and_then(|rest| rest.rsplit_once("\n\nQuestion: "))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();

        if context.is_empty() {
            Ok("No relevant passages were found in the course material.".to_string())
        } else {
            Ok(format!("Relevant passages from the course material:\n\n{context}"))
        }
    }
}
