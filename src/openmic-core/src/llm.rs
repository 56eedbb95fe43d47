//! Language model collaborator.
//!
//! The core only needs "messages in, text out". [`OpenAiModel`] provides that
//! over any OpenAI-compatible chat completion endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::OpenMicError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<ChatMessage> for ChatCompletionRequestMessage {
    fn from(message: ChatMessage) -> Self {
        match message.role {
            ChatRole::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: message.content.into(),
                    name: None,
                })
            }
            ChatRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: message.content.into(),
                    name: None,
                })
            }
            ChatRole::Assistant => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(message.content.into()),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }
}

/// A single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Anything that turns a chat history into generated text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OpenMicError>;
}

/// A language model bound to a model name, for single-shot system + user
/// prompts.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn LanguageModel>,
    name: String,
    max_tokens: u32,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn LanguageModel>, name: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model,
            name: name.into(),
            max_tokens,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn ask(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<String, OpenMicError> {
        let mut request = CompletionRequest::new(
            self.name.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            self.max_tokens,
        );
        request.temperature = temperature;
        self.model.complete(request).await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Split a model reply into trimmed, non-empty lines.
pub fn reply_lines(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Chat completion client for OpenAI-compatible APIs.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
}

impl OpenAiModel {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, OpenMicError> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                OpenMicError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OpenMicError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            request.messages.into_iter().map(Into::into).collect();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .max_completion_tokens(request.max_tokens)
            .messages(messages);
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }
        let chat_request = args.build()?;

        debug!(model = %request.model, "sending chat completion");
        let response = self.client.chat().create(chat_request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}
