use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{ChatMode, Settings};

/// One question sent to a chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub system_prompt: String,
    pub session_id: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The service answered with a non-success status.
    #[error("chat service returned status {0}")]
    Status(u16),
    /// The request never produced a usable response.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// A remote service that answers chat questions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `Ok(None)` when the service answered without any reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>, BackendError>;
}

/// Build the backend selected by `settings`.
pub fn backend_from_settings(settings: &Settings) -> anyhow::Result<Box<dyn ChatBackend>> {
    match settings.chat_mode {
        ChatMode::Proxy => Ok(Box::new(ProxyChatBackend::new(
            settings.chat_endpoint(),
            settings.timeout,
        )?)),
        ChatMode::Completion => {
            let Some(api_key) = settings.chat_api_key.clone() else {
                bail!(
                    "{} must be set for completion chat",
                    Settings::CHAT_API_KEY_ENV
                );
            };
            Ok(Box::new(CompletionChatBackend::new(
                settings.chat_endpoint(),
                api_key,
                settings.chat_model.clone(),
                settings.timeout,
            )?))
        }
    }
}

fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(concat!("paninsight/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("failed to build chat HTTP client")
}

/// The PanInsight backend's own `/api/ask` route.
#[derive(Debug, Clone)]
pub struct ProxyChatBackend {
    http: Client,
    url: String,
}

impl ProxyChatBackend {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, url.into()))
    }

    pub fn with_client(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl ChatBackend for ProxyChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>, BackendError> {
        let response = self
            .http
            .post(&self.url)
            .json(&AskRequest::from(request))
            .send()
            .await
            .context("failed to call chat proxy")?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        let body: AskResponse = response
            .json()
            .await
            .context("failed to parse chat proxy response")?;
        Ok(body.reply)
    }
}

/// An OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct CompletionChatBackend {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl CompletionChatBackend {
    pub const MAX_TOKENS: u32 = 100;
    pub const TEMPERATURE: f32 = 0.7;

    pub fn new(
        base: impl Into<String>,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            bail!("completion chat requires an API key");
        }
        let base = base.into();
        Ok(Self {
            http: http_client(timeout)?,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ChatBackend for CompletionChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>, BackendError> {
        let payload = ChatCompletionRequest::new(&self.model, request);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call chat completions API")?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        let chat: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse chat completions response")?;
        Ok(chat.into_reply())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest<'a> {
    message: &'a str,
    system_prompt: &'a str,
    session_id: &'a str,
}

impl<'a> From<&'a ChatRequest> for AskRequest<'a> {
    fn from(request: &'a ChatRequest) -> Self {
        Self {
            message: &request.message,
            system_prompt: &request.system_prompt,
            session_id: &request.session_id,
        }
    }
}

#[derive(Deserialize)]
struct AskResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// `user` carries the chat session id.
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    user: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(model: &'a str, request: &'a ChatRequest) -> Self {
        Self {
            model,
            messages: vec![
                CompletionMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                CompletionMessage {
                    role: "user",
                    content: &request.message,
                },
            ],
            max_tokens: CompletionChatBackend::MAX_TOKENS,
            temperature: CompletionChatBackend::TEMPERATURE,
            user: &request.session_id,
        }
    }
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    fn into_reply(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
