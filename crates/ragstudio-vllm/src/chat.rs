use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstudio_core::error::ModelError;
use ragstudio_core::models::chat::ChatMessage;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::runtime::{GenerationModel, ModelParams};

use crate::error::VllmError;
use crate::server::ServerProcess;

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(flatten)]
    pub sampling: &'a SamplingParams,
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(flatten)]
    pub sampling: &'a SamplingParams,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

pub fn parse_chat_response(body: &str) -> Result<String, VllmError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| VllmError::ResponseParse("no choices in chat response".to_string()))
}

pub fn parse_completion_response(body: &str) -> Result<String, VllmError> {
    let response: CompletionResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text)
        .ok_or_else(|| VllmError::ResponseParse("no choices in completion response".to_string()))
}

/// POST a JSON body and return the response text, failing on non-2xx.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<String, VllmError> {
    let response = http.post(url).json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(VllmError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

/// Generation model served by a local vLLM server.
pub struct VllmChatModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    params: ModelParams,
    // Kept alive for as long as the handle is; `None` when attached to a
    // server this process does not own.
    _server: Option<ServerProcess>,
}

impl VllmChatModel {
    pub fn new(http: reqwest::Client, server: ServerProcess, model: impl Into<String>, params: ModelParams) -> Self {
        Self {
            http,
            base_url: server.base_url().to_string(),
            model: model.into(),
            params,
            _server: Some(server),
        }
    }

    /// Use a server that is already running at `base_url`.
    pub fn attach(
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        params: ModelParams,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            params,
            _server: None,
        }
    }
}

#[async_trait]
impl GenerationModel for VllmChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn params(&self) -> ModelParams {
        self.params
    }

    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, ModelError> {
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            sampling,
        };
        debug!(model = %self.model, prompt_chars = prompt.len(), "completion request");
        let text = post_json(&self.http, &format!("{}/v1/completions", self.base_url), &body).await?;
        Ok(parse_completion_response(&text)?)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            sampling,
        };
        debug!(model = %self.model, turns = messages.len(), "chat request");
        let text = post_json(&self.http, &format!("{}/v1/chat/completions", self.base_url), &body).await?;
        Ok(parse_chat_response(&text)?)
    }
}
