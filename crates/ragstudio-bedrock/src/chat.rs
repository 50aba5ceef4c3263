use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use aws_smithy_types::{Document, Number};
use tracing::debug;

use ragstudio_core::error::ModelError;
use ragstudio_core::models::chat::{ChatMessage, ChatRole};
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::runtime::{GenerationModel, ModelParams};

use crate::error::BedrockError;

/// Generation model served by the Bedrock Converse API.
pub struct BedrockChatModel {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
    params: ModelParams,
}

impl BedrockChatModel {
    pub fn new(config: &aws_config::SdkConfig, model_id: impl Into<String>, params: ModelParams) -> Self {
        Self {
            client: aws_sdk_bedrockruntime::Client::new(config),
            model_id: model_id.into(),
            params,
        }
    }

    /// Send a conversation and return the assistant's reply text.
    ///
    /// System messages become system content blocks; the rest keep their
    /// order as conversation turns.
    async fn converse(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, BedrockError> {
        let mut system = Vec::new();
        let mut converse_messages = Vec::with_capacity(messages.len());

        for msg in messages {
            let role = match msg.role {
                ChatRole::System => {
                    system.push(SystemContentBlock::Text(msg.content.clone()));
                    continue;
                }
                ChatRole::User => ConversationRole::User,
                ChatRole::Assistant => ConversationRole::Assistant,
            };
            let message = Message::builder()
                .role(role)
                .content(ContentBlock::Text(msg.content.clone()))
                .build()
                .map_err(|e| BedrockError::Invocation(e.to_string()))?;
            converse_messages.push(message);
        }

        debug!(
            model_id = %self.model_id,
            turns = converse_messages.len(),
            system_blocks = system.len(),
            "converse request"
        );

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .set_system((!system.is_empty()).then_some(system))
            .set_messages(Some(converse_messages))
            .set_inference_config(inference_config(sampling))
            .set_additional_model_request_fields(penalty_fields(sampling))
            .send()
            .await
            .map_err(|e| BedrockError::Invocation(e.into_service_error().to_string()))?;

        let output_message = response
            .output()
            .and_then(|o| o.as_message().ok())
            .ok_or_else(|| BedrockError::ResponseParse("no message in response".to_string()))?;

        Ok(output_message
            .content()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl GenerationModel for BedrockChatModel {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn params(&self) -> ModelParams {
        self.params
    }

    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, ModelError> {
        Ok(self.converse(&[ChatMessage::user(prompt)], sampling).await?)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, ModelError> {
        Ok(self.converse(messages, sampling).await?)
    }
}

/// Converse's own inference fields. `None` leaves every default in place.
pub fn inference_config(sampling: &SamplingParams) -> Option<InferenceConfiguration> {
    let stop = &sampling.stop;
    if sampling.temperature.is_none()
        && sampling.top_p.is_none()
        && sampling.max_tokens.is_none()
        && stop.is_empty()
    {
        return None;
    }
    Some(
        InferenceConfiguration::builder()
            .set_temperature(sampling.temperature)
            .set_top_p(sampling.top_p)
            .set_max_tokens(sampling.max_tokens.map(|n| i32::try_from(n).unwrap_or(i32::MAX)))
            .set_stop_sequences((!stop.is_empty()).then(|| stop.clone()))
            .build(),
    )
}

/// Converse has no penalty fields; they travel as model-specific request
/// fields.
pub fn penalty_fields(sampling: &SamplingParams) -> Option<Document> {
    let fields: HashMap<String, Document> = [
        ("presence_penalty", sampling.presence_penalty),
        ("frequency_penalty", sampling.frequency_penalty),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value.map(|v| (name.to_string(), Document::Number(Number::Float(f64::from(v)))))
    })
    .collect();
    (!fields.is_empty()).then_some(Document::Object(fields))
}
