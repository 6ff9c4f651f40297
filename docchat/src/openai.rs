use anyhow::anyhow;
use async_openai::{
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, Role as OpenAIRole,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use futures::StreamExt;
use std::time::Duration;

use crate::{
    config::OpenAIConfig,
    error::{Error, Result, Service},
    generation::{Completer, FragmentStream},
    prompt::{ChatMessage, Role},
    retrieval::Embedder,
};

pub struct OpenAI {
    client: Client,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
}

impl OpenAI {
    #[must_use]
    pub fn new(config: &OpenAIConfig) -> Self {
        // Failed calls are surfaced to the caller instead of being retried.
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        let mut client = Client::new()
            .with_api_key(&config.api_key)
            .with_backoff(backoff);
        if let Some(api_base) = &config.api_base {
            client = client.with_api_base(api_base);
        }

        Self {
            client,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Embedder for OpenAI {
    /// Embeds a string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(text)
            .build()
            .map_err(|e| Error::dependency(Service::Embedding, e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::dependency(Service::Embedding, e))?;

        let embedding = response.data.into_iter().next().ok_or_else(|| {
            Error::dependency(Service::Embedding, anyhow!("Could not find embedding"))
        })?;

        Ok(embedding.embedding)
    }
}

#[async_trait]
impl Completer for OpenAI {
    /// Opens a streaming chat completion, yielding the content of each delta.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream> {
        let messages = messages
            .into_iter()
            .map(into_request_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .temperature(self.temperature)
            .messages(messages)
            .stream(true)
            .build()
            .map_err(|e| Error::dependency(Service::Completion, e))?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| Error::dependency(Service::Completion, e))?;

        Ok(Box::pin(stream.filter_map(|chunk| async move {
            match chunk {
                Err(e) => Some(Err(Error::dependency(Service::Completion, e))),
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .reduce(|mut text, content| {
                        text.push_str(&content);
                        text
                    })
                    .filter(|text| !text.is_empty())
                    .map(Ok),
            }
        })))
    }
}

fn into_request_message(message: ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let role = match message.role {
        Role::System => OpenAIRole::System,
        Role::User => OpenAIRole::User,
        Role::Assistant => OpenAIRole::Assistant,
    };

    ChatCompletionRequestMessageArgs::default()
        .role(role)
        .content(message.content)
        .build()
        .map_err(|e| Error::dependency(Service::Completion, e))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_chat_roles() {
        let messages = [
            ChatMessage::new(Role::System, "Answer from the context."),
            ChatMessage::new(Role::User, "Refunds?"),
            ChatMessage::new(Role::Assistant, "Within 30 days."),
        ];

        let requests = messages
            .into_iter()
            .map(|message| serde_json::to_value(into_request_message(message).unwrap()).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(requests[0]["role"], json!("system"));
        assert_eq!(requests[0]["content"], json!("Answer from the context."));
        assert_eq!(requests[1]["role"], json!("user"));
        assert_eq!(requests[2]["role"], json!("assistant"));
        assert_eq!(requests[2]["content"], json!("Within 30 days."));
    }
}
