//! # API Module
//!
//! Talks to the hosted chat model.
//!
//! [`CompletionService`] is the seam the session loop depends on: it turns a
//! [`ComposedPrompt`] into an ordered stream of text chunks. Streaming and non-streaming
//! backends look the same to callers; a non-streaming reply is a stream with one chunk, so
//! both modes yield the same final text through [`CompletionService::complete`].
//!
//! [`OpenAiCompletionClient`] implements it with `async-openai` against any
//! OpenAI-compatible endpoint. Failures to reach the model are retried with exponential
//! backoff up to `max_retries` times before any chunk is produced; errors after the first
//! chunk end the stream. Every failure is a [`CoachError::CompletionService`].
//!
//! A streamed request reports HTTP, auth and rate-limit failures as the first item of the
//! stream, so a stream only counts as opened once its first chunk has arrived. The
//! client's own time-based backoff is switched off; `max_retries` is the only retry
//! bound.
//!
//! # Example
//!
//! ```no_run
//! use eque::api::{CompletionService, OpenAiCompletionClient};
//! use eque::config::CoachConfig;
//! use eque::prompt::PromptComposer;
//! use eque::template::CoachTemplate;
//!
//! # async fn demo() -> eque::error::Result<()> {
//! let config = CoachConfig { api_key: "sk-...".into(), ..CoachConfig::default() };
//! let client = OpenAiCompletionClient::new(&config);
//! let prompt = PromptComposer::new(CoachTemplate::default())
//!     .compose("", &Default::default(), &[], "Hello");
//! let reply = client.complete(&prompt).await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, Role,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use futures::{
    StreamExt, TryStreamExt,
    future::ready,
    stream::{self, BoxStream},
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CoachConfig;
use crate::error::{CoachError, Result};
use crate::prompt::{ComposedPrompt, PromptMessage};

/// Ordered text chunks of one reply; ends after the last chunk or at the first error.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// A hosted chat model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start generating a reply to `prompt`.
    async fn stream(&self, prompt: &ComposedPrompt) -> Result<ChunkStream>;

    /// Generate the whole reply at once.
    async fn complete(&self, prompt: &ComposedPrompt) -> Result<String> {
        let chunks: Vec<String> = self.stream(prompt).await?.try_collect().await?;
        Ok(chunks.concat())
    }
}

/// Creates a new OpenAI API client from configuration.
///
/// Retries are counted by [`OpenAiCompletionClient`], so the client gives up after the
/// first transient error instead of backing off on its own.
fn create_client(config: &CoachConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    let single_attempt = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();
    debug!(api_base = %config.api_base, model = %config.model, "Client created");
    Client::with_config(openai_config).with_backoff(single_attempt)
}

fn completion_err(err: OpenAIError) -> CoachError {
    CoachError::CompletionService(err.to_string())
}

/// Convert a prompt message into the `async-openai` request type.
#[allow(deprecated)]
fn to_request_message(message: &PromptMessage) -> ChatCompletionRequestMessage {
    match message.role {
        Role::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(message.content.clone()),
            name: None,
        }),
        Role::Assistant => {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content.clone(),
                )),
                name: None,
                refusal: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
        _ => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(message.content.clone()),
            name: None,
        }),
    }
}

/// Chat completions over an OpenAI-compatible API.
pub struct OpenAiCompletionClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    should_stream: bool,
    max_retries: u32,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CoachConfig) -> Self {
        Self {
            client: create_client(config),
            model: config.model.clone(),
            temperature: config.temperature,
            should_stream: config.should_stream,
            max_retries: config.max_retries,
        }
    }

    /// Switch between token streaming and a single full reply.
    pub fn streaming(mut self, should_stream: bool) -> Self {
        self.should_stream = should_stream;
        self
    }

    fn build_request(&self, prompt: &ComposedPrompt) -> Result<CreateChatCompletionRequest> {
        let messages: Vec<ChatCompletionRequestMessage> =
            prompt.messages.iter().map(to_request_message).collect();

        CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .temperature(self.temperature)
            .messages(messages)
            .build()
            .map_err(completion_err)
    }

    /// Open a streamed reply and wait for its first chunk.
    ///
    /// An error in place of the first chunk is returned as the result, so the caller can
    /// retry it; the chunk itself is put back in front of the rest of the stream.
    async fn open_stream(&self, request: CreateChatCompletionRequest) -> Result<ChunkStream> {
        let response_stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(completion_err)?;

        let mut chunks = response_stream
            .filter_map(|result| async move {
                match result {
                    Ok(response) => {
                        let text: String = response
                            .choices
                            .iter()
                            .filter_map(|choice| choice.delta.content.as_deref())
                            .collect();
                        (!text.is_empty()).then_some(Ok(text))
                    }
                    Err(err) => Some(Err(completion_err(err))),
                }
            })
            .boxed();

        match chunks.next().await {
            Some(Ok(first)) => Ok(stream::once(ready(Ok(first))).chain(chunks).boxed()),
            Some(Err(err)) => Err(err),
            None => Ok(stream::empty().boxed()),
        }
    }

    async fn fetch(&self, request: CreateChatCompletionRequest) -> Result<ChunkStream> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(completion_err)?;

        let text: String = response
            .choices
            .iter()
            .filter_map(|choice| choice.message.content.as_deref())
            .collect();

        Ok(stream::iter([Ok(text)]).boxed())
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn stream(&self, prompt: &ComposedPrompt) -> Result<ChunkStream> {
        let request = self.build_request(prompt)?;
        debug!(messages = prompt.messages.len(), stream = self.should_stream, "Sending request");

        let mut attempt = 0;
        loop {
            let result = if self.should_stream {
                self.open_stream(request.clone()).await
            } else {
                self.fetch(request.clone()).await
            };

            match result {
                Ok(stream) => return Ok(stream),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(250 * 2_u64.pow(attempt));
                    warn!(attempt, max_retries = self.max_retries, error = %err, "Completion request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptComposer;
    use crate::template::CoachTemplate;
    use httpmock::prelude::*;
    use serde_json::json;

    fn mock_config(api_base: String) -> CoachConfig {
        CoachConfig {
            api_key: "mock_api_key".to_string(),
            api_base,
            model: "mock_model".to_string(),
            should_stream: false,
            max_retries: 0,
            ..CoachConfig::default()
        }
    }

    fn prompt() -> ComposedPrompt {
        PromptComposer::new(CoachTemplate::default()).compose(
            "Active Listening:\nParaphrase.",
            &Default::default(),
            &[],
            "Hello",
        )
    }

    /// Server-sent events for a reply streamed as "Hi " then "there".
    fn sse_body() -> String {
        let chunk = |delta: serde_json::Value| {
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1700000000,
                "model": "mock_model",
                "choices": [{ "index": 0, "delta": delta, "finish_reason": null }]
            })
        };
        let events = [
            chunk(json!({ "role": "assistant", "content": "" })),
            chunk(json!({ "content": "Hi " })),
            chunk(json!({ "content": "there" })),
            chunk(json!({})),
        ];

        let mut body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn full_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "mock_model",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn request_messages_keep_roles_and_order() {
        let config = mock_config("http://mock.api.base".into());
        let client = OpenAiCompletionClient::new(&config);
        let request = client.build_request(&prompt()).unwrap();

        assert_eq!(request.model, "mock_model");
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(request.messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(request.messages[1], ChatCompletionRequestMessage::User(_)));
    }

    #[tokio::test]
    async fn fetch_returns_the_full_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer mock_api_key");
                then.status(200)
                    .json_body(full_body("Hi! What would you like to work on?"));
            })
            .await;

        let client = OpenAiCompletionClient::new(&mock_config(server.base_url()));
        let reply = client.complete(&prompt()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "Hi! What would you like to work on?");
    }

    #[tokio::test]
    async fn auth_failure_is_a_completion_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).json_body(json!({
                    "error": {
                        "message": "Incorrect API key provided",
                        "type": "invalid_request_error",
                        "param": null,
                        "code": "invalid_api_key"
                    }
                }));
            })
            .await;

        let client = OpenAiCompletionClient::new(&mock_config(server.base_url()));
        let err = client.complete(&prompt()).await.unwrap_err();

        assert!(matches!(err, CoachError::CompletionService(_)));
    }

    #[tokio::test]
    async fn streamed_reply_joins_chunks_and_matches_full_reply() {
        let streaming = MockServer::start_async().await;
        let stream_mock = streaming
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse_body());
            })
            .await;

        let config = CoachConfig {
            should_stream: true,
            ..mock_config(streaming.base_url())
        };
        let client = OpenAiCompletionClient::new(&config);
        let chunks: Vec<String> = client
            .stream(&prompt())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        stream_mock.assert_async().await;
        assert_eq!(chunks, ["Hi ", "there"]);

        let fetching = MockServer::start_async().await;
        fetching
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(full_body("Hi there"));
            })
            .await;

        let client = OpenAiCompletionClient::new(&mock_config(fetching.base_url()));
        assert_eq!(client.complete(&prompt()).await.unwrap(), chunks.concat());
    }

    #[tokio::test]
    async fn streaming_retries_when_the_first_chunk_is_an_error() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("upstream unavailable");
            })
            .await;

        let config = CoachConfig {
            should_stream: true,
            max_retries: 2,
            ..mock_config(server.base_url())
        };
        let reply = tokio::spawn(async move {
            OpenAiCompletionClient::new(&config)
                .complete(&prompt())
                .await
        });

        // the first attempt fails at once; the retry waits 500ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        failing.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse_body());
            })
            .await;

        assert_eq!(reply.await.unwrap().unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn streaming_gives_up_after_max_retries() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("upstream unavailable");
            })
            .await;

        let config = CoachConfig {
            should_stream: true,
            max_retries: 1,
            ..mock_config(server.base_url())
        };
        let err = OpenAiCompletionClient::new(&config)
            .complete(&prompt())
            .await
            .unwrap_err();

        assert!(
            matches!(err, CoachError::CompletionService(ref m) if m.contains("upstream unavailable"))
        );
    }

    #[tokio::test]
    async fn fetch_server_error_returns_without_internal_backoff() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let client = OpenAiCompletionClient::new(&mock_config(server.base_url()));
        let result = tokio::time::timeout(Duration::from_secs(5), client.complete(&prompt())).await;

        assert!(matches!(
            result,
            Ok(Err(CoachError::CompletionService(ref m))) if m.contains("overloaded")
        ));
    }
}
