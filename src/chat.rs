//! Streaming response generation

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{Error, Result};

/// Stands in for retrieved context when nothing matched
pub const NO_CONTEXT_MARKER: &str = "No context found.";

/// Response text fragments in backend-delivery order
///
/// The stream is forward-only and finite. Dropping it mid-stream
/// abandons the response and releases the backend connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One message of a chat request
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Streaming generation backend
#[async_trait]
pub trait ChatGenerator: Send + Sync {
    /// Start a streaming completion for the given messages
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream>;
}

/// Streams completions from the `OpenAI` chat API
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ChatGenerator for OpenAiChat {
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream> {
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
        }

        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "starting completion");

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("Chat API error {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(forward_deltas(response, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Relay SSE content deltas from the response body into the channel
///
/// A dropped receiver means the caller abandoned the response; the body
/// stream is dropped with the task, closing the connection.
async fn forward_deltas(response: reqwest::Response, tx: mpsc::Sender<Result<String>>) {
    #[derive(serde::Deserialize)]
    struct StreamChunk {
        choices: Vec<StreamChoice>,
    }

    #[derive(serde::Deserialize)]
    struct StreamChoice {
        delta: StreamDelta,
    }

    #[derive(serde::Deserialize)]
    struct StreamDelta {
        #[serde(default)]
        content: Option<String>,
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx
                    .send(Err(Error::Chat(format!("stream interrupted: {e}"))))
                    .await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);

        // Events may arrive split across chunks; consume whole lines only
        while let Some(line) = next_line(&mut buffer) {
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            if payload == "[DONE]" {
                return;
            }

            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(parsed) => {
                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content);
                    let Some(content) = content else { continue };
                    if content.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(content)).await.is_err() {
                        tracing::debug!("response abandoned mid-stream");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed stream event");
                }
            }
        }
    }
}

/// Take the next whole line off the front of the byte buffer
///
/// Decoding is per line, so a multi-byte character split across network
/// chunks reassembles before it is decoded.
fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=newline).collect();
    Some(String::from_utf8_lossy(&line).trim().to_string())
}

/// Drives streaming generation for one utterance
pub struct ResponseStreamer {
    generator: Arc<dyn ChatGenerator>,
    persona: String,
}

impl ResponseStreamer {
    #[must_use]
    pub fn new(generator: Arc<dyn ChatGenerator>, persona: String) -> Self {
        Self { generator, persona }
    }

    /// Start generating a spoken-style response grounded in `context`
    ///
    /// # Errors
    ///
    /// Returns error if the generation request cannot be started
    pub async fn generate(&self, utterance: &str, context: &str) -> Result<FragmentStream> {
        let messages = build_messages(&self.persona, utterance, context);
        self.generator.generate(messages).await
    }
}

/// Assemble the request: persona, retrieved context, then the utterance
#[must_use]
pub fn build_messages(persona: &str, utterance: &str, context: &str) -> Vec<ChatMessage> {
    let context = if context.trim().is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context
    };

    vec![
        ChatMessage::system(persona),
        ChatMessage::system(format!("Relevant context:\n{context}")),
        ChatMessage::user(utterance),
    ]
}
