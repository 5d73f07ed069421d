//! Ollama API client: model listing, embeddings and streaming chat with retry logic

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::FragmentStream;
use crate::types::ChatMessage;

/// Ollama API client with automatic retry
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    #[serde(default)]
    content: String,
}

/// One decoded line of a streamed chat reply
#[derive(Debug, PartialEq)]
enum ChatEvent {
    Fragment(String),
    /// Last line of the reply, possibly carrying trailing text
    Done(Option<String>),
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        // Chat streams have no overall timeout; unary calls set one per request
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries {
                        let delay = Duration::from_millis(
                            self.config.retry_base_delay_ms.saturating_mul(1 << attempt.min(16)),
                        );
                        tracing::warn!(
                            "Request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Llm("Unknown error".to_string())))
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout())
            .send()
            .await;

        match response {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List installed model names
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.url("/api/tags");
        let timeout = self.request_timeout();

        self.retry_request(|| {
            let request = self.client.get(&url).timeout(timeout);

            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::Llm(format!("Model listing failed: {}", e)))?;

                if !response.status().is_success() {
                    return Err(Error::Llm(format!(
                        "Model listing failed: HTTP {}",
                        response.status()
                    )));
                }

                let tags: TagsResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Llm(format!("Failed to parse model list: {}", e)))?;

                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
        })
        .await
    }

    /// Whether a model is installed (`name` also matches `name:latest`)
    pub async fn has_model(&self, model: &str) -> Result<bool> {
        let installed = self.list_models().await?;
        Ok(installed.iter().any(|name| model_matches(name, model)))
    }

    /// Generate an embedding with retry
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = self.url("/api/embeddings");
        let timeout = self.request_timeout();

        self.retry_request(|| {
            let request = self
                .client
                .post(&url)
                .timeout(timeout)
                .json(&EmbedRequest { model, prompt: text });

            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::embedding(format!(
                        "Embedding failed: HTTP {} - {}",
                        status, body
                    )));
                }

                let embed_response: EmbedResponse = response.json().await.map_err(|e| {
                    Error::embedding(format!("Failed to parse embedding response: {}", e))
                })?;

                if embed_response.embedding.is_empty() {
                    return Err(Error::embedding(format!(
                        "Model '{}' returned an empty embedding",
                        model
                    )));
                }

                Ok(embed_response.embedding)
            }
        })
        .await
    }

    /// Start a streaming chat reply
    ///
    /// The returned stream yields text fragments in order. A failure after the
    /// first fragment arrives as an `Err` item and ends the stream. Dropping the
    /// stream closes the underlying connection.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<FragmentStream> {
        let request = ChatRequest {
            model,
            messages,
            stream: true,
            options: ChatOptions { temperature },
        };

        tracing::info!("Chatting with model: {} ({} messages)", model, messages.len());

        let timeout = self.request_timeout();
        let send = self.client.post(self.url("/api/chat")).json(&request).send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| Error::Llm(format!("Chat request got no response within {:?}", timeout)))?
            .map_err(|e| Error::Llm(format!("Chat request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Chat failed: HTTP {} - {}", status, body)));
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(64);
        let idle_timeout = timeout;

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = LineDecoder::default();

            loop {
                let next = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let _ = tx
                            .send(Err(Error::Llm(format!(
                                "Chat stream stalled for {:?}",
                                idle_timeout
                            ))))
                            .await;
                        return;
                    }
                };

                match next {
                    Some(Ok(chunk)) => {
                        for line in decoder.push(&chunk) {
                            if !forward_line(&line, &tx).await {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(Error::Llm(format!("Stream error: {}", e)))).await;
                        return;
                    }
                    None => {
                        if let Some(line) = decoder.finish() {
                            if !forward_line(&line, &tx).await {
                                return;
                            }
                        }
                        let _ = tx
                            .send(Err(Error::Llm("Chat stream ended before completion".into())))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Send one decoded line downstream; returns false when the stream is finished
async fn forward_line(line: &str, tx: &mpsc::Sender<Result<String>>) -> bool {
    match parse_chat_line(line) {
        Ok(Some(ChatEvent::Fragment(text))) => tx.send(Ok(text)).await.is_ok(),
        Ok(Some(ChatEvent::Done(Some(text)))) => {
            let _ = tx.send(Ok(text)).await;
            false
        }
        Ok(Some(ChatEvent::Done(None))) => false,
        Ok(None) => true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Decode one NDJSON line of `/api/chat` output
fn parse_chat_line(line: &str) -> Result<Option<ChatEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| Error::Llm(format!("Malformed chat stream line: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(Error::Llm(error));
    }

    let text = chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty());
    match (chunk.done, text) {
        (true, text) => Ok(Some(ChatEvent::Done(text))),
        (false, Some(text)) => Ok(Some(ChatEvent::Fragment(text))),
        (false, None) => Ok(None),
    }
}

/// Whether an installed model name satisfies a configured one
pub fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_suffix(":latest")
            .map_or(false, |base| base == wanted)
        || wanted
            .strip_suffix(":latest")
            .map_or(false, |base| base == installed)
}

/// Splits a byte stream into complete lines, buffering partial ones
#[derive(Debug, Default)]
struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
