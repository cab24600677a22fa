#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{GenerationRequest, Generator, ResponseFormat};
use crate::config::{GenerationConfig, OllamaConfig};
use crate::ollama::{OllamaTransport, RetryPolicy};
use crate::{RagError, Result};

const CHAT_PATH: &str = "/api/chat";

/// Chat completion client for an Ollama server
///
/// Sends the prompt as a single user message with streaming disabled.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    transport: OllamaTransport,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(ollama: &OllamaConfig, generation: &GenerationConfig) -> Result<Self> {
        let transport = OllamaTransport::new(ollama)
            .map_err(|e| RagError::InvalidConfig(format!("{e:#}")))?
            .with_retry(RetryPolicy::exponential(generation.retry_attempts));

        Ok(Self {
            transport,
            model: ollama.chat_model.clone(),
            temperature: generation.temperature,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport = self.transport.with_retry(retry);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub const fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Check that the server is up and the chat model is installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.transport
            .ping()
            .context("Server ping failed")
            .and_then(|()| {
                self.transport
                    .validate_model(&self.model)
                    .context("Model validation failed")
            })
            .map_err(service_error)?;

        info!(
            "Chat model {} is available at {}",
            self.model,
            self.transport.base_url()
        );
        Ok(())
    }

    fn chat_request<'a>(&'a self, request: &GenerationRequest<'a>) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            stream: false,
            format: match request.format {
                ResponseFormat::Text => None,
                ResponseFormat::Json => Some("json"),
            },
            options: ChatOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
        }
    }
}

impl Generator for OllamaGenerator {
    #[inline]
    fn generate_with(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = self.chat_request(request);
        debug!(
            "Requesting completion from {} ({} prompt characters, temperature {})",
            self.model,
            request.prompt.chars().count(),
            body.options.temperature
        );

        let response: ChatResponse = self
            .transport
            .post_json(CHAT_PATH, &body)
            .with_context(|| format!("Chat request to model '{}' failed", self.model))
            .map_err(service_error)?;

        debug!(
            "Received {} characters from {}",
            response.message.content.chars().count(),
            self.model
        );
        Ok(response.message.content)
    }
}

fn service_error(error: anyhow::Error) -> RagError {
    RagError::GenerationService(format!("{error:#}"))
}
