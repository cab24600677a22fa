#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{Embedder, Embedding};
use crate::config::OllamaConfig;
use crate::ollama::{ModelInfo, OllamaTransport, RetryPolicy};
use crate::{RagError, Result};

const EMBED_PATH: &str = "/api/embed";

/// Embedding client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    transport: OllamaTransport,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let transport = OllamaTransport::new(config)
            .map_err(|e| RagError::InvalidConfig(format!("{e:#}")))?
            .with_retry(RetryPolicy::exponential(config.embedding_retry_attempts));

        Ok(Self {
            transport,
            model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1) as usize,
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
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Test connection to the server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!(
            "Performing health check for Ollama at {}",
            self.transport.base_url()
        );

        self.transport
            .ping()
            .context("Server ping failed")
            .map_err(service_error)?;
        self.transport
            .validate_model(&self.model)
            .context("Model validation failed")
            .map_err(service_error)?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.transport.base_url(),
            self.model
        );
        Ok(())
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.transport.list_models().map_err(service_error)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbedResponse = self
            .transport
            .post_json(EMBED_PATH, &request)
            .with_context(|| format!("Failed to embed batch of {} texts", texts.len()))
            .map_err(service_error)?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for batch in texts.chunks(self.batch_size) {
            results.extend(self.embed_single_batch(batch)?);
        }

        if let Some(dimension) = results.first().map(Vec::len) {
            if results.iter().any(|e| e.len() != dimension) {
                return Err(RagError::EmbeddingService(
                    "Service returned embeddings of differing dimensions".to_string(),
                ));
            }
            debug!(
                "Generated {} embeddings with {} dimensions",
                results.len(),
                dimension
            );
        }

        Ok(results)
    }
}

fn service_error(error: anyhow::Error) -> RagError {
    RagError::EmbeddingService(format!("{error:#}"))
}
