// Embeddings module
// Text to vector backends and batched, order-preserving embedding of chunk sets

pub mod hashed;
pub mod ollama;


use indicatif::ProgressBar;
use std::thread;
use tracing::debug;

use crate::{RagError, Result};

pub use hashed::HashedEmbedder;
pub use ollama::OllamaEmbedder;

/// Fixed-length vector representation of a text
pub type Embedding = Vec<f32>;

/// Maps text to embeddings
///
/// Implementations must return the same vector for a text whether it is
/// embedded alone or as part of a batch, and a batch either fully succeeds
/// or fails as a whole.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, recorded with persisted indexes
    fn model_name(&self) -> &str;

    /// Embed several texts; output positions correspond to input positions
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed one text through the batch path
    #[inline]
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        match (embeddings.pop(), embeddings.is_empty()) {
            (Some(embedding), true) => Ok(embedding),
            _ => Err(RagError::EmbeddingService(
                "expected exactly one embedding for a single input".to_string(),
            )),
        }
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    #[inline]
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    #[inline]
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }
}

/// Batching and threading for bulk embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for EmbedOptions {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: 16,
            workers: 4,
        }
    }
}

/// Embed many texts in batches spread over worker threads
///
/// Results come back in input order. Any failing batch fails the whole call
/// and no partial output is returned.
#[inline]
pub fn embed_all<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    options: EmbedOptions,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Embedding>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = options.batch_size.max(1);
    let batches: Vec<&[String]> = texts.chunks(batch_size).collect();
    let workers = options.workers.clamp(1, batches.len());
    let batches_per_worker = batches.len().div_ceil(workers);

    debug!(
        "Embedding {} texts in {} batches across {} workers",
        texts.len(),
        batches.len(),
        workers
    );

    let per_worker: Vec<Result<Vec<Embedding>>> = thread::scope(|scope| {
        let handles: Vec<_> = batches
            .chunks(batches_per_worker)
            .map(|assigned| {
                scope.spawn(move || {
                    let mut embedded = Vec::new();
                    for batch in assigned {
                        let vectors = embedder.embed_batch(batch)?;
                        if vectors.len() != batch.len() {
                            return Err(RagError::EmbeddingService(format!(
                                "requested {} embeddings but received {}",
                                batch.len(),
                                vectors.len()
                            )));
                        }
                        embedded.extend(vectors);
                        if let Some(bar) = progress {
                            bar.inc(batch.len() as u64);
                        }
                    }
                    Ok(embedded)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(RagError::EmbeddingService(
                        "embedding worker panicked".to_string(),
                    ))
                })
            })
            .collect()
    });

    let mut embeddings = Vec::with_capacity(texts.len());
    for result in per_worker {
        embeddings.extend(result?);
    }

    Ok(embeddings)
}
