use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Generation service error: {0}")]
    GenerationService(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Stable label for the error category, suitable for user-facing output
    #[inline]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "SourceNotFound",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::DimensionMismatch(_) => "DimensionMismatch",
            Self::EmbeddingService(_) => "EmbeddingServiceError",
            Self::GenerationService(_) => "GenerationServiceError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
            Self::Other(_) => "Error",
        }
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod structured;

#[cfg(feature = "bench")]
pub mod internal {
    pub use crate::embeddings::hashed::HashedEmbedder;
    pub use crate::index::flat::FlatIndex;
    pub use crate::ingest::splitter::split;
}
