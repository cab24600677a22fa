// Document ingestion
// Loads source text and cuts it into overlapping chunks for embedding

pub mod splitter;


use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ChunkingConfig;
use crate::{RagError, Result};

pub use splitter::split;

/// A bounded span of source text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk in ingestion order
    pub id: usize,
    pub text: String,
    /// Character offset of the chunk's first character in the source text
    pub source_offset: usize,
}

impl Chunk {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Read a UTF-8 source document
///
/// A missing path is reported as [`RagError::SourceNotFound`] rather than
/// producing an empty corpus.
#[inline]
pub fn load_source<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    debug!("Loading source document {}", path.display());

    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(RagError::SourceNotFound(path.to_path_buf()))
        }
        Err(e) => Err(RagError::Io(e)),
    }
}

/// Load a document and split it with the configured chunking parameters
#[inline]
pub fn ingest_file<P: AsRef<Path>>(path: P, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let raw = load_source(&path)?;
    let chunks = split(&raw, config.chunk_size, config.overlap)?;

    info!(
        "Ingested {} into {} chunks (chunk_size={}, overlap={})",
        path.as_ref().display(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}
