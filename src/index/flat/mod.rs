
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{RetrievalResult, SearchHit, VectorIndex, dot, l2_norm};
use crate::embeddings::Embedding;
use crate::ingest::Chunk;
use crate::{RagError, Result};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Embedding,
    norm: f64,
}

/// Brute-force index: every search scores every stored chunk
///
/// Immutable once built, so it can be shared across threads and searched
/// concurrently without locking.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entries: BTreeMap<usize, IndexEntry>,
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    created_at: DateTime<Utc>,
    model: &'a str,
    dimension: Option<usize>,
    entries: Vec<SnapshotEntryRef<'a>>,
}

#[derive(Serialize)]
struct SnapshotEntryRef<'a> {
    chunk: &'a Chunk,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    created_at: DateTime<Utc>,
    model: String,
    dimension: Option<usize>,
    entries: Vec<SnapshotEntry>,
}

#[derive(Deserialize)]
struct SnapshotEntry {
    chunk: Chunk,
    embedding: Embedding,
}

impl FlatIndex {
    /// Build an index from chunks and their embeddings, paired by position
    ///
    /// Fails with [`RagError::DimensionMismatch`] when the sequences differ in
    /// length or the embeddings are not all the same length, and with
    /// [`RagError::EmbeddingService`] when an embedding holds NaN or infinity.
    #[inline]
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Embedding>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::DimensionMismatch(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len);
        let mut entries = BTreeMap::new();

        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if Some(embedding.len()) != dimension {
                return Err(RagError::DimensionMismatch(format!(
                    "chunk {} has {} dimensions, expected {}",
                    chunk.id,
                    embedding.len(),
                    dimension.unwrap_or_default()
                )));
            }

            ensure_finite(&embedding, || format!("embedding for chunk {}", chunk.id))?;

            let id = chunk.id;
            let norm = l2_norm(&embedding);
            if entries
                .insert(
                    id,
                    IndexEntry {
                        chunk,
                        embedding,
                        norm,
                    },
                )
                .is_some()
            {
                return Err(RagError::InvalidConfig(format!("duplicate chunk id {id}")));
            }
        }

        debug!(
            "Built flat index with {} entries ({:?} dimensions)",
            entries.len(),
            dimension
        );

        Ok(Self { entries, dimension })
    }

    /// Look up a stored chunk by id
    #[inline]
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.entries.get(&id).map(|entry| &entry.chunk)
    }

    /// Stored chunks in ascending id order
    #[inline]
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.values().map(|entry| &entry.chunk)
    }

    /// Write the index to a JSON snapshot tagged with the embedding model
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P, model: &str) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            model,
            dimension: self.dimension,
            entries: self
                .entries
                .values()
                .map(|entry| SnapshotEntryRef {
                    chunk: &entry.chunk,
                    embedding: &entry.embedding,
                })
                .collect(),
        };

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;

        info!(
            "Saved index snapshot with {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a snapshot written by [`FlatIndex::save`]
    ///
    /// The snapshot must have been built with `model`, since vectors from
    /// different embedding models are not comparable.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P, model: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::SourceNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(RagError::Io(e)),
        };

        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::InvalidConfig(format!(
                "unsupported index snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        if snapshot.model != model {
            return Err(RagError::InvalidConfig(format!(
                "index snapshot was built with embedding model '{}', not '{}'",
                snapshot.model, model
            )));
        }

        let (chunks, embeddings): (Vec<Chunk>, Vec<Embedding>) = snapshot
            .entries
            .into_iter()
            .map(|entry| (entry.chunk, entry.embedding))
            .unzip();
        let index = Self::build(chunks, embeddings)?;

        if snapshot.dimension != index.dimension {
            return Err(RagError::InvalidConfig(format!(
                "index snapshot declares {:?} dimensions but its entries have {:?}",
                snapshot.dimension, index.dimension
            )));
        }

        info!(
            "Loaded index snapshot from {} ({} entries, created {})",
            path.display(),
            index.len(),
            snapshot.created_at
        );
        Ok(index)
    }
}

impl VectorIndex for FlatIndex {
    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult<'_>> {
        if let Some(dimension) = self.dimension {
            if query.len() != dimension {
                return Err(RagError::DimensionMismatch(format!(
                    "query has {} dimensions, index has {}",
                    query.len(),
                    dimension
                )));
            }
        }

        ensure_finite(query, || "query embedding".to_string())?;

        let query_norm = l2_norm(query);
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .values()
            .map(|entry| {
                let norm_product = query_norm * entry.norm;
                let score = if norm_product == 0.0 {
                    0.0
                } else {
                    (dot(query, &entry.embedding) / norm_product) as f32
                };
                SearchHit {
                    chunk: &entry.chunk,
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);

        Ok(hits)
    }
}

fn ensure_finite(embedding: &[f32], what: impl FnOnce() -> String) -> Result<()> {
    if embedding.iter().all(|value| value.is_finite()) {
        Ok(())
    } else {
        Err(RagError::EmbeddingService(format!(
            "{} contains non-finite values",
            what()
        )))
    }
}
