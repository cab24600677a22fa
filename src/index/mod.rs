//! Vector index abstractions and similarity scoring.
//!
//! [`VectorIndex`] is the seam callers search through; [`flat::FlatIndex`] is
//! the brute-force implementation.

pub mod flat;


use serde::Serialize;

use crate::Result;
use crate::ingest::Chunk;

pub use flat::FlatIndex;

/// A retrieved chunk and its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

/// Ranked hits, best first
pub type RetrievalResult<'a> = Vec<SearchHit<'a>>;

/// Read-only nearest-neighbour search over chunk embeddings
pub trait VectorIndex: Send + Sync {
    /// Number of stored chunks
    fn len(&self) -> usize;

    /// Dimensionality of stored vectors, `None` while the index is empty
    fn dimension(&self) -> Option<usize>;

    /// Up to `k` chunks most similar to `query`, sorted by descending score
    /// with ties broken by ascending chunk id
    fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult<'_>>;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity `a·b / (|a||b|)`; zero when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_product = l2_norm(a) * l2_norm(b);
    if norm_product == 0.0 {
        return 0.0;
    }
    (dot(a, b) / norm_product) as f32
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

pub(crate) fn l2_norm(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}
