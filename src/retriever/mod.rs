
use tracing::debug;

use crate::Result;
use crate::embeddings::Embedder;
use crate::index::{RetrievalResult, VectorIndex};

/// Embeds queries and looks them up in an index
///
/// Holds only borrowed references; results borrow chunks from the index.
pub struct Retriever<'a, E: ?Sized, I: ?Sized> {
    embedder: &'a E,
    index: &'a I,
}

impl<E: ?Sized, I: ?Sized> Clone for Retriever<'_, E, I> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: ?Sized, I: ?Sized> Copy for Retriever<'_, E, I> {}

impl<'a, E, I> Retriever<'a, E, I>
where
    E: Embedder + ?Sized,
    I: VectorIndex + ?Sized,
{
    #[inline]
    pub const fn new(embedder: &'a E, index: &'a I) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` chunks for a free-text query
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult<'a>> {
        let index: &'a I = self.index;
        let query_vector = self.embedder.embed(query)?;
        let hits = index.search(&query_vector, k)?;

        debug!(
            "Retrieved {} of {} chunks for query ({} characters)",
            hits.len(),
            index.len(),
            query.chars().count()
        );

        Ok(hits)
    }
}
