
use super::{Embedder, Embedding};
use crate::{RagError, Result};

pub const DEFAULT_HASHED_DIMENSION: usize = 1024;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Offline embedder: lower-cased alphanumeric terms hashed into buckets
///
/// Deterministic across runs and platforms, so it doubles as a test double
/// for the remote embedding service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashedEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "hashed embedding dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            model_name: format!("hashed-bow-{dimension}"),
        })
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dimension];
        for term in terms(text) {
            let bucket = (fnv1a(&term) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for HashedEmbedder {
    #[inline]
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHED_DIMENSION,
            model_name: format!("hashed-bow-{DEFAULT_HASHED_DIMENSION}"),
        }
    }
}

impl Embedder for HashedEmbedder {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model_name
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(term: &str) -> u64 {
    term.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
