use crate::embedding_service::Embedder;
use crate::error::{RagError, Result};
use crate::models::Chunk;
use rayon::prelude::*;
use std::cmp::Ordering;

/// A chunk and the vector it was embedded to, stored together so positions
/// can never drift apart.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

/// Exact nearest-neighbour index over squared Euclidean distance.
///
/// Built once from a bulk insert and never mutated afterwards. An index
/// always holds at least one entry; indexing zero chunks fails with
/// [`RagError::EmptyIndex`].
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Embeds `chunks` with the document task type and builds the index.
    pub async fn embed_and_build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;

        Self::build(chunks, vectors)
    }

    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if chunks.len() != vectors.len() {
            return Err(RagError::embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(RagError::embedding("backend returned an empty vector"));
        }

        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(RagError::embedding(format!(
                    "vector {} has dimension {}, expected {}",
                    position,
                    vector.len(),
                    dimension
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(RagError::embedding(format!(
                    "vector {} contains non-finite values",
                    position
                )));
            }
        }

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        log::info!("Indexed {} chunks of dimension {}", entries.len(), dimension);
        Ok(Self { dimension, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, position: usize) -> Option<&IndexedChunk> {
        self.entries.get(position)
    }

    /// The `k` nearest entries to `query`, nearest first. Equal distances
    /// keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RagError::embedding(format!(
                "query vector has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 || k > self.entries.len() {
            return Err(RagError::Retrieval {
                requested: k,
                available: self.entries.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .par_iter()
            .enumerate()
            .map(|(position, entry)| SearchHit {
                position,
                distance: squared_l2(&entry.vector, query),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
