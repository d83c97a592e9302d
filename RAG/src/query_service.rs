use crate::embedding_service::Embedder;
use crate::error::{RagError, Result};
use crate::generation_service::{Generator, Responder};
use crate::models::*;
use crate::vector_index::VectorIndex;
use std::sync::Arc;

/// Answers a question against a built index: embeds the query, pulls the
/// nearest chunks, and asks the generator with those chunks as context.
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    responder: Responder,
}

impl QueryService {
    pub fn new(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>, responder: Responder) -> Self {
        Self {
            embedder,
            generator,
            responder,
        }
    }

    /// The `k` chunks nearest to `query`, nearest first.
    ///
    /// `k` is not clamped: asking for more chunks than the index holds is a
    /// [`RagError::Retrieval`].
    pub async fn retrieve(&self, query: &str, index: &VectorIndex, k: usize) -> Result<Vec<RetrievedChunk>> {
        if index.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if k == 0 || k > index.len() {
            return Err(RagError::Retrieval {
                requested: k,
                available: index.len(),
            });
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        let hits = index.search(&query_embedding, k)?;

        let relevant_chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                index.get(hit.position).map(|entry| RetrievedChunk {
                    chunk: entry.chunk.clone(),
                    distance: hit.distance,
                })
            })
            .collect();

        log::info!("Found {} relevant chunks", relevant_chunks.len());
        Ok(relevant_chunks)
    }

    pub async fn respond(&self, query: &str, context: &[RetrievedChunk]) -> Result<String> {
        let context_chunks: Vec<String> = context.iter().map(|r| r.chunk.content.clone()).collect();
        self.responder
            .generate_response(self.generator.as_ref(), query, &context_chunks)
            .await
    }
}
