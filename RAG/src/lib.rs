pub mod backoff;
pub mod config;
pub mod document_processor;
pub mod embedding_service;
pub mod error;
pub mod generation_service;
pub mod models;
pub mod pipeline;
pub mod query_service;
pub mod text_splitter;
pub mod vector_index;

pub use config::RagConfig;
pub use document_processor::DocumentProcessor;
pub use embedding_service::{Embedder, EmbeddingService};
pub use error::{RagError, Result};
pub use generation_service::{GenerationRequest, GenerationService, Generator, Responder};
pub use models::*;
pub use pipeline::{run, validate_request, PipelineRun, RagPipeline, Stage, MAX_DOCUMENTS};
pub use query_service::QueryService;
pub use text_splitter::TextSplitter;
pub use vector_index::{IndexedChunk, SearchHit, VectorIndex};
