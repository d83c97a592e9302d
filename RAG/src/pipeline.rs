use crate::config::RagConfig;
use crate::document_processor::DocumentProcessor;
use crate::embedding_service::{Embedder, EmbeddingService};
use crate::error::{RagError, Result};
use crate::generation_service::{GenerationService, Generator, Responder};
use crate::models::*;
use crate::query_service::QueryService;
use crate::text_splitter::TextSplitter;
use crate::vector_index::VectorIndex;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const MAX_DOCUMENTS: usize = 2;

/// Where a run is. Runs only move forward; `Failed` and `Done` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Extracting,
    Chunking,
    Indexing,
    Retrieving,
    Generating,
    Done,
    Failed(String),
}

impl Stage {
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Extracting),
            Stage::Extracting => Some(Stage::Chunking),
            Stage::Chunking => Some(Stage::Indexing),
            Stage::Indexing => Some(Stage::Retrieving),
            Stage::Retrieving => Some(Stage::Generating),
            Stage::Generating => Some(Stage::Done),
            Stage::Done | Stage::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Chunking => write!(f, "chunking"),
            Stage::Indexing => write!(f, "indexing"),
            Stage::Retrieving => write!(f, "retrieving"),
            Stage::Generating => write!(f, "generating"),
            Stage::Done => write!(f, "done"),
            Stage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// The outcome of one invocation together with every stage it passed
/// through.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub stages: Vec<Stage>,
    pub result: Result<Answer>,
}

impl PipelineRun {
    pub fn final_stage(&self) -> &Stage {
        self.stages.last().unwrap_or(&Stage::Idle)
    }
}

struct RunTracker {
    run_id: String,
    stages: Vec<Stage>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            stages: vec![Stage::Idle],
        }
    }

    fn current(&self) -> &Stage {
        self.stages.last().unwrap_or(&Stage::Idle)
    }

    fn advance(&mut self) {
        if let Some(next) = self.current().next() {
            log::info!("[{}] {} -> {}", self.run_id, self.current(), next);
            self.stages.push(next);
        }
    }

    fn fail(&mut self, err: &RagError) {
        if !self.current().is_terminal() {
            log::error!("[{}] failed while {}: {}", self.run_id, self.current(), err);
            self.stages.push(Stage::Failed(err.to_string()));
        }
    }
}

/// Rejects requests the pipeline should never start on. Checks run in the
/// order a user would fix them.
pub fn validate_request(pdf_paths: &[PathBuf], question: &str) -> Result<()> {
    if pdf_paths.is_empty() {
        return Err(RagError::Validation("Please upload at least one PDF file".to_string()));
    }
    if question.trim().is_empty() {
        return Err(RagError::Validation("Please enter a question".to_string()));
    }
    if pdf_paths.len() > MAX_DOCUMENTS {
        return Err(RagError::Validation(format!(
            "Please upload no more than {} PDF files",
            MAX_DOCUMENTS
        )));
    }
    Ok(())
}

/// Extract, chunk, index, retrieve and generate, from scratch on every call.
///
/// All supplied documents feed one shared index and produce one answer.
pub struct RagPipeline {
    config: RagConfig,
    processor: DocumentProcessor,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    query_service: QueryService,
}

impl RagPipeline {
    /// Pipeline against the configured Gemini and Groq backends.
    pub fn new(config: RagConfig) -> Result<Self> {
        let embedder = Arc::new(EmbeddingService::new(&config)?);
        let generator = Arc::new(GenerationService::new(&config)?);
        Self::with_backends(config, embedder, generator)
    }

    pub fn with_backends(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let query_service = QueryService::new(embedder.clone(), generator, Responder::new(&config));
        Ok(Self {
            splitter: TextSplitter::from_config(&config),
            processor: DocumentProcessor::new(),
            embedder,
            query_service,
            config,
        })
    }

    pub async fn run(&self, pdf_paths: &[PathBuf], question: &str) -> Result<Answer> {
        self.run_traced(pdf_paths, question).await.result
    }

    pub async fn run_traced(&self, pdf_paths: &[PathBuf], question: &str) -> PipelineRun {
        let mut tracker = RunTracker::new();
        let result = self.execute(pdf_paths, question, &mut tracker).await;

        match &result {
            Ok(_) => tracker.advance(),
            Err(err) => tracker.fail(err),
        }

        PipelineRun {
            run_id: tracker.run_id,
            stages: tracker.stages,
            result,
        }
    }

    async fn execute(&self, pdf_paths: &[PathBuf], question: &str, tracker: &mut RunTracker) -> Result<Answer> {
        let start_time = Instant::now();
        validate_request(pdf_paths, question)?;

        tracker.advance();
        let documents = self.extract(pdf_paths.to_vec()).await?;

        tracker.advance();
        let chunks = self.chunk(&documents);
        log::info!(
            "[{}] {} chunks from {} documents",
            tracker.run_id,
            chunks.len(),
            documents.len()
        );

        tracker.advance();
        let index = VectorIndex::embed_and_build(chunks, self.embedder.as_ref()).await?;

        tracker.advance();
        let k = self.config.top_k.min(index.len());
        if k < self.config.top_k {
            log::info!(
                "[{}] index holds {} chunks, retrieving {} instead of {}",
                tracker.run_id,
                index.len(),
                k,
                self.config.top_k
            );
        }
        let context = self.query_service.retrieve(question, &index, k).await?;

        tracker.advance();
        let text = self.query_service.respond(question, &context).await?;

        Ok(Answer {
            run_id: tracker.run_id.clone(),
            text,
            context,
            processing_time_ms: start_time.elapsed().as_millis(),
        })
    }

    async fn extract(&self, pdf_paths: Vec<PathBuf>) -> Result<Vec<Document>> {
        let processor = self.processor.clone();
        let display = describe(&pdf_paths);

        tokio::task::spawn_blocking(move || processor.process_documents(&pdf_paths))
            .await
            .map_err(|e| RagError::extraction(display, e.to_string()))?
    }

    fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .par_iter()
            .map(|document| self.splitter.split_document(document))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}

fn describe(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One-shot entry point with default settings and explicit credentials.
pub async fn run<P: AsRef<Path>>(
    pdf_paths: &[P],
    question: &str,
    google_api_key: &str,
    groq_api_key: &str,
) -> Result<String> {
    let config = RagConfig {
        google_api_key: Some(google_api_key.to_string()),
        groq_api_key: Some(groq_api_key.to_string()),
        ..RagConfig::default()
    };
    let paths: Vec<PathBuf> = pdf_paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let pipeline = RagPipeline::new(config)?;
    pipeline.run(&paths, question).await.map(|answer| answer.text)
}
