use pdf_rag::{Answer, RetrievedChunk};
use serde::{Deserialize, Serialize};

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Deserialize, Serialize)]
pub struct RagResponse {
    pub status: String,
    pub answer: String,
    pub context_snippets: Vec<String>,
    pub citations: Vec<Citation>,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Citation {
    pub document: String,
    pub page: usize,
    pub text_excerpt: String,
    pub distance: f32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
        }
    }
}

impl From<Answer> for RagResponse {
    fn from(answer: Answer) -> Self {
        Self {
            status: "success".to_string(),
            context_snippets: answer.context.iter().map(|r| r.chunk.content.clone()).collect(),
            citations: answer.context.iter().map(Citation::from).collect(),
            answer: answer.text,
            processing_time_ms: answer.processing_time_ms,
        }
    }
}

impl From<&RetrievedChunk> for Citation {
    fn from(retrieved: &RetrievedChunk) -> Self {
        let content = &retrieved.chunk.content;
        let text_excerpt = if content.chars().count() > EXCERPT_CHARS {
            format!("{}...", content.chars().take(EXCERPT_CHARS).collect::<String>())
        } else {
            content.clone()
        };

        Self {
            document: retrieved.chunk.source.filename.clone(),
            page: retrieved.chunk.source.page,
            text_excerpt,
            distance: retrieved.distance,
        }
    }
}
