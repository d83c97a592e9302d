use crate::error::{RagError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATION_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Settings for one pipeline invocation. Built once by the caller and passed
/// by reference to every stage.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_batch_size: usize,
    pub generation_model: String,
    pub generation_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub google_api_key: Option<String>,
    pub groq_api_key: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            embedding_model: "text-embedding-004".to_string(),
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            embedding_batch_size: 100,
            generation_model: "llama3-70b-8192".to_string(),
            generation_base_url: DEFAULT_GENERATION_BASE_URL.to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(60),
            max_retries: 0,
            google_api_key: None,
            groq_api_key: None,
        }
    }
}

impl RagConfig {
    /// Reads API keys and overrides from the process environment.
    ///
    /// Missing keys are left as `None`; the backends report them on first use.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.google_api_key = non_empty_var("GOOGLE_API_KEY");
        config.groq_api_key = non_empty_var("GROQ_API_KEY");

        if let Some(v) = parse_var::<usize>("RAG_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var::<usize>("RAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = parse_var::<usize>("RAG_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = non_empty_var("RAG_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = non_empty_var("RAG_GENERATION_MODEL") {
            config.generation_model = v;
        }
        if let Some(v) = non_empty_var("RAG_EMBEDDING_BASE_URL") {
            config.embedding_base_url = v;
        }
        if let Some(v) = non_empty_var("RAG_GENERATION_BASE_URL") {
            config.generation_base_url = v;
        }
        if let Some(secs) = parse_var::<u64>("RAG_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var::<u32>("RAG_MAX_RETRIES")? {
            config.max_retries = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::Config(format!(
                "temperature ({}) must be within [0, 2]",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RagError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}
