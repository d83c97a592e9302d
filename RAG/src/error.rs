use thiserror::Error;

/// Failures of a pipeline run, one variant per stage that can fail.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Failed to extract text from {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("Embedding backend error: {message}")]
    Embedding { message: String, transient: bool },

    #[error("No text could be extracted from the supplied documents")]
    EmptyIndex,

    #[error("Cannot retrieve {requested} chunks from an index of {available}")]
    Retrieval { requested: usize, available: usize },

    #[error("Generation backend error: {message}")]
    Generation { message: String, transient: bool },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn extraction(path: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        RagError::Embedding {
            message: message.into(),
            transient: false,
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        RagError::Generation {
            message: message.into(),
            transient: false,
        }
    }

    /// Maps a transport error from an embedding call, keeping timeouts and
    /// connection failures marked as transient.
    pub fn embedding_transport(err: reqwest::Error) -> Self {
        RagError::Embedding {
            transient: is_transient_transport(&err),
            message: err.to_string(),
        }
    }

    pub fn generation_transport(err: reqwest::Error) -> Self {
        RagError::Generation {
            transient: is_transient_transport(&err),
            message: err.to_string(),
        }
    }

    pub fn embedding_status(status: reqwest::StatusCode, body: &str) -> Self {
        RagError::Embedding {
            transient: is_transient_status(status),
            message: format!("HTTP {}: {}", status, body),
        }
    }

    pub fn generation_status(status: reqwest::StatusCode, body: &str) -> Self {
        RagError::Generation {
            transient: is_transient_status(status),
            message: format!("HTTP {}: {}", status, body),
        }
    }

    /// True for backend failures that may succeed when repeated. Validation,
    /// extraction and empty-index failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Embedding { transient, .. } | RagError::Generation { transient, .. } => {
                *transient
            }
            _ => false,
        }
    }

    /// The pipeline stage this error terminates.
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::Extraction { .. } => "extracting",
            RagError::Embedding { .. } | RagError::EmptyIndex => "indexing",
            RagError::Retrieval { .. } => "retrieving",
            RagError::Generation { .. } => "generating",
            RagError::Config(_) | RagError::Validation(_) => "idle",
        }
    }
}

fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
