use crate::backoff::{with_retry, RetryPolicy};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::models::*;
use async_trait::async_trait;
use reqwest::Client;

/// A text embedding backend. Implementations return one vector per input,
/// in input order, all of the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeddings from the Gemini `text-embedding-*` models.
pub struct EmbeddingService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingService {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.google_api_key.clone(),
            base_url: config.embedding_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            batch_size: config.embedding_batch_size,
            retry: RetryPolicy::from_config(config),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::embedding("GOOGLE_API_KEY environment variable not set"))
    }

    fn model_name(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn content_request(&self, text: &str, task_type: TaskType) -> EmbedContentRequest {
        EmbedContentRequest {
            model: self.model_name(),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            task_type,
        }
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R>
    where
        B: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let api_key = self.api_key()?;
        let url = format!("{}/{}:{}", self.base_url, self.model_name(), method);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(RagError::embedding_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("Embedding API error ({}): {}", status, error_text);
            return Err(RagError::embedding_status(status, &error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| RagError::embedding(format!("malformed response: {}", e)))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.content_request(t, TaskType::RetrievalDocument))
                .collect(),
        };

        let response: BatchEmbedResponse = self.post("batchEmbedContents", &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        log::info!("Generating embeddings for {} chunks...", texts.len());

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = with_retry(&self.retry, "embedding batch", || self.embed_batch(batch)).await?;
            embeddings.extend(vectors);
        }

        log::debug!("Received {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.content_request(text, TaskType::RetrievalQuery);

        let response: EmbedContentResponse =
            with_retry(&self.retry, "query embedding", || self.post("embedContent", &request)).await?;

        Ok(response.embedding.values)
    }
}
