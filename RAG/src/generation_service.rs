use crate::backoff::{with_retry, RetryPolicy};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::models::*;
use async_trait::async_trait;
use reqwest::Client;

/// One completion request: a single user message plus sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion backend. Returns the completion text as produced.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Chat completions from Groq's OpenAI-compatible endpoint.
pub struct GenerationService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl GenerationService {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.groq_api_key.clone(),
            base_url: config.generation_base_url.trim_end_matches('/').to_string(),
            model: config.generation_model.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn chat_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn complete(&self, body: &ChatCompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RagError::generation("GROQ_API_KEY environment variable not set"))?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(RagError::generation_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("Generation API error ({}): {}", status, error_text);
            return Err(RagError::generation_status(status, &error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RagError::generation(format!("malformed response: {}", e)))?;

        extract_answer(completion)
    }
}

#[async_trait]
impl Generator for GenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.chat_request(request);
        log::debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            request.prompt.chars().count()
        );

        with_retry(&self.retry, "generation", || self.complete(&body)).await
    }
}

fn extract_answer(completion: ChatCompletionResponse) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RagError::generation("response contained no completion"))
}

/// Builds the grounded prompt and asks the generator for an answer.
#[derive(Debug, Clone)]
pub struct Responder {
    temperature: f32,
    max_tokens: u32,
}

impl Responder {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn build_prompt(&self, query: &str, context_chunks: &[String]) -> String {
        let context = context_chunks.join("\n\n");
        format!(
            "Answer the question based only on the following context:\n\n\
             {context}\n\n\
             Question: {query}\n\n\
             Provide a concise and accurate answer:"
        )
    }

    pub fn build_request(&self, query: &str, context_chunks: &[String]) -> GenerationRequest {
        GenerationRequest {
            prompt: self.build_prompt(query, context_chunks),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub async fn generate_response(
        &self,
        generator: &dyn Generator,
        query: &str,
        context_chunks: &[String],
    ) -> Result<String> {
        let request = self.build_request(query, context_chunks);
        generator.generate(&request).await
    }
}
