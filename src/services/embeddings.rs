// src/services/embeddings.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::llm::{LlmError, provider_error_message};
use crate::config::Settings;

/// Output size requested from text-embedding-3 models.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("empty embedding response".to_string()))
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        tracing::info!(model = %settings.embedding_model_name, "loading embedding model");
        Self::new(
            &settings.openai_base_url,
            settings.openai_api_key.clone(),
            settings.embedding_model_name.clone(),
        )
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
            "dimensions": EMBEDDING_DIMENSIONS,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = provider_error_message(res).await;
            return Err(LlmError::Api { status: status.as_u16(), message });
        }

        let mut payload: EmbeddingResponse = res.json().await?;
        if payload.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }
        // The API does not promise input order.
        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}
