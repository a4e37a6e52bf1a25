// src/widget/transport.rs
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::message::{ApiResponse, ChatAnswer, ChatRequest};

pub const CONVERSATION_PATH: &str = "/chat/conversation";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Delivers one conversation request to the endpoint.
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ApiResponse<ChatAnswer>, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), CONVERSATION_PATH),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConversationTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ApiResponse<ChatAnswer>, TransportError> {
        let res = self.client.post(&self.url).json(request).send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;

        // Error statuses still carry the JSON envelope; only an unreadable
        // body counts as a transport failure.
        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::Malformed(format!("status {status}: {e}"))
        })
    }
}
