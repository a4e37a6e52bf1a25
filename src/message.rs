// src/message.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Meta = Map<String, Value>;

/// One answered exchange: the user's query and the assistant's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub human: String,
    pub ai: String,
}

impl Turn {
    pub fn new(human: impl Into<String>, ai: impl Into<String>) -> Self {
        Self { human: human.into(), ai: ai.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Turn>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    pub evaluate_quality: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub status_code: u16,
}

/// Envelope shared by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, meta: Option<Meta>) -> Self {
        Self { success: true, data: Some(data), error: None, meta }
    }

    pub fn failure(error: ErrorBody, meta: Option<Meta>) -> Self {
        Self { success: false, data: None, error: Some(error), meta }
    }
}

/// Retrieved chunk as produced by the RAG pipeline, before display formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: Meta,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattedSource {
    pub reference_id: usize,
    pub content: String,
    pub context: String,
    pub metadata: Meta,
    pub display_metadata: Meta,
    pub score: f32,
    pub snippet: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub document_id: String,
    pub document_name: Option<String>,
    pub page: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub reliability_score: f64,
    pub reliability_grade: String,
    pub citation_count: usize,
    pub answer_length: usize,
    pub num_sources: usize,
    pub quality_flags: Vec<String>,
}

/// Payload of both chat endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<FormattedSource>,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<QualityMetrics>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub filename: String,
    pub description: Option<String>,
    pub metadata: Meta,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub chunks_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    pub document_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}
