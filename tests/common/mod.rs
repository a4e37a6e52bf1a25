#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use rag_chatbot::config::Settings;
use rag_chatbot::services::embeddings::Embedder;
use rag_chatbot::services::llm::{ChatMessage, ChatModel, Completion, LlmError};
use rag_chatbot::services::vector_store::{LocalVectorStore, VectorStore};
use rag_chatbot::state::{AppState, SharedState};
use tempfile::TempDir;

pub const DIMS: usize = 32;

/// Bag-of-words embedding: texts sharing words end up close together.
pub struct FakeEmbedder;

pub fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
        v[bucket as usize % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| embed(t)).collect())
    }
}

/// Chat model that answers with a fixed text, or fails with a fixed error.
pub struct FakeChat {
    answer: String,
    failure: Option<(u16, String)>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            failure: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            answer: String::new(),
            failure: Some((status, message.to_string())),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Hold every completion for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, message)) = &self.failure {
            return Err(LlmError::Api { status: *status, message: message.clone() });
        }

        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if last.ends_with("Standalone question:") {
            let question = last
                .split("Follow Up Input: ")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            return Ok(Completion {
                content: format!("standalone: {question}"),
                prompt_tokens: Some(5),
                completion_tokens: Some(2),
            });
        }

        Ok(Completion {
            content: self.answer.clone(),
            prompt_tokens: Some(10),
            completion_tokens: Some(3),
        })
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub llm: Arc<FakeChat>,
    pub store: Arc<LocalVectorStore>,
    pub dir: TempDir,
}

pub fn settings(dir: &TempDir) -> Settings {
    let root = dir.path();
    let mut vars = HashMap::new();
    vars.insert("OPENAI_API_KEY", "sk-test".to_string());
    vars.insert("VECTOR_STORE_DIR", root.join("vectors").display().to_string());
    vars.insert("DOCUMENTS_DIR", root.join("documents").display().to_string());
    vars.insert("STATIC_DIR", root.join("public").display().to_string());
    vars.insert("RETRIEVER_K", "2".to_string());
    Settings::from_lookup(|k| vars.get(k).cloned()).unwrap()
}

pub async fn test_app(llm: FakeChat) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(&dir);
    std::fs::create_dir_all(&settings.static_dir).unwrap();
    std::fs::write(settings.static_dir.join("index.html"), "<html>chat</html>").unwrap();

    let llm = Arc::new(llm);
    let store = Arc::new(LocalVectorStore::open(&settings.vector_store_dir).await.unwrap());
    let state = AppState::with_components(
        settings,
        Arc::new(FakeEmbedder),
        llm.clone(),
        store.clone() as Arc<dyn VectorStore>,
    )
    .await
    .unwrap();

    TestApp { state: Arc::new(state), llm, store, dir }
}

pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn multipart_request(uri: &str, filename: &str, contents: &str, extra: &[(&str, &str)]) -> Request<Body> {
    let boundary = "XTESTBOUNDARY";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
    );
    for (name, value) in extra {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
