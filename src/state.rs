// src/state.rs
use std::sync::Arc;

use crate::config::Settings;
use crate::services::document_service::DocumentService;
use crate::services::embeddings::{Embedder, OpenAiEmbeddings};
use crate::services::llm::{ChatModel, OpenAiChat};
use crate::services::rag::RagService;
use crate::services::session_manager::SessionManager;
use crate::services::vector_store::{LocalVectorStore, VectorStore};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub settings: Settings,
    pub sessions: SessionManager,
    pub rag: RagService,
    pub documents: DocumentService,
}

impl AppState {
    /// Wire the OpenAI adapters and the on-disk vector store.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbeddings::from_settings(&settings));
        let llm: Arc<dyn ChatModel> = Arc::new(OpenAiChat::from_settings(&settings));
        let store: Arc<dyn VectorStore> =
            Arc::new(LocalVectorStore::open(&settings.vector_store_dir).await?);
        Ok(Self::with_components(settings, embedder, llm, store).await?)
    }

    pub async fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
    ) -> std::io::Result<Self> {
        let rag = RagService::new(embedder.clone(), llm, store.clone(), settings.retriever_k);
        let documents = DocumentService::open(&settings.documents_dir, embedder, store).await?;
        Ok(Self {
            sessions: SessionManager::new(settings.session_ttl),
            rag,
            documents,
            settings,
        })
    }
}
