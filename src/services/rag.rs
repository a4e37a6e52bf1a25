// src/services/rag.rs
//! Retrieval-augmented answering: retrieve chunks, stuff them into a prompt,
//! ask the chat model.

use std::sync::Arc;
use std::time::Instant;

use super::embeddings::Embedder;
use super::llm::{ChatMessage, ChatModel, Completion, LlmError};
use super::vector_store::{VectorStore, VectorStoreError};
use crate::error::AppError;
use crate::message::{SourceDocument, Turn};

const QA_PROMPT: &str = "Answer the question using the context below.

If the answer cannot be found in the context, say \"The provided context does not contain information about this question.\" and then give your best answer from what you know. Do not make answers up.

Write the answer in Markdown. Use headings, lists, code blocks, tables and emphasis where they help.

Context: {context}

Question: {question}

Answer (Markdown):";

const CONVERSATION_SYSTEM_PROMPT: &str = "You are an AI assistant that answers questions from documents.
Base your answers on the documents you are given.
Always answer in Markdown, using headings, lists, code blocks, tables and emphasis where they help.
If you do not know the answer or it is not in the documents, say so honestly.";

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

#[derive(Debug, Clone)]
pub struct RagResult {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
    pub processing_time: f64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Clone)]
pub struct RagService {
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn VectorStore>,
    retriever_k: usize,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
        retriever_k: usize,
    ) -> Self {
        tracing::info!(model = llm.model_name(), retriever_k, "RAG service initialised");
        Self { embedder, llm, store, retriever_k }
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<SourceDocument>, AppError> {
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(handle_llm_error)?;
        self.store
            .similarity_search(&embedding, self.retriever_k)
            .await
            .map_err(retrieval_error)
    }

    /// Single-shot question answering over the indexed documents.
    pub async fn answer_with_sources(&self, query: &str) -> Result<RagResult, AppError> {
        let started = Instant::now();

        let sources = self.retrieve(query).await?;
        if sources.is_empty() {
            return Err(AppError::DocumentNotFound(
                "No documents related to the question were found".to_string(),
            ));
        }

        let prompt = QA_PROMPT
            .replace("{context}", &stuff_context(&sources))
            .replace("{question}", query);
        let completion = self
            .llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(handle_llm_error)?;

        Ok(RagResult {
            answer: completion.content,
            sources,
            processing_time: started.elapsed().as_secs_f64(),
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
        })
    }

    /// Answer a follow-up question in the light of prior turns.
    pub async fn conversation_response(
        &self,
        query: &str,
        history: &[Turn],
    ) -> Result<RagResult, AppError> {
        let started = Instant::now();

        let mut usage = Completion::default();
        let standalone = if history.is_empty() {
            query.to_string()
        } else {
            let condensed = self.condense_question(query, history).await?;
            usage.prompt_tokens = condensed.prompt_tokens;
            usage.completion_tokens = condensed.completion_tokens;
            let question = condensed.content.trim();
            if question.is_empty() { query.to_string() } else { question.to_string() }
        };
        tracing::debug!(%standalone, "retrieving for standalone question");

        let sources = self.retrieve(&standalone).await?;

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage::system(format!(
            "{CONVERSATION_SYSTEM_PROMPT}\n\nDocuments:\n{}",
            stuff_context(&sources)
        )));
        for turn in history {
            messages.push(ChatMessage::user(turn.human.clone()));
            messages.push(ChatMessage::assistant(turn.ai.clone()));
        }
        messages.push(ChatMessage::user(standalone));

        let completion = self.llm.complete(&messages).await.map_err(handle_llm_error)?;

        Ok(RagResult {
            answer: completion.content,
            sources,
            processing_time: started.elapsed().as_secs_f64(),
            prompt_tokens: add_usage(usage.prompt_tokens, completion.prompt_tokens),
            completion_tokens: add_usage(usage.completion_tokens, completion.completion_tokens),
        })
    }

    async fn condense_question(&self, query: &str, history: &[Turn]) -> Result<Completion, AppError> {
        let transcript = history
            .iter()
            .map(|t| format!("Human: {}\nAssistant: {}", t.human, t.ai))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = CONDENSE_PROMPT
            .replace("{chat_history}", &transcript)
            .replace("{question}", query);
        self.llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(handle_llm_error)
    }
}

fn stuff_context(sources: &[SourceDocument]) -> String {
    sources
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn add_usage(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

fn retrieval_error(err: VectorStoreError) -> AppError {
    tracing::error!(error = %err, "retrieval failed");
    AppError::RagProcessing(format!("Unexpected error during retrieval: {err}"))
}

/// Map a provider failure onto the error the API reports.
pub fn handle_llm_error(err: LlmError) -> AppError {
    let text = err.to_string().to_lowercase();
    let status = match &err {
        LlmError::Api { status, .. } => Some(*status),
        _ => None,
    };

    if status == Some(429) || text.contains("rate limit") || text.contains("quota") {
        tracing::warn!(error = %err, "model provider rate limit");
        AppError::RateLimit("OpenAI API rate limit reached".to_string())
    } else if status == Some(401)
        || text.contains("invalid api key")
        || text.contains("authentication")
    {
        tracing::error!(error = %err, "model provider rejected credentials");
        AppError::LlmService("The OpenAI API key is invalid".to_string())
    } else {
        tracing::error!(error = %err, "model provider error");
        AppError::LlmService(format!("Error during LLM processing: {err}"))
    }
}
