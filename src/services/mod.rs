// src/services/mod.rs
pub mod answer_enhancer;
pub mod document_service;
pub mod embeddings;
pub mod llm;
pub mod quality_evaluator;
pub mod rag;
pub mod response_formatter;
pub mod session_manager;
pub mod vector_store;
