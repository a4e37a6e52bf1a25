// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings, read from the process environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub log_level: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub host: String,
    pub port: u16,
    pub embedding_model_name: String,
    pub llm_model_name: String,
    pub vector_store_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub static_dir: PathBuf,
    pub retriever_k: usize,
    pub session_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            app_name: "RAG API".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            debug: match get("DEBUG") {
                Some(v) => parse_bool("DEBUG", &v)?,
                None => true,
            },
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_num("PORT", get("PORT"), 8000)?,
            embedding_model_name: get("EMBEDDING_MODEL_NAME")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            llm_model_name: get("LLM_MODEL_NAME").unwrap_or_else(|| "gpt-4o".to_string()),
            vector_store_dir: get("VECTOR_STORE_DIR")
                .unwrap_or_else(|| "./data/chroma_db".to_string())
                .into(),
            documents_dir: get("DOCUMENTS_DIR")
                .unwrap_or_else(|| "./data/documents".to_string())
                .into(),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "public".to_string()).into(),
            retriever_k: parse_num("RETRIEVER_K", get("RETRIEVER_K"), 3)?,
            session_ttl: Duration::from_secs(parse_num(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS"),
                3600,
            )?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default directive for the tracing `EnvFilter`.
    pub fn log_directive(&self) -> String {
        let level = self.log_level.to_lowercase();
        match level.as_str() {
            "critical" | "fatal" => "error".to_string(),
            "warning" => "warn".to_string(),
            "info" if self.debug => "debug".to_string(),
            _ => level,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: value.to_string() }),
    }
}

fn parse_num<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}
