// src/services/document_service.rs
//! Document ingestion: store the upload, extract text, chunk, embed, index.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use text_splitter::{ChunkConfig, MarkdownSplitter, TextSplitter};
use uuid::Uuid;

use super::embeddings::Embedder;
use super::vector_store::{StoredChunk, VectorStore};
use crate::error::AppError;
use crate::message::{DocumentInfo, Meta};

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "csv", "html"];

const SIDECAR_FILE: &str = "document.json";
const EMBED_BATCH: usize = 64;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr|/table|/title)\s*/?>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Persisted next to each uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentRecord {
    document_id: String,
    filename: String,
    description: Option<String>,
    metadata: Meta,
    created_at: DateTime<Utc>,
    chunks_count: usize,
}

/// A unit of extracted text plus metadata specific to it (e.g. a CSV row).
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub text: String,
    pub metadata: Meta,
}

#[derive(Clone)]
pub struct DocumentService {
    documents_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl DocumentService {
    pub async fn open(
        documents_dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> std::io::Result<Self> {
        let documents_dir = documents_dir.into();
        tokio::fs::create_dir_all(&documents_dir).await?;
        Ok(Self { documents_dir, embedder, store })
    }

    pub async fn process_document(
        &self,
        original_filename: &str,
        contents: &[u8],
        description: Option<String>,
        metadata: Meta,
    ) -> Result<DocumentInfo, AppError> {
        let filename = sanitize_filename(original_filename)
            .ok_or_else(|| AppError::BadRequest("A file name is required".to_string()))?;
        let extension = supported_extension(&filename)?;

        let document_id = Uuid::new_v4().to_string();
        let document_dir = self.documents_dir.join(&document_id);

        let result = self
            .ingest(&document_id, &document_dir, &filename, &extension, contents, description, metadata)
            .await;

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_dir_all(&document_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(error = %e, dir = %document_dir.display(), "failed to clean up document directory");
                }
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest(
        &self,
        document_id: &str,
        document_dir: &Path,
        filename: &str,
        extension: &str,
        contents: &[u8],
        description: Option<String>,
        mut metadata: Meta,
    ) -> Result<DocumentInfo, AppError> {
        tracing::info!(%document_id, %filename, bytes = contents.len(), "processing document");
        let io_err = |e: std::io::Error| AppError::DocumentProcessing(format!("Error while processing document: {e}"));

        tokio::fs::create_dir_all(document_dir).await.map_err(io_err)?;
        let target = document_dir.join(filename);
        tokio::fs::write(&target, contents).await.map_err(io_err)?;

        let created_at = Utc::now();
        metadata.insert("document_id".into(), Value::String(document_id.to_string()));
        metadata.insert("filename".into(), Value::String(filename.to_string()));
        metadata.insert(
            "description".into(),
            description.clone().map(Value::String).unwrap_or(Value::Null),
        );
        metadata.insert("source".into(), Value::String(target.to_string_lossy().into_owned()));
        metadata.insert("created_at".into(), Value::String(created_at.to_rfc3339()));

        let text = String::from_utf8_lossy(contents);
        let pages = load_pages(extension, &text)?;
        let texts = split_pages(extension, &pages)?;
        if texts.is_empty() {
            return Err(AppError::DocumentProcessing(
                "Error while processing document: no text could be extracted".to_string(),
            ));
        }
        tracing::info!(pages = pages.len(), chunks = texts.len(), "document split into chunks");

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let contents: Vec<String> = batch.iter().map(|(t, _)| t.clone()).collect();
            let vectors = self.embedder.embed_documents(&contents).await.map_err(|e| {
                AppError::DocumentProcessing(format!("Error while embedding document: {e}"))
            })?;
            embeddings.extend(vectors);
        }

        let chunks: Vec<StoredChunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, ((content, page_meta), embedding))| {
                let mut chunk_meta = metadata.clone();
                chunk_meta.extend(page_meta);
                chunk_meta.insert("chunk_index".into(), Value::from(i));
                StoredChunk {
                    id: Uuid::new_v4().to_string(),
                    document_id: document_id.to_string(),
                    content,
                    metadata: chunk_meta,
                    embedding,
                }
            })
            .collect();
        let chunks_count = chunks.len();

        self.store
            .add(chunks)
            .await
            .map_err(|e| AppError::DocumentProcessing(format!("Error while indexing document: {e}")))?;

        let record = DocumentRecord {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            description,
            metadata,
            created_at,
            chunks_count,
        };
        let sidecar = serde_json::to_vec_pretty(&record).map_err(AppError::internal)?;
        tokio::fs::write(document_dir.join(SIDECAR_FILE), sidecar)
            .await
            .map_err(io_err)?;

        tracing::info!(%document_id, chunks_count, "document indexed");
        Ok(record.into_info(None))
    }

    pub async fn get_all_documents(&self) -> Result<Vec<DocumentInfo>, AppError> {
        let list_err = |e: std::io::Error| AppError::DocumentProcessing(format!("Error while listing documents: {e}"));
        let mut entries = tokio::fs::read_dir(&self.documents_dir).await.map_err(list_err)?;

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match read_document(&path).await {
                Ok(Some(info)) => documents.push(info),
                Ok(None) => {}
                Err(e) => tracing::warn!(dir = %path.display(), error = %e, "skipping unreadable document"),
            }
        }
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }

    /// Remove a document and its indexed chunks. `Ok(false)` if unknown.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, AppError> {
        if Uuid::parse_str(document_id).is_err() {
            tracing::warn!(%document_id, "delete requested for malformed document id");
            return Ok(false);
        }
        let document_dir = self.documents_dir.join(document_id);
        if !tokio::fs::try_exists(&document_dir).await.unwrap_or(false) {
            tracing::warn!(%document_id, "document to delete not found");
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&document_dir)
            .await
            .map_err(|e| AppError::DocumentProcessing(format!("Error while deleting document: {e}")))?;
        let removed = self
            .store
            .delete_document(document_id)
            .await
            .map_err(|e| AppError::DocumentProcessing(format!("Error while deleting document: {e}")))?;

        tracing::info!(%document_id, removed_chunks = removed, "document deleted");
        Ok(true)
    }
}

impl DocumentRecord {
    fn into_info(self, updated_at: Option<DateTime<Utc>>) -> DocumentInfo {
        DocumentInfo {
            document_id: self.document_id,
            filename: self.filename,
            description: self.description,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at,
            chunks_count: self.chunks_count,
        }
    }
}

async fn read_document(dir: &Path) -> std::io::Result<Option<DocumentInfo>> {
    let sidecar = dir.join(SIDECAR_FILE);
    if let Ok(bytes) = tokio::fs::read(&sidecar).await {
        let record: DocumentRecord = serde_json::from_slice(&bytes)?;
        let updated_at = tokio::fs::metadata(&sidecar)
            .await?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        return Ok(Some(record.into_info(updated_at)));
    }

    // Directory without a sidecar: describe its first file.
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let stat = entry.metadata().await?;
        let modified = stat.modified().ok().map(DateTime::<Utc>::from);
        let created = stat.created().ok().map(DateTime::<Utc>::from).or(modified);
        let mut metadata = Meta::new();
        metadata.insert("source".into(), Value::String(path.to_string_lossy().into_owned()));
        return Ok(Some(DocumentInfo {
            document_id: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filename: entry.file_name().to_string_lossy().into_owned(),
            description: None,
            metadata,
            created_at: created.unwrap_or_else(Utc::now),
            updated_at: modified,
            chunks_count: 0,
        }));
    }
    Ok(None)
}

/// Strip any directory components a client may have sent.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn supported_extension(filename: &str) -> Result<String, AppError> {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        let supported: Vec<String> = SUPPORTED_EXTENSIONS.iter().map(|e| format!(".{e}")).collect();
        Err(AppError::InvalidFileFormat(format!(
            "Unsupported file format. Supported formats: {}",
            supported.join(", ")
        )))
    }
}

/// Extract text from a file's contents according to its extension.
pub fn load_pages(extension: &str, text: &str) -> Result<Vec<Page>, AppError> {
    Ok(match extension {
        "csv" => csv_rows(text).map_err(|e| {
            AppError::DocumentProcessing(format!("Error while reading CSV document: {e}"))
        })?,
        "html" => vec![Page { text: html_to_text(text), metadata: Meta::new() }],
        _ => vec![Page { text: text.to_string(), metadata: Meta::new() }],
    })
}

fn split_pages(extension: &str, pages: &[Page]) -> Result<Vec<(String, Meta)>, AppError> {
    let config = ChunkConfig::new(CHUNK_SIZE)
        .with_overlap(CHUNK_OVERLAP)
        .map_err(AppError::internal)?;

    let mut out = Vec::new();
    if extension == "md" {
        let splitter = MarkdownSplitter::new(config);
        for page in pages {
            out.extend(
                splitter
                    .chunks(&page.text)
                    .filter(|c| !c.trim().is_empty())
                    .map(|c| (c.to_string(), page.metadata.clone())),
            );
        }
    } else {
        let splitter = TextSplitter::new(config);
        for page in pages {
            out.extend(
                splitter
                    .chunks(&page.text)
                    .filter(|c| !c.trim().is_empty())
                    .map(|c| (c.to_string(), page.metadata.clone())),
            );
        }
    }
    Ok(out)
}

/// One page per data row, rendered as `header: value` lines.
fn csv_rows(text: &str) -> Result<Vec<Page>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    reader
        .records()
        .enumerate()
        .map(|(row, record)| {
            let record = record?;
            let body = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| format!("{h}: {v}"))
                .collect::<Vec<_>>()
                .join("\n");
            let mut metadata = Meta::new();
            metadata.insert("row".into(), Value::from(row));
            Ok(Page { text: body, metadata })
        })
        .collect()
}

pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = BLOCK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_LINES_RE
        .replace_all(lines.join("\n").trim(), "\n\n")
        .into_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
