// src/routes/documents.rs
use axum::{
    Json,
    extract::{Multipart, State, rejection::JsonRejection},
};
use serde_json::{Value, json};

use super::meta;
use crate::{
    error::AppError,
    message::{ApiResponse, DeleteDocumentRequest, DocumentInfo, Meta},
    state::SharedState,
};

/// Multipart upload with fields `file`, `description` and `metadata` (JSON).
pub async fn upload_document_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<DocumentInfo>>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut description = None;
    let mut metadata = Meta::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("description") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    description = Some(text);
                }
            }
            Some("metadata") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    metadata = match serde_json::from_str::<Value>(&text) {
                        Ok(Value::Object(map)) => map,
                        _ => {
                            return Err(AppError::BadRequest(
                                "Invalid metadata format. It must be a valid JSON object string."
                                    .to_string(),
                            ));
                        }
                    };
                }
            }
            other => tracing::debug!(field = ?other, "ignoring unknown upload field"),
        }
    }

    let (filename, contents) =
        file.ok_or_else(|| AppError::BadRequest("A file field is required".to_string()))?;

    let info = state
        .documents
        .process_document(&filename, &contents, description, metadata)
        .await?;
    let meta = meta(json!({ "filename": filename }));
    Ok(Json(ApiResponse::ok(info, meta)))
}

pub async fn list_documents_handler(
    State(state): State<SharedState>,
) -> Result<Json<ApiResponse<Vec<DocumentInfo>>>, AppError> {
    let documents = state.documents.get_all_documents().await?;
    let meta = meta(json!({ "total": documents.len() }));
    Ok(Json(ApiResponse::ok(documents, meta)))
}

pub async fn delete_document_handler(
    State(state): State<SharedState>,
    payload: Result<Json<DeleteDocumentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if !state.documents.delete_document(&request.document_id).await? {
        return Err(AppError::DocumentNotFound(format!(
            "Document ID {} was not found",
            request.document_id
        )));
    }

    Ok(Json(ApiResponse {
        success: true,
        data: None,
        error: None,
        meta: meta(json!({
            "document_id": request.document_id,
            "message": "Document deleted successfully",
        })),
    }))
}
