// src/routes/chat.rs
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{meta, session_cookie, session_id_from_headers};
use crate::{
    error::AppError,
    message::{ApiResponse, ChatAnswer, ChatParams, ChatRequest, Turn},
    services::{response_formatter::format_rag_response, session_manager::SessionManager},
    state::SharedState,
};

fn parse_request(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    if request.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }
    Ok(request)
}

fn failure(err: AppError, query: &str) -> Json<ApiResponse<ChatAnswer>> {
    if matches!(err, AppError::Internal(_)) {
        tracing::error!(error = %err, "chat request failed");
    }
    Json(ApiResponse::failure(err.to_body(), meta(json!({ "query": query }))))
}

/// Single-shot question answering without conversation memory.
pub async fn chat_handler(
    State(state): State<SharedState>,
    Query(params): Query<ChatParams>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ChatAnswer>>, AppError> {
    let request = parse_request(payload)?;
    let query = request.query.trim();
    tracing::info!(%query, "processing chat request");

    let result = match state.rag.answer_with_sources(query).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, kind = err.kind(), "chat request failed");
            return Ok(failure(err, query));
        }
    };

    let data = format_rag_response(result, true, params.evaluate_quality);
    tracing::info!(
        sources = data.sources.len(),
        processing_time = data.processing_time,
        "chat answer generated"
    );
    let meta = meta(json!({ "query": query, "total_sources": data.sources.len() }));
    Ok(Json(ApiResponse::ok(data, meta)))
}

/// Conversational answering. History comes from the request when given,
/// otherwise from the caller's server-side session.
pub async fn conversation_handler(
    State(state): State<SharedState>,
    Query(params): Query<ChatParams>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_request(payload)?;
    let query = request.query.trim().to_string();

    let (session_id, new_session) = match session_id_from_headers(&headers) {
        Some(id) => (id, false),
        None => (SessionManager::new_session_id(), true),
    };

    let (history, client_history) = match request.history {
        Some(history) if !history.is_empty() => (history, true),
        _ => (state.sessions.get_history(&session_id).await, false),
    };
    tracing::info!(%query, history_len = history.len(), "processing conversation request");

    let body = match state.rag.conversation_response(&query, &history).await {
        Ok(result) => {
            let raw_answer = result.answer.clone();
            let data = format_rag_response(result, true, params.evaluate_quality);
            let meta = meta(json!({
                "query": query,
                "total_sources": data.sources.len(),
                "history_length": history.len(),
            }));
            tracing::info!(
                sources = data.sources.len(),
                processing_time = data.processing_time,
                "conversation answer generated"
            );

            // A client-held history is authoritative. Otherwise append under
            // the session lock so concurrent turns on one cookie all land.
            let turn = Turn::new(query.clone(), raw_answer);
            if client_history {
                let mut updated = history;
                updated.push(turn);
                state.sessions.replace_history(&session_id, updated).await;
            } else {
                state.sessions.append_turn(&session_id, turn).await;
            }

            Json(ApiResponse::ok(data, meta))
        }
        Err(err) => {
            tracing::warn!(error = %err, kind = err.kind(), "conversation request failed");
            failure(err, &query)
        }
    };

    let mut response = body.into_response();
    if new_session {
        if let Some(cookie) = session_cookie(&session_id) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}
