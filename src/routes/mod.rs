// src/routes/mod.rs
pub mod chat;
pub mod documents;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderMap, HeaderValue, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::message::{ApiResponse, HealthStatus, Meta};
use crate::services::session_manager::{SESSION_COOKIE_NAME, SessionManager};
use crate::state::SharedState;
use chat::{chat_handler, conversation_handler};
use documents::{delete_document_handler, list_documents_handler, upload_document_handler};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn create_router(state: SharedState) -> Router {
    let static_files = ServeDir::new(&state.settings.static_dir);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/", post(chat_handler))
        .route("/chat/conversation", post(conversation_handler))
        .route("/documents", get(list_documents_handler).delete(delete_document_handler))
        .route("/documents/", get(list_documents_handler).delete(delete_document_handler))
        .route(
            "/documents/upload",
            post(upload_document_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/health", get(health_handler))
        .fallback_service(static_files)
        .layer(middleware::from_fn(session_cookie_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub async fn health_handler() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::ok(
        HealthStatus { status: "healthy", timestamp: Utc::now() },
        None,
    ))
}

/// Hand a session cookie to browsers loading the page without one.
async fn session_cookie_middleware(req: Request, next: Next) -> Response {
    let needs_cookie = matches!(req.uri().path(), "/" | "/index.html")
        && session_id_from_headers(req.headers()).is_none();

    let mut response = next.run(req).await;
    if needs_cookie && !response.headers().contains_key(header::SET_COOKIE) {
        if let Some(cookie) = session_cookie(&SessionManager::new_session_id()) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    response
}

pub(crate) fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty() && value.len() <= 128)
}

pub(crate) fn session_cookie(session_id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

pub(crate) fn meta(value: Value) -> Option<Meta> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_session_id_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; rag_session_id=abc-123; lang=en"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc-123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("rag_session_id="));
        assert_eq!(session_id_from_headers(&headers), None);
    }
}
