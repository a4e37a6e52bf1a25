mod common;

use std::time::Duration;

use axum::http::{StatusCode, header};
use common::{FakeChat, body_json, json_request, multipart_request, test_app};
use rag_chatbot::message::Turn;
use rag_chatbot::routes::create_router;
use rag_chatbot::services::vector_store::VectorStore;
use tower::util::ServiceExt;

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert!(body["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_conversation_success_sets_cookie_and_remembers_turn() {
    let app = test_app(FakeChat::answering("Hi!")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(json_request("POST", "/chat/conversation", r#"{"query": "hello", "history": []}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("rag_session_id="));
    assert!(cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["answer"], "Hi!");
    assert_eq!(body["meta"]["query"], "hello");
    assert_eq!(body["meta"]["history_length"], 0);

    let session_id = cookie
        .trim_start_matches("rag_session_id=")
        .split(';')
        .next()
        .unwrap();
    assert_eq!(
        app.state.sessions.get_history(session_id).await,
        vec![Turn::new("hello", "Hi!")]
    );
}

#[tokio::test]
async fn test_conversation_uses_server_memory_when_history_missing() {
    let app = test_app(FakeChat::answering("Second answer")).await;
    app.state
        .sessions
        .append_turn("known-session", Turn::new("first question", "first answer"))
        .await;
    let router = create_router(app.state.clone());

    let mut request = json_request("POST", "/chat/conversation", r#"{"query": "and then?"}"#);
    request
        .headers_mut()
        .insert(header::COOKIE, "rag_session_id=known-session".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();

    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["meta"]["history_length"], 1);

    // Condense call, then the answer call carrying the prior turn.
    assert_eq!(app.llm.call_count(), 2);
    let history = app.state.sessions.get_history("known-session").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], Turn::new("and then?", "Second answer"));
}

#[tokio::test]
async fn test_concurrent_turns_on_one_session_are_all_remembered() {
    let app = test_app(FakeChat::answering("ok").with_delay(Duration::from_millis(50))).await;
    let router = create_router(app.state.clone());

    let request = |query: &str| {
        let mut request = json_request(
            "POST",
            "/chat/conversation",
            &format!(r#"{{"query": "{query}"}}"#),
        );
        request
            .headers_mut()
            .insert(header::COOKIE, "rag_session_id=shared".parse().unwrap());
        request
    };

    let (first, second) = tokio::join!(
        router.clone().oneshot(request("one")),
        router.clone().oneshot(request("two")),
    );
    assert_eq!(body_json(first.unwrap()).await["success"], true);
    assert_eq!(body_json(second.unwrap()).await["success"], true);

    let mut queries: Vec<String> = app
        .state
        .sessions
        .get_history("shared")
        .await
        .into_iter()
        .map(|turn| turn.human)
        .collect();
    queries.sort();
    assert_eq!(queries, ["one", "two"]);
}

#[tokio::test]
async fn test_conversation_failure_leaves_memory_untouched() {
    let app = test_app(FakeChat::failing(429, "Rate limit reached for requests")).await;
    let router = create_router(app.state.clone());

    let mut request = json_request("POST", "/chat/conversation", r#"{"query": "bad", "history": []}"#);
    request
        .headers_mut()
        .insert(header::COOKIE, "rag_session_id=s1".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());
    assert_eq!(body["error"]["type"], "RateLimitError");
    assert_eq!(body["error"]["status_code"], 429);
    assert_eq!(body["meta"]["query"], "bad");
    assert!(app.state.sessions.get_history("s1").await.is_empty());
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(json_request("POST", "/chat/conversation", r#"{"query": "   "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(app.llm.call_count(), 0);
}

#[tokio::test]
async fn test_single_shot_chat_without_documents_reports_not_found() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(json_request("POST", "/chat/", r#"{"query": "what is rust?"}"#))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "DocumentNotFoundError");
    assert_eq!(body["error"]["status_code"], 404);
    assert_eq!(app.llm.call_count(), 0);
}

#[tokio::test]
async fn test_document_lifecycle_feeds_retrieval() {
    let app = test_app(FakeChat::answering("Rust is a systems programming language.")).await;
    let router = create_router(app.state.clone());

    let upload = multipart_request(
        "/documents/upload",
        "rust.txt",
        "Rust is a systems programming language focused on safety.",
        &[("description", "Intro"), ("metadata", r#"{"author": "Ferris"}"#)],
    );
    let response = router.clone().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["filename"], "rust.txt");
    assert_eq!(body["data"]["description"], "Intro");
    assert_eq!(body["data"]["metadata"]["author"], "Ferris");
    assert_eq!(body["data"]["chunks_count"], 1);
    let document_id = body["data"]["document_id"].as_str().unwrap().to_string();
    assert_eq!(app.store.count().await, 1);

    let response = router
        .clone()
        .oneshot(json_request("POST", "/chat/?evaluate_quality=true", r#"{"query": "What is Rust?"}"#))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["meta"]["total_sources"], 1);
    assert_eq!(body["data"]["sources"][0]["display_name"], "rust.txt");
    assert_eq!(body["data"]["prompt_tokens"], 10);
    assert!(body["data"]["quality_metrics"]["reliability_score"].is_number());

    let response = router
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .uri("/documents/")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["document_id"], document_id.as_str());

    let delete_body = format!(r#"{{"document_id": "{document_id}"}}"#);
    let response = router
        .clone()
        .oneshot(json_request("DELETE", "/documents/", &delete_body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
    assert_eq!(app.store.count().await, 0);

    let response = router
        .oneshot(json_request("DELETE", "/documents/", &delete_body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["type"], "DocumentNotFoundError");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_format() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(multipart_request("/documents/upload", "scan.pdf", "%PDF-1.7", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "InvalidFileFormatError");
    assert!(
        std::fs::read_dir(app.dir.path().join("documents"))
            .unwrap()
            .next()
            .is_none()
    );
}

#[tokio::test]
async fn test_upload_rejects_malformed_metadata() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(multipart_request("/documents/upload", "a.txt", "text", &[("metadata", "{not json")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn test_index_page_issues_session_cookie() {
    let app = test_app(FakeChat::answering("unused")).await;
    let router = create_router(app.state.clone());

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .uri("/")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get(header::SET_COOKIE).unwrap();
    assert!(cookie.to_str().unwrap().starts_with("rag_session_id="));
}
