use rag_chatbot::message::Turn;
use rag_chatbot::services::session_manager::SessionManager;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn basic_session_flow() {
    let mgr = SessionManager::new(Duration::from_secs(60));
    let sid = mgr.create_session().await;
    assert!(!sid.is_empty());
    let len = mgr.append_turn(&sid, Turn::new("hello", "Hi!")).await;
    assert_eq!(len, 1);
    let history = mgr.get_history(&sid).await;
    assert_eq!(history.len(), 1);
    assert!(mgr.remove_session(&sid).await);
}

#[tokio::test]
async fn test_session_expiration() {
    let mgr = SessionManager::new(Duration::from_millis(10));
    let sid = mgr.create_session().await;

    // Wait for expiration
    sleep(Duration::from_millis(20)).await;

    let removed_count = mgr.purge_expired().await;
    assert_eq!(removed_count, 1, "Should have removed 1 expired session");
    assert!(
        !mgr.remove_session(&sid).await,
        "Session should already be gone"
    );
}

#[tokio::test]
async fn test_activity_keeps_session_alive() {
    let mgr = SessionManager::new(Duration::from_millis(100));
    let idle = mgr.create_session().await;
    let active = mgr.create_session().await;

    sleep(Duration::from_millis(60)).await;
    mgr.append_turn(&active, Turn::new("still", "here")).await;
    sleep(Duration::from_millis(60)).await;

    assert_eq!(mgr.purge_expired().await, 1);
    assert!(mgr.get_history(&idle).await.is_empty());
    assert_eq!(mgr.get_history(&active).await.len(), 1);
    assert_eq!(mgr.len().await, 1);
}

#[tokio::test]
async fn test_replace_and_ensure() {
    let mgr = SessionManager::new(Duration::from_secs(60));
    assert_eq!(mgr.ensure_session("cookie-id").await, "cookie-id");
    assert!(mgr.get_history("cookie-id").await.is_empty());

    let turns = vec![Turn::new("a", "1"), Turn::new("b", "2")];
    mgr.replace_history("cookie-id", turns.clone()).await;
    assert_eq!(mgr.get_history("cookie-id").await, turns);

    // Ensuring an existing session keeps its history.
    mgr.ensure_session("cookie-id").await;
    assert_eq!(mgr.get_history("cookie-id").await.len(), 2);
}
