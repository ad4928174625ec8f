//! # Record Store Tests
//!
//! Round-trips through the SQLite store: validation on insert, ordering,
//! the artifact-hash lookup, the insert watch channel and vector search.
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test --test store_test
//! ```

use chrono::{Duration, Utc};
use serde_json::json;

use session_hub::constants::NO_SPEECH_MARKER;
use session_hub::db::{create_test_pool_in_memory, create_test_pool_in_temporary_file};
use session_hub::error::StoreError;
use session_hub::gateway::GeminiGateway;
use session_hub::models::{
    Session, SessionSummary, SuggestedTask, TaskStatus, Thumbnail, WorkspaceService,
};
use session_hub::store::RecordStore;

fn sample_session(title: &str) -> Session {
    let summary = SessionSummary::from_value(&json!({
        "tldr": format!("{} summary", title),
        "key_points": ["one"],
        "topic": "Testing",
        "sentiment": "Informative",
    }));
    let embedding = GeminiGateway::stub_embedding(&summary.embedding_text());
    Session {
        id: "temp-uuid".to_string(),
        title: title.to_string(),
        source_url: "https://example.com".to_string(),
        duration_seconds: 60,
        transcript: "some words".to_string(),
        summary,
        video_url: None,
        has_video: false,
        summary_embedding: embedding,
        thumbnail: None,
        artifact_hash: None,
        created_at: Utc::now(),
    }
}

fn sample_task(title: &str) -> SuggestedTask {
    SuggestedTask {
        id: String::new(),
        title: title.to_string(),
        description: "do the thing".to_string(),
        service: Some(WorkspaceService::Calendar),
        action: Some("create_event".to_string()),
        params: Some(json!({"summary": title})),
        status: TaskStatus::Pending,
        created_at: Utc::now(),
        source_context: Some("https://example.com".to_string()),
    }
}

#[tokio::test]
async fn session_round_trip_preserves_all_fields() {
    let store = RecordStore::new(create_test_pool_in_memory().await);

    let mut session = sample_session("Round trip");
    session.set_video_url(Some("https://cdn.example/v.webm".to_string()));
    session.thumbnail = Some(Thumbnail {
        data: vec![1, 2, 3],
        mime_type: "image/png".to_string(),
    });
    session.artifact_hash = Some("abc123".to_string());

    let id = store.insert_session(&session).await.unwrap();
    assert!(id.starts_with("s_"));
    assert_ne!(id, session.id);

    let stored = store.find_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.title, "Round trip");
    assert_eq!(stored.summary, session.summary);
    assert_eq!(stored.summary_embedding, session.summary_embedding);
    assert_eq!(stored.thumbnail, session.thumbnail);
    assert_eq!(stored.artifact_hash.as_deref(), Some("abc123"));
    assert!(stored.has_video);
    assert_eq!(stored.video_url.as_deref(), Some("https://cdn.example/v.webm"));
}

#[tokio::test]
async fn insert_rejects_bad_embeddings_and_inconsistent_video_flags() {
    let store = RecordStore::new(create_test_pool_in_memory().await);

    let mut short_embedding = sample_session("bad");
    short_embedding.summary_embedding = vec![0.0; 10];
    assert!(matches!(
        store.insert_session(&short_embedding).await,
        Err(StoreError::InvalidRecord(_))
    ));

    let mut inconsistent = sample_session("bad");
    inconsistent.has_video = true; // no video_url set
    assert!(matches!(
        store.insert_session(&inconsistent).await,
        Err(StoreError::InvalidRecord(_))
    ));
}

#[tokio::test]
async fn sessions_list_newest_first() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let base = Utc::now();

    for (i, title) in ["oldest", "middle", "newest"].iter().enumerate() {
        let mut session = sample_session(title);
        session.created_at = base + Duration::seconds(i as i64);
        store.insert_session(&session).await.unwrap();
    }

    let listed = store.list_sessions(10).await.unwrap();
    let titles: Vec<&str> = listed.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["newest", "middle", "oldest"]);

    let limited = store.list_sessions(2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn artifact_hash_lookup_returns_the_latest_match() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let base = Utc::now();

    let mut first = sample_session("first");
    first.artifact_hash = Some("shared-hash".to_string());
    first.created_at = base;
    store.insert_session(&first).await.unwrap();

    let mut second = sample_session("second");
    second.artifact_hash = Some("shared-hash".to_string());
    second.created_at = base + Duration::seconds(5);
    store.insert_session(&second).await.unwrap();

    let found = store
        .find_session_by_artifact_hash("shared-hash")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.title, "second");

    assert!(store
        .find_session_by_artifact_hash("unknown")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn video_backfill_keeps_the_invariant() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let id = store.insert_session(&sample_session("video")).await.unwrap();

    assert!(store
        .update_session_video(&id, Some("https://cdn.example/v.mp4"))
        .await
        .unwrap());
    let with_video = store.find_session(&id).await.unwrap().unwrap();
    assert!(with_video.has_video);
    assert_eq!(with_video.video_url.as_deref(), Some("https://cdn.example/v.mp4"));

    assert!(store.update_session_video(&id, None).await.unwrap());
    let without = store.find_session(&id).await.unwrap().unwrap();
    assert!(!without.has_video);
    assert!(without.video_url.is_none());

    assert!(!store.update_session_video("s_missing", None).await.unwrap());
}

#[tokio::test]
async fn delete_session_reports_whether_a_row_existed() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let id = store.insert_session(&sample_session("gone")).await.unwrap();

    assert!(store.delete_session(&id).await.unwrap());
    assert!(store.find_session(&id).await.unwrap().is_none());
    assert!(!store.delete_session(&id).await.unwrap());
}

#[tokio::test]
async fn vector_search_ranks_by_similarity() {
    let store = RecordStore::new(create_test_pool_in_memory().await);

    let mut near = sample_session("near");
    near.summary_embedding = GeminiGateway::stub_embedding("kubernetes deployment tutorial");
    store.insert_session(&near).await.unwrap();

    let mut far = sample_session("far");
    far.summary_embedding = GeminiGateway::stub_embedding("sourdough bread recipe");
    store.insert_session(&far).await.unwrap();

    let query = GeminiGateway::stub_embedding("kubernetes deployment tutorial");
    let results = store.vector_search_sessions(&query, 1).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "near");

    // Wrong dimension never errors, it returns nothing
    assert!(store.vector_search_sessions(&[0.5; 3], 5).await.is_empty());
}

#[tokio::test]
async fn task_insert_assigns_id_and_notifies_the_watch_channel() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let mut watch = store.watch_task_inserts();

    let id = store.insert_task(&sample_task("Watchable")).await.unwrap();
    assert!(id.starts_with("t_"));

    let announced = watch.recv().await.unwrap();
    assert_eq!(announced.id, id);
    assert_eq!(announced.title, "Watchable");
}

#[tokio::test]
async fn task_listing_filters_by_status() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let a = store.insert_task(&sample_task("a")).await.unwrap();
    let b = store.insert_task(&sample_task("b")).await.unwrap();
    store.insert_task(&sample_task("c")).await.unwrap();

    store.update_task_status(&a, TaskStatus::Completed).await.unwrap();
    store.update_task_status(&b, TaskStatus::InProgress).await.unwrap();

    let pending = store.list_tasks(Some(TaskStatus::Pending), 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "c");

    // Open = pending + in_progress
    let open = store.list_open_tasks(10).await.unwrap();
    let titles: Vec<&str> = open.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"b"));
    assert!(titles.contains(&"c"));

    let all = store.list_tasks(None, 10).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn status_claim_succeeds_once_per_expected_state() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let id = store.insert_task(&sample_task("claimable")).await.unwrap();

    assert!(store
        .claim_task_status(&id, TaskStatus::Pending, TaskStatus::InProgress)
        .await
        .unwrap());
    // The row moved, so the same claim no longer matches
    assert!(!store
        .claim_task_status(&id, TaskStatus::Pending, TaskStatus::InProgress)
        .await
        .unwrap());

    let stored = store.find_task(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::InProgress);

    assert!(!store
        .claim_task_status("t_missing", TaskStatus::Pending, TaskStatus::InProgress)
        .await
        .unwrap());
}

#[tokio::test]
async fn task_round_trip_preserves_integration_fields() {
    let store = RecordStore::new(create_test_pool_in_memory().await);
    let id = store.insert_task(&sample_task("Calendar event")).await.unwrap();

    let stored = store.find_task(&id).await.unwrap().unwrap();
    assert_eq!(stored.service, Some(WorkspaceService::Calendar));
    assert_eq!(stored.action.as_deref(), Some("create_event"));
    assert_eq!(stored.params, Some(json!({"summary": "Calendar event"})));
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(stored.source_context.as_deref(), Some("https://example.com"));
}

#[tokio::test]
async fn file_backed_pool_works_like_the_in_memory_one() {
    let (pool, _guard) = create_test_pool_in_temporary_file().await.unwrap();
    let store = RecordStore::new(pool);

    let mut session = sample_session("on disk");
    session.transcript = NO_SPEECH_MARKER.to_string();
    let id = store.insert_session(&session).await.unwrap();

    let stored = store.find_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.transcript, NO_SPEECH_MARKER);
}
