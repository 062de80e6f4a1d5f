#![allow(clippy::unwrap_used, clippy::expect_used)]

use conductor_core::{ConductorError, ConversationTurn};
use conductor_session::{ConversationRecord, ConversationStore, FileConversationStore};

/// Helper: create a FileConversationStore in a temp directory.
async fn temp_store() -> (FileConversationStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileConversationStore::new(tmp.path().join("conversations"))
        .await
        .unwrap();
    (store, tmp)
}

fn record(id: &str) -> ConversationRecord {
    ConversationRecord::new(
        id,
        "alice",
        vec![
            ConversationTurn::user("What is in report.docx?"),
            ConversationTurn::assistant("It is the Q3 budget report."),
        ],
    )
}

#[tokio::test]
async fn test_save_and_load() {
    let (store, _tmp) = temp_store().await;
    store.save(&record("conv-1")).await.unwrap();

    let loaded = store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(loaded.user_id, "alice");
    assert_eq!(loaded.turn_count(), 2);
    assert_eq!(loaded.turns[1].first_text(), Some("It is the Q3 budget report."));
}

#[tokio::test]
async fn test_load_missing_returns_none() {
    let (store, _tmp) = temp_store().await;
    assert!(store.load("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_overwrites() {
    let (store, _tmp) = temp_store().await;
    let mut rec = record("conv-2");
    store.save(&rec).await.unwrap();

    rec.turns.push(ConversationTurn::user("Thanks"));
    store.save(&rec).await.unwrap();

    let loaded = store.load("conv-2").await.unwrap().unwrap();
    assert_eq!(loaded.turn_count(), 3);
}

#[tokio::test]
async fn test_delete_and_list() {
    let (store, _tmp) = temp_store().await;
    store.save(&record("b")).await.unwrap();
    store.save(&record("a")).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);

    store.delete("a").await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec!["b"]);
    store.delete("a").await.unwrap();
}

#[tokio::test]
async fn test_rejects_path_like_ids() {
    let (store, _tmp) = temp_store().await;
    let err = store.save(&record("../escape")).await.unwrap_err();
    assert!(matches!(err, ConductorError::Persistence(_)));
    assert!(store.load("a/b").await.is_err());
}

#[test]
fn test_created_at_follows_first_turn() {
    let rec = record("c");
    assert_eq!(rec.created_at, rec.turns[0].timestamp);
    assert!(rec.updated_at >= rec.created_at);
}
