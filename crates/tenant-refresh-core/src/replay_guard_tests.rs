//! Tests for the processed-webhook ledger.

use super::*;
use crate::adapters::InMemoryKeyValueStore;
use serde_json::json;

fn guard() -> (ReplayGuard, InMemoryKeyValueStore) {
    let store = InMemoryKeyValueStore::new();
    (ReplayGuard::new(Arc::new(store.clone())), store)
}

#[tokio::test]
async fn test_unknown_id_has_not_been_processed() {
    let (guard, _store) = guard();
    let id = WebhookId::new("evt-1").unwrap();

    assert!(!guard.has_been_processed(&id).await.unwrap());
}

#[tokio::test]
async fn test_marked_id_has_been_processed() {
    let (guard, store) = guard();
    let id = WebhookId::new("evt-1").unwrap();

    guard.mark_processed(&id).await.unwrap();

    assert!(guard.has_been_processed(&id).await.unwrap());
    assert_eq!(
        store.get_item("webhook:processed:evt-1").await.unwrap(),
        Some(json!(true))
    );
}

#[tokio::test]
async fn test_markers_are_per_id() {
    let (guard, _store) = guard();
    guard
        .mark_processed(&WebhookId::new("evt-1").unwrap())
        .await
        .unwrap();

    assert!(!guard
        .has_been_processed(&WebhookId::new("evt-2").unwrap())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_marking_twice_is_harmless() {
    let (guard, store) = guard();
    let id = WebhookId::new("evt-1").unwrap();

    guard.mark_processed(&id).await.unwrap();
    guard.mark_processed(&id).await.unwrap();

    assert_eq!(store.len(), 1);
}
