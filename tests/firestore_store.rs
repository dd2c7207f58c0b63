mod common;

use lawassist::history::{ FirestoreHistoryStore, HistoryError, HistoryStore, TokenSource };
use lawassist::models::chat::{ ChatMessage, Role };

fn store(base: &str, token: TokenSource) -> FirestoreHistoryStore {
    FirestoreHistoryStore::new(
        base.to_string(),
        "demo".to_string(),
        "chat_history".to_string(),
        token
    ).unwrap()
}

#[tokio::test]
async fn append_list_and_delete_round_trip() {
    let (base, mock) = common::spawn_firestore().await;
    let store = store(&base, TokenSource::Static("id-token".into()));

    store.append(&ChatMessage::new("u1", Role::Assistant, "second", 2_000)).await.unwrap();
    store.append(&ChatMessage::new("u1", Role::User, "first", 1_000)).await.unwrap();
    store.append(&ChatMessage::new("u2", Role::User, "someone else", 1_500)).await.unwrap();

    let history = store.list("u1").await.unwrap();
    let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(history[0].user_id, "/users/u1");
    assert_eq!(history[0].timestamp, 1_000);

    assert_eq!(store.delete_all("/users/u1").await.unwrap(), 2);
    assert!(store.list("u1").await.unwrap().is_empty());
    assert_eq!(store.list("u2").await.unwrap().len(), 1);

    let mock = mock.lock().unwrap();
    assert!(!mock.auth_headers.is_empty());
    assert!(mock.auth_headers.iter().all(|h| h == "Bearer id-token"));
}

#[tokio::test]
async fn documents_are_written_with_typed_fields() {
    let (base, mock) = common::spawn_firestore().await;
    let store = store(&base, TokenSource::None);
    store.append(&ChatMessage::new("u9", Role::User, "Namaste", 1_700_000_000_000)).await.unwrap();

    let mock = mock.lock().unwrap();
    let fields = &mock.documents[0]["fields"];
    assert_eq!(fields["userId"]["stringValue"], "/users/u9");
    assert_eq!(fields["role"]["stringValue"], "user");
    assert_eq!(fields["timestamp"]["timestampValue"], "2023-11-14T22:13:20.000Z");
    assert!(mock.auth_headers.is_empty());
}

#[tokio::test]
async fn rejected_query_surfaces_status() {
    let (base, mock) = common::spawn_firestore().await;
    mock.lock().unwrap().fail_queries = true;
    let store = store(&base, TokenSource::None);

    let err = store.list("u1").await.unwrap_err();
    assert!(matches!(err, HistoryError::Status { status: 403, .. }));
    assert!(store.delete_all("u1").await.is_err());
}
