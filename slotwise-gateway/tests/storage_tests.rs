use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use slotwise_gateway::{
    AuthSession, FileStore, KeyValueStore, MemoryStore, SESSION_KEY, SessionStore,
};
use slotwise_types::PractitionerId;
use std::sync::Arc;

fn session(expires_in: Option<Duration>) -> AuthSession {
    AuthSession {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        user_id: PractitionerId::new(),
        expires_at: expires_in.map(|d| Utc::now() + d),
    }
}

// ── MemoryStore ──────────────────────────────────────────────────

#[tokio::test]
async fn memory_store_roundtrip() {
    let store = MemoryStore::new();
    assert_eq!(store.get_item("a").await.unwrap(), None);

    store.set_item("a", "1").await.unwrap();
    store.set_item("a", "2").await.unwrap();
    assert_eq!(store.get_item("a").await.unwrap().as_deref(), Some("2"));

    store.remove_item("a").await.unwrap();
    store.remove_item("a").await.unwrap();
    assert_eq!(store.get_item("a").await.unwrap(), None);
}

// ── FileStore ────────────────────────────────────────────────────

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");

    let store = FileStore::new(&path);
    assert_eq!(store.get_item("theme").await.unwrap(), None);
    store.set_item("theme", "dark").await.unwrap();
    store.set_item("locale", "en").await.unwrap();
    assert!(path.exists());

    let reopened = FileStore::new(&path);
    assert_eq!(reopened.get_item("theme").await.unwrap().as_deref(), Some("dark"));
    assert_eq!(reopened.get_item("locale").await.unwrap().as_deref(), Some("en"));

    reopened.remove_item("theme").await.unwrap();
    assert_eq!(store.get_item("theme").await.unwrap(), None);
    assert_eq!(store.get_item("locale").await.unwrap().as_deref(), Some("en"));
}

#[tokio::test]
async fn file_store_rejects_garbage_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(FileStore::new(&path).get_item("a").await.is_err());
}

#[tokio::test]
async fn empty_file_reads_as_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, "").unwrap();

    let store = FileStore::new(&path);
    assert_eq!(store.get_item("a").await.unwrap(), None);
    store.set_item("a", "1").await.unwrap();
    assert_eq!(store.get_item("a").await.unwrap().as_deref(), Some("1"));
}

// ── SessionStore ─────────────────────────────────────────────────

#[tokio::test]
async fn session_save_load_clear() {
    let sessions = SessionStore::in_memory();
    assert_eq!(sessions.load().await.unwrap(), None);

    let saved = session(Some(Duration::hours(1)));
    sessions.save(&saved).await.unwrap();
    assert_eq!(sessions.load().await.unwrap(), Some(saved.clone()));
    assert_eq!(sessions.current().await.unwrap(), Some(saved));

    sessions.clear().await.unwrap();
    assert_eq!(sessions.current().await.unwrap(), None);
}

#[tokio::test]
async fn expired_session_is_not_current() {
    let sessions = SessionStore::in_memory();
    let expired = session(Some(Duration::minutes(-5)));
    sessions.save(&expired).await.unwrap();

    assert_eq!(sessions.load().await.unwrap(), Some(expired));
    assert_eq!(sessions.current().await.unwrap(), None);
}

#[tokio::test]
async fn session_without_expiry_never_expires() {
    let forever = session(None);
    assert!(!forever.is_expired(Utc::now() + Duration::days(3650)));
}

#[tokio::test]
async fn corrupt_session_reads_as_signed_out() {
    let store = Arc::new(MemoryStore::new());
    store.set_item(SESSION_KEY, "{\"access_token\":").await.unwrap();

    let sessions = SessionStore::new(store);
    assert_eq!(sessions.load().await.unwrap(), None);
}

#[tokio::test]
async fn session_persists_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let saved = session(None);

    SessionStore::new(Arc::new(FileStore::new(&path)))
        .save(&saved)
        .await
        .unwrap();

    let reloaded = SessionStore::new(Arc::new(FileStore::new(&path)));
    assert_eq!(reloaded.current().await.unwrap(), Some(saved));
}
