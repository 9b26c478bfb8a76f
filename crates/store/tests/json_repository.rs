use fieldmemo_protocol::{Classification, FieldDescriptor, InstanceType, Scope};
use fieldmemo_store::{
    load_snapshot, Bucket, CacheRepository, JsonFileRepository, StoreConfig, TieredCacheStore,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn email_field() -> FieldDescriptor {
    let mut field = FieldDescriptor::new("#email").with_label("Email");
    field
        .assign_classification(Classification {
            instance_type: InstanceType::AtomicSingle,
            scope: Scope::Global,
        })
        .unwrap();
    field
}

#[tokio::test]
async fn values_survive_reopen() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("nested/cache.json");

    {
        let repo = Arc::new(JsonFileRepository::open(&path).await.unwrap());
        let store = TieredCacheStore::open(repo, StoreConfig::default()).await.unwrap();
        store
            .write(&email_field(), "", json!("me@example.com"))
            .await
            .unwrap();
    }

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let repo = Arc::new(JsonFileRepository::open(&path).await.unwrap());
    let store = TieredCacheStore::open(repo.clone(), StoreConfig::default())
        .await
        .unwrap();
    let hit = store.read(&email_field(), "").await.unwrap();
    assert_eq!(hit.value, json!("me@example.com"));

    let snapshot = load_snapshot(&path).await.unwrap().unwrap();
    assert_eq!(snapshot.metadata.total_entries, 1);
    assert!(snapshot.metadata.last_cleanup_ms > 0);
    assert_eq!(snapshot.atomic_single["email"].variants, vec!["Email"]);
    assert_eq!(repo.keys(Bucket::AtomicSingle).await.unwrap(), vec!["email"]);
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("cache.json");
    tokio::fs::write(&path, b"{ not json").await.unwrap();

    assert!(load_snapshot(&path).await.is_err());

    let repo = Arc::new(JsonFileRepository::open(&path).await.unwrap());
    assert_eq!(repo.metadata().await.unwrap().total_entries, 0);

    let store = TieredCacheStore::open(repo, StoreConfig::default()).await.unwrap();
    assert!(store.read(&email_field(), "").await.is_none());
    store.write(&email_field(), "", json!("x@y.z")).await.unwrap();
    assert!(load_snapshot(&path).await.unwrap().is_some());
}

#[tokio::test]
async fn future_snapshot_version_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("cache.json");
    tokio::fs::write(&path, br#"{"metadata": {"version": 99}}"#)
        .await
        .unwrap();

    let err = load_snapshot(&path).await.unwrap_err();
    assert!(err.to_string().contains("unsupported version 99"), "{err}");
}
