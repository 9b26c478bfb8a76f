use fieldmemo_protocol::{Classification, ControlType, FieldDescriptor, InstanceType, Scope};
use fieldmemo_store::{Bucket, MemoryRepository, StoreConfig, TieredCacheStore};
use serde_json::json;
use std::sync::Arc;

fn classified(mut field: FieldDescriptor, instance_type: InstanceType) -> FieldDescriptor {
    field
        .assign_classification(Classification {
            instance_type,
            scope: Scope::Global,
        })
        .unwrap();
    field
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_updates_are_not_lost() {
    let repo = Arc::new(MemoryRepository::new());
    let store = Arc::new(
        TieredCacheStore::open(repo.clone(), StoreConfig::default())
            .await
            .unwrap(),
    );
    let field = classified(
        FieldDescriptor::new("#skills")
            .with_label("Skills")
            .with_control(ControlType::Checkbox),
        InstanceType::AtomicMulti,
    );

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        let field = field.clone();
        handles.push(tokio::spawn(async move {
            store
                .update_multi_selection(&field, "Skills", json!(format!("skill-{i}")), true)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = repo.snapshot().await;
    let entry = &snapshot.atomic_multi["skills"];
    assert_eq!(entry.value.as_array().unwrap().len(), 32);
    assert_eq!(entry.use_count, 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scalar_writes_count_every_use() {
    let repo = Arc::new(MemoryRepository::new());
    let store = Arc::new(
        TieredCacheStore::open(repo.clone(), StoreConfig::default())
            .await
            .unwrap(),
    );
    let field = classified(
        FieldDescriptor::new("#city").with_label("City"),
        InstanceType::AtomicSingle,
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let field = field.clone();
            tokio::spawn(async move {
                store.write(&field, "", json!(format!("city-{i}"))).await.unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = repo.snapshot().await;
    assert_eq!(snapshot.atomic_single["city"].use_count, 16);
    assert_eq!(snapshot.total_entries(), 1);
    assert_eq!(snapshot.bucket(Bucket::AtomicMulti).len(), 0);
    let stats = store.stats().await.unwrap();
    assert!(stats.lock_wait_ms_max >= stats.lock_wait_ms_last);
}
