use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use storyline_async::WatchAction;
use storyline_storage::keys;
use storyline_storage::{
    Intent, LinkPath, LinkUpdate, MemoryStore, ModulePath, ModuleRecord, StorageConfig,
    StorageError, Store, StoryStorage, WriterId,
};
use tokio::sync::mpsc;

fn storage_on(store: &Arc<MemoryStore>, label: &str) -> StoryStorage {
    StoryStorage::new(label, Arc::clone(store) as Arc<dyn Store>, StorageConfig::default())
}

fn record(name: &str, handler: &str) -> ModuleRecord {
    ModuleRecord::new(ModulePath::single(name), format!("app://{name}"), Intent::new(handler))
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification within bound")
        .expect("channel open")
}

#[tokio::test]
async fn peer_sees_module_writes() {
    let store = Arc::new(MemoryStore::new());
    let writer = storage_on(&store, "writer");
    let peer = storage_on(&store, "peer");

    let (tx, mut rx) = mpsc::unbounded_channel();
    peer.subscribe_module_record_updated(move |record| {
        let _ = tx.send(record.clone());
        WatchAction::Continue
    });

    writer.write_module_record(record("a", "h1")).await.unwrap();
    assert_eq!(recv(&mut rx).await, record("a", "h1"));

    let all = peer.read_all_module_records().await.unwrap();
    assert_eq!(all, vec![record("a", "h1")]);
}

#[tokio::test]
async fn identical_write_produces_no_notification() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");

    let (tx, mut rx) = mpsc::unbounded_channel();
    storage.subscribe_module_record_updated(move |record| {
        let _ = tx.send(record.intent.handler.clone());
        WatchAction::Continue
    });

    storage.write_module_record(record("a", "h1")).await.unwrap();
    storage.write_module_record(record("a", "h1")).await.unwrap();
    storage.write_module_record(record("a", "h2")).await.unwrap();

    assert_eq!(recv(&mut rx).await, "h1");
    assert_eq!(recv(&mut rx).await, "h2");
    assert!(storage.is_idle());
}

#[tokio::test]
async fn update_preserves_untouched_fields() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let path = ModulePath::single("a");
    storage
        .write_module_record(record("a", "h1").with_annotation("pinned", "yes"))
        .await
        .unwrap();

    storage
        .update_module_record(path.clone(), |current| {
            if let Some(record) = current {
                record.deleted = true;
            }
        })
        .await
        .unwrap();

    let stored = storage.read_module_record(&path).await.unwrap().unwrap();
    assert!(stored.is_deleted());
    assert_eq!(stored.annotations.get("pinned").map(String::as_str), Some("yes"));
}

#[tokio::test]
async fn update_creates_missing_record() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let path = ModulePath::single("fresh");

    storage
        .update_module_record(path.clone(), |current| {
            assert!(current.is_none());
            *current = Some(record("fresh", "h1"));
        })
        .await
        .unwrap();

    assert_eq!(
        storage.read_module_record(&path).await.unwrap(),
        Some(record("fresh", "h1"))
    );
}

async fn delete_in_place(storage: &StoryStorage, path: &ModulePath) {
    storage
        .update_module_record(path.clone(), |current| {
            if let Some(record) = current {
                record.deleted = true;
            }
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn replacing_a_deleted_record_keeps_the_tombstone() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let path = ModulePath::single("a");
    storage.write_module_record(record("a", "h1")).await.unwrap();
    delete_in_place(&storage, &path).await;

    storage
        .update_module_record(path.clone(), |current| {
            *current = Some(record("a", "h2"));
        })
        .await
        .unwrap();

    let stored = storage.read_module_record(&path).await.unwrap().unwrap();
    assert!(stored.is_deleted());
    assert_eq!(stored.intent, Intent::new("h2"));
}

#[tokio::test]
async fn clearing_the_flag_in_place_undeletes() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let path = ModulePath::single("a");
    storage.write_module_record(record("a", "h1")).await.unwrap();
    delete_in_place(&storage, &path).await;

    storage
        .update_module_record(path.clone(), |current| {
            if let Some(record) = current {
                record.deleted = false;
            }
        })
        .await
        .unwrap();

    let stored = storage.read_module_record(&path).await.unwrap().unwrap();
    assert!(!stored.is_deleted());
}

#[tokio::test]
async fn root_and_empty_segment_paths_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");

    let root = ModuleRecord::new(ModulePath::root(), "app://root", Intent::new("h"));
    assert!(matches!(
        storage.write_module_record(root).await,
        Err(StorageError::InvalidPath(_))
    ));
    let blank = ModuleRecord::new(ModulePath::single(""), "app://blank", Intent::new("h"));
    assert!(matches!(
        storage.write_module_record(blank.clone()).await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(matches!(
        storage
            .update_module_record(ModulePath::single(""), move |current| *current = Some(blank))
            .await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn link_updates_carry_writer_only_for_own_writes() {
    let store = Arc::new(MemoryStore::new());
    let local = storage_on(&store, "local");
    let peer = storage_on(&store, "peer");
    let link = LinkPath::new(ModulePath::single("a"), "selection");
    let me = WriterId::new();

    let (tx, mut rx) = mpsc::unbounded_channel::<LinkUpdate>();
    let local_tx = tx.clone();
    local.subscribe_link_value_updated(&link, move |update| {
        let _ = local_tx.send(update.clone());
        WatchAction::Continue
    });

    local
        .update_link_value(link.clone(), |value| *value = Some("1".into()), me)
        .await
        .unwrap();
    let own = recv(&mut rx).await;
    assert!(own.is_from(me));
    assert_eq!(own.value.as_deref(), Some("1"));

    peer.update_link_value(link.clone(), |value| *value = Some("2".into()), WriterId::new())
        .await
        .unwrap();
    let foreign = recv(&mut rx).await;
    assert_eq!(foreign.origin, None);
    assert_eq!(foreign.value.as_deref(), Some("2"));
}

#[tokio::test]
async fn link_value_mutation_and_removal() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let link = LinkPath::new(ModulePath::from(&["a", "b"][..]), "count");
    let writer = WriterId::new();

    for _ in 0..3 {
        storage
            .update_link_value(
                link.clone(),
                |value| {
                    let n: u32 = value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
                    *value = Some((n + 1).to_string());
                },
                writer,
            )
            .await
            .unwrap();
    }
    assert_eq!(storage.get_link_value(&link).await.unwrap().as_deref(), Some("3"));

    storage
        .update_link_value(link.clone(), |value| *value = None, writer)
        .await
        .unwrap();
    assert_eq!(storage.get_link_value(&link).await.unwrap(), None);
    assert_eq!(storage.pending_write_count(), 0);
}

#[tokio::test]
async fn entity_round_trip_and_type_checks() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");

    storage.set_entity_data("c1", "image/png", vec![1, 2, 3]).await.unwrap();
    assert_eq!(storage.get_entity_type("c1").await.unwrap(), "image/png");
    assert_eq!(
        storage.get_entity_data("c1", "image/png").await.unwrap(),
        vec![1, 2, 3]
    );

    let err = storage.get_entity_data("c1", "text/plain").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidType { ref found, .. } if found == "image/png"));

    let err = storage
        .set_entity_data("c1", "text/plain", vec![9])
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(
        storage.get_entity_data("c1", "image/png").await.unwrap(),
        vec![1, 2, 3]
    );

    assert!(matches!(
        storage.get_entity_data("unknown", "image/png").await,
        Err(StorageError::InvalidCookie(_))
    ));
}

#[tokio::test]
async fn failed_entity_batch_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    store.set_reject_commits(Some("offline".into()));

    let err = storage.set_entity_data("c1", "t", vec![1]).await.unwrap_err();
    assert!(matches!(err, StorageError::Store(_)));
    assert!(store.is_empty());
    assert_eq!(storage.pending_write_count(), 0);

    store.set_reject_commits(None);
    assert!(matches!(
        storage.get_entity_type("c1").await,
        Err(StorageError::InvalidCookie(_))
    ));
}

#[tokio::test]
async fn type_without_blob_is_a_copy_error() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    store
        .put(&keys::entity_type_key("c1"), b"t".to_vec())
        .await
        .unwrap();

    assert_eq!(
        storage.get_entity_data("c1", "t").await,
        Err(StorageError::Copy {
            cookie: "c1".to_string()
        })
    );
}

#[tokio::test]
async fn entity_watchers_get_matching_copies_until_stopped() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");

    let (tx, mut rx) = mpsc::unbounded_channel();
    storage.watch_entity("c1", "t", move |mut data| {
        data.push(0xff);
        let _ = tx.send(data);
        WatchAction::Stop
    });
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();
    storage.watch_entity("c1", "t", move |data| {
        let _ = other_tx.send(data);
        WatchAction::Continue
    });

    storage.set_entity_data("c1", "t", vec![1]).await.unwrap();
    assert_eq!(recv(&mut rx).await, vec![1, 0xff]);
    assert_eq!(recv(&mut other_rx).await, vec![1]);

    storage.set_entity_data("c1", "t", vec![2]).await.unwrap();
    assert_eq!(recv(&mut other_rx).await, vec![2]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn legacy_and_corrupt_records_on_read_all() {
    let store = Arc::new(MemoryStore::new());
    let storage = storage_on(&store, "story");
    let legacy = br#"{"version":1,"module_path":["old"],"module_url":"app://old",
        "module_source":"external","intent":{"handler":"h0"}}"#;
    store
        .put(&keys::module_key(&ModulePath::single("old")), legacy.to_vec())
        .await
        .unwrap();
    store
        .put(&keys::module_key(&ModulePath::single("zzz")), b"garbage".to_vec())
        .await
        .unwrap();

    let records = storage.read_all_module_records().await.unwrap();
    assert_eq!(records, vec![record("old", "h0")]);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_write_times_out() {
    let store = Arc::new(MemoryStore::new());
    let config = StorageConfig::default().with_write_timeout(Some(Duration::from_millis(50)));
    let storage = StoryStorage::new("story", Arc::clone(&store) as Arc<dyn Store>, config);
    store.set_notifications_muted(true);

    let err = storage.write_module_record(record("a", "h1")).await.unwrap_err();
    assert!(matches!(err, StorageError::WriteTimeout { timeout_ms: 50, .. }));
    assert_eq!(storage.pending_write_count(), 0);

    // The value still landed; only the confirmation was lost.
    let stored = storage.read_module_record(&ModulePath::single("a")).await.unwrap();
    assert_eq!(stored, Some(record("a", "h1")));
}
