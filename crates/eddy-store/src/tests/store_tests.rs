//! Basic store behavior: append, load, lifecycle, head cache.

use std::sync::Arc;

use eddy_log::Identity;
use eddy_storage::{MemBlockStore, MemDatastore};
use eddy_types::StoreOptions;

use super::{open_store, test_address, test_keypair};
use crate::error::StoreError;
use crate::events::{ReadyEvent, WriteEvent};
use crate::store::BaseStore;

#[tokio::test]
async fn test_open_requires_identity() {
    let blocks = MemBlockStore::new();
    let keypair = test_keypair(1);

    let result = BaseStore::open(
        Arc::new(blocks.clone()),
        Arc::new(MemDatastore::new()),
        None,
        Arc::new(keypair),
        Identity {
            id: String::new(),
            pub_key: Vec::new(),
            id_type: "eddy".into(),
        },
        test_address("identity-check"),
        None,
        StoreOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(StoreError::IdentityRequired)));
}

#[tokio::test]
async fn test_append_and_list() {
    let blocks = MemBlockStore::new();
    let address = test_address("append");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    store.append(b"one".to_vec()).await.unwrap();
    store.append(b"two".to_vec()).await.unwrap();

    let entries = store.list(-1).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].payload, b"one");
    assert_eq!(entries[1].payload, b"two");
}

#[tokio::test]
async fn test_list_amount_keeps_newest() {
    let blocks = MemBlockStore::new();
    let address = test_address("list-amount");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    for i in 0..5u8 {
        store.append(vec![i]).await.unwrap();
    }

    let entries = store.list(2).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].payload, vec![4]);
}

#[tokio::test]
async fn test_append_emits_write_event() {
    let blocks = MemBlockStore::new();
    let address = test_address("write-event");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    let mut events = store.events().subscribe::<WriteEvent>();
    let entry = store.append(b"payload".to_vec()).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.entry.hash, entry.hash);
    assert_eq!(event.heads.len(), 1);
    assert_eq!(event.address, address);
}

#[tokio::test]
async fn test_append_writes_entry_block() {
    let blocks = MemBlockStore::new();
    let address = test_address("block-write");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    let entry = store.append(b"stored".to_vec()).await.unwrap();

    use eddy_storage::BlockStore;
    let block = blocks.get_block(&entry.hash).await.unwrap();
    let decoded = eddy_log::Entry::from_block(&block).unwrap();
    assert_eq!(decoded.payload, b"stored");
}

#[tokio::test]
async fn test_heads_survive_reload() {
    let blocks = MemBlockStore::new();
    let datastore = Arc::new(MemDatastore::new());
    let address = test_address("reload");

    let store = open_store(1, &blocks, datastore.clone(), None, &address, None).await;
    for i in 0..3u8 {
        store.append(vec![i]).await.unwrap();
    }
    let heads_before = store.heads().await;
    drop(store);

    let reopened = open_store(1, &blocks, datastore, None, &address, None).await;
    assert!(reopened.is_empty().await, "fresh store starts empty");

    let mut ready = reopened.events().subscribe::<ReadyEvent>();
    reopened.load(-1).await.unwrap();

    let heads_after = reopened.heads().await;
    assert_eq!(heads_after, heads_before);
    assert_eq!(reopened.len().await, 3);

    let event = ready.recv().await.unwrap();
    assert_eq!(event.heads, heads_after);
}

#[tokio::test]
async fn test_load_with_amount_limits_history() {
    let blocks = MemBlockStore::new();
    let datastore = Arc::new(MemDatastore::new());
    let address = test_address("partial-load");

    let store = open_store(1, &blocks, datastore.clone(), None, &address, None).await;
    for i in 0..10u8 {
        store.append(vec![i]).await.unwrap();
    }
    drop(store);

    let reopened = open_store(1, &blocks, datastore, None, &address, None).await;
    reopened.load(4).await.unwrap();

    assert_eq!(reopened.len().await, 4, "load(4) fetches four entries");
    let entries = reopened.list(-1).await;
    assert_eq!(entries.last().unwrap().payload, vec![9], "newest survives");
}

#[tokio::test]
async fn test_load_on_empty_cache_is_benign() {
    let blocks = MemBlockStore::new();
    let address = test_address("empty-load");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    store.load(-1).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_closed_store_rejects_operations() {
    let blocks = MemBlockStore::new();
    let address = test_address("closed");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    store.close().await.unwrap();

    assert!(matches!(
        store.append(b"late".to_vec()).await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(store.sync(vec![]).await, Err(StoreError::Closed)));
    assert!(matches!(store.load(-1).await, Err(StoreError::Closed)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let blocks = MemBlockStore::new();
    let address = test_address("close-twice");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    store.close().await.unwrap();
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_close_resets_replication_status() {
    let blocks = MemBlockStore::new();
    let address = test_address("status-reset");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    store.append(b"x".to_vec()).await.unwrap();
    assert!(store.replication_status().progress > 0);

    store.close().await.unwrap();
    assert_eq!(store.replication_status().progress, 0);
    assert_eq!(store.replication_status().max, 0);
}

#[tokio::test]
async fn test_progress_and_max_track_appends() {
    let blocks = MemBlockStore::new();
    let address = test_address("status");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    let mut last_progress = 0;
    for i in 0..5u8 {
        store.append(vec![i]).await.unwrap();
        let status = store.replication_status();
        assert!(status.progress >= last_progress, "progress is monotonic");
        assert!(status.progress <= status.max, "progress never exceeds max");
        last_progress = status.progress;
    }
    assert_eq!(store.replication_status().progress, 5);
}

#[tokio::test]
async fn test_default_controller_admits_only_owner() {
    let blocks = MemBlockStore::new();
    let address = test_address("default-ac");
    let store = open_store(1, &blocks, Arc::new(MemDatastore::new()), None, &address, None).await;

    // Default controller admits the opening identity.
    store.append(b"mine".to_vec()).await.unwrap();

    // A foreign head is silently dropped by sync.
    let foreign = test_keypair(2);
    let mut foreign_log = eddy_log::Log::new(address.to_string(), foreign.identity());
    let entry = foreign_log.append(&foreign, b"theirs".to_vec(), 0).unwrap();

    store.sync(vec![entry]).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let entries = store.list(-1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, b"mine");
}
