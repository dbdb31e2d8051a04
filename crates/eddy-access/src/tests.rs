//! Access-control tests.

use std::sync::Arc;

use eddy_log::{Entry, Keypair};
use eddy_storage::{BlockStore, MemBlockStore};
use eddy_types::LamportClock;

use crate::controller::{AccessController, SnapshotContext};
use crate::error::AccessError;
use crate::manifest::{create_manifest, resolve_manifest, ManifestParams};
use crate::registry::Registry;
use crate::simple::{SimpleAccessController, SIMPLE_CONTROLLER_TYPE, WILDCARD, WRITE_CAPABILITY};

fn test_entry(seed: u8) -> (Keypair, Entry) {
    let keypair = Keypair::from_bytes(&[seed; 32]);
    let identity = keypair.identity();
    let entry = Entry::create(
        &keypair,
        &identity,
        "/eddy/test/log",
        b"payload".to_vec(),
        vec![],
        vec![],
        LamportClock::at(identity.pub_key.clone(), 1),
    )
    .unwrap();
    (keypair, entry)
}

#[test]
fn test_allow_list_admits_member() {
    let (keypair, entry) = test_entry(1);
    let controller = SimpleAccessController::new(vec![keypair.identity().id]);

    controller
        .can_append(&entry, &keypair, &SnapshotContext(vec![]))
        .unwrap();
}

#[test]
fn test_allow_list_rejects_stranger() {
    let (keypair, _) = test_entry(1);
    let (_, foreign_entry) = test_entry(2);
    let controller = SimpleAccessController::new(vec![keypair.identity().id]);

    let result = controller.can_append(&foreign_entry, &keypair, &SnapshotContext(vec![]));
    assert!(matches!(result, Err(AccessError::Unauthorized { .. })));
}

#[test]
fn test_wildcard_admits_everyone() {
    let (keypair, entry) = test_entry(1);
    let (_, foreign_entry) = test_entry(2);
    let controller = SimpleAccessController::new(vec![WILDCARD.to_string()]);

    controller
        .can_append(&entry, &keypair, &SnapshotContext(vec![]))
        .unwrap();
    controller
        .can_append(&foreign_entry, &keypair, &SnapshotContext(vec![]))
        .unwrap();
}

#[tokio::test]
async fn test_manifest_roundtrip() {
    let blocks = MemBlockStore::new();
    let mut params = ManifestParams::default();
    params.set_access(WRITE_CAPABILITY, vec!["alice".into(), "bob".into()]);

    let cid = create_manifest(&blocks, SIMPLE_CONTROLLER_TYPE, &params)
        .await
        .unwrap();
    let manifest = resolve_manifest(&blocks, &cid).await.unwrap();

    assert_eq!(manifest.controller_type, SIMPLE_CONTROLLER_TYPE);
    assert_eq!(
        manifest.params.get_access(WRITE_CAPABILITY),
        ["alice".to_string(), "bob".to_string()]
    );
}

#[tokio::test]
async fn test_registry_create_then_resolve() {
    let blocks = MemBlockStore::new();
    let registry = Registry::default();

    let mut params = ManifestParams::default();
    params.set_access(WRITE_CAPABILITY, vec!["carol".into()]);

    let address = registry
        .create(&blocks, SIMPLE_CONTROLLER_TYPE, &params)
        .await
        .unwrap();
    let controller = registry.resolve(&blocks, &address).await.unwrap();

    assert_eq!(controller.controller_type(), SIMPLE_CONTROLLER_TYPE);
    assert_eq!(controller.address(), Some(address));
}

#[tokio::test]
async fn test_registry_rejects_unknown_type() {
    let blocks = MemBlockStore::new();
    let registry = Registry::default();

    let result = registry
        .create(&blocks, "quorum", &ManifestParams::default())
        .await;
    assert!(matches!(result, Err(AccessError::UnknownType(_))));
}

#[tokio::test]
async fn test_skip_manifest_returns_address_verbatim() {
    let blocks = MemBlockStore::new();
    let registry = Registry::default();

    // Seed an arbitrary block to borrow a valid CID.
    let address = blocks
        .put_block(bytes::Bytes::from_static(b"\xa0"))
        .await
        .unwrap();

    let params = ManifestParams {
        address: Some(address),
        skip_manifest: true,
        ..Default::default()
    };

    let resolved = registry
        .create(&blocks, SIMPLE_CONTROLLER_TYPE, &params)
        .await
        .unwrap();
    assert_eq!(resolved, address);
}

#[tokio::test]
async fn test_controller_load_replaces_allow_list() {
    let blocks = MemBlockStore::new();

    let mut params = ManifestParams::default();
    params.set_access(WRITE_CAPABILITY, vec!["dave".into()]);
    let address = create_manifest(&blocks, SIMPLE_CONTROLLER_TYPE, &params)
        .await
        .unwrap();

    let controller = SimpleAccessController::new(vec!["someone-else".into()]);
    controller.load(&blocks, &address).await.unwrap();

    assert_eq!(controller.write_list(), vec!["dave".to_string()]);
    assert_eq!(controller.address(), Some(address));
}

#[test]
fn test_registry_is_cloneable_value() {
    let registry = Registry::default();
    let clone = registry.clone();
    assert!(clone.is_supported(SIMPLE_CONTROLLER_TYPE));

    let _boxed: Arc<Registry> = Arc::new(registry);
}
