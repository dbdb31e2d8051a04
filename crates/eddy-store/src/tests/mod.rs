//! Store-level tests, including the end-to-end replication scenarios.

mod store_tests;

use std::sync::Arc;
use std::time::Duration;

use eddy_access::{AccessController, SimpleAccessController};
use eddy_log::Keypair;
use eddy_pubsub::{MemPubSub, PubSub};
use eddy_storage::{MemBlockStore, MemDatastore};
use eddy_types::{Address, StoreOptions};

use crate::store::BaseStore;

const ROOT: &str = "bafyreieecvmpthaoyasxzhnew2d25uaebwldeokea2wigyq5wr4dwiaimi";

fn test_address(name: &str) -> Address {
    Address::parse(&format!("/eddy/{ROOT}/{name}")).unwrap()
}

fn test_keypair(seed: u8) -> Keypair {
    Keypair::from_bytes(&[seed; 32])
}

/// An allow-list admitting the seeded identities.
fn allow(seeds: &[u8]) -> Arc<dyn AccessController> {
    let ids = seeds
        .iter()
        .map(|s| test_keypair(*s).identity().id)
        .collect();
    Arc::new(SimpleAccessController::new(ids))
}

/// Open a store for the seeded identity.
///
/// `pubsub` attaches the store to a shared in-process router; without one
/// the store runs in local-only mode (`replicate` off).
async fn open_store(
    seed: u8,
    blocks: &MemBlockStore,
    datastore: Arc<MemDatastore>,
    pubsub: Option<&MemPubSub>,
    address: &Address,
    access: Option<Arc<dyn AccessController>>,
) -> Arc<BaseStore> {
    let keypair = test_keypair(seed);
    let options = StoreOptions {
        replicate: pubsub.is_some(),
        ..Default::default()
    };

    BaseStore::open(
        Arc::new(blocks.clone()),
        datastore,
        pubsub.map(|router| Arc::new(router.client()) as Arc<dyn PubSub>),
        Arc::new(keypair.clone()),
        keypair.identity(),
        address.clone(),
        access,
        options,
    )
    .await
    .unwrap()
}

/// Poll until `check` passes or the deadline expires.
async fn settle<F, Fut>(what: &str, timeout: Duration, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
