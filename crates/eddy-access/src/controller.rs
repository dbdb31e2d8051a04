//! The access-controller interface.

use cid::Cid;

use eddy_log::{Entry, IdentityProvider};
use eddy_storage::BlockStore;

use crate::error::AccessError;
use crate::manifest::ManifestParams;

/// Read-only view of the log an entry is being appended to.
///
/// Policy decisions may inspect existing entries, e.g. "writes are permitted
/// to members listed by entry X".
pub trait CanAppendContext: Send + Sync {
    /// The entries currently in the log.
    fn log_entries(&self) -> Vec<Entry>;
}

/// Authorizes candidate entries on append and sync.
///
/// `can_append` is consulted for every sync candidate and for every local
/// append. The save/load pair moves the controller's parameters through its
/// content-addressed manifest.
#[async_trait::async_trait]
pub trait AccessController: Send + Sync {
    /// Controller type tag, e.g. `"simple"`.
    fn controller_type(&self) -> &str;

    /// Address of the manifest this controller was loaded from, if any.
    fn address(&self) -> Option<Cid>;

    /// Decide whether `entry` may enter the log.
    fn can_append(
        &self,
        entry: &Entry,
        provider: &dyn IdentityProvider,
        context: &dyn CanAppendContext,
    ) -> Result<(), AccessError>;

    /// Serialize the controller's parameters for manifest creation.
    async fn save(&self, blocks: &dyn BlockStore) -> Result<ManifestParams, AccessError>;

    /// Initialize the controller from its manifest address.
    async fn load(
        &self,
        blocks: &dyn BlockStore,
        manifest_address: &Cid,
    ) -> Result<(), AccessError>;
}

/// A context over a fixed snapshot of entries.
///
/// Useful for tests and for admission checks against a sub-log being built.
pub struct SnapshotContext(pub Vec<Entry>);

impl CanAppendContext for SnapshotContext {
    fn log_entries(&self) -> Vec<Entry> {
        self.0.clone()
    }
}
