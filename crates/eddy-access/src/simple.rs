//! Static allow-list access controller.

use std::sync::RwLock;

use cid::Cid;
use tracing::debug;

use eddy_log::{Entry, IdentityProvider};
use eddy_storage::BlockStore;

use crate::controller::{AccessController, CanAppendContext};
use crate::error::AccessError;
use crate::manifest::{resolve_manifest, ManifestParams};

/// Type tag of the allow-list controller.
pub const SIMPLE_CONTROLLER_TYPE: &str = "simple";

/// Capability name for appends.
pub const WRITE_CAPABILITY: &str = "write";

/// Wildcard identity granting a capability to everyone.
pub const WILDCARD: &str = "*";

/// Access controller with a static write allow-list.
///
/// An entry is admitted when its author's identity id appears in the `write`
/// capability, or when the list contains the wildcard `*`.
pub struct SimpleAccessController {
    state: RwLock<State>,
}

struct State {
    write: Vec<String>,
    address: Option<Cid>,
}

impl SimpleAccessController {
    /// Create a controller admitting the given identity ids.
    pub fn new(write: Vec<String>) -> Self {
        Self {
            state: RwLock::new(State {
                write,
                address: None,
            }),
        }
    }

    /// Create a controller from manifest parameters.
    pub fn from_params(params: &ManifestParams) -> Self {
        let controller = Self::new(params.get_access(WRITE_CAPABILITY).to_vec());
        if let Some(address) = params.address {
            controller.state.write().expect("lock poisoned").address = Some(address);
        }
        controller
    }

    /// The current write allow-list.
    pub fn write_list(&self) -> Vec<String> {
        self.state.read().expect("lock poisoned").write.clone()
    }
}

#[async_trait::async_trait]
impl AccessController for SimpleAccessController {
    fn controller_type(&self) -> &str {
        SIMPLE_CONTROLLER_TYPE
    }

    fn address(&self) -> Option<Cid> {
        self.state.read().expect("lock poisoned").address
    }

    fn can_append(
        &self,
        entry: &Entry,
        _provider: &dyn IdentityProvider,
        _context: &dyn CanAppendContext,
    ) -> Result<(), AccessError> {
        let state = self.state.read().expect("lock poisoned");
        let id = entry.identity.id.as_str();

        if state.write.iter().any(|w| w == id || w == WILDCARD) {
            return Ok(());
        }
        Err(AccessError::Unauthorized { id: id.to_string() })
    }

    async fn save(&self, _blocks: &dyn BlockStore) -> Result<ManifestParams, AccessError> {
        let state = self.state.read().expect("lock poisoned");
        let mut params = ManifestParams {
            address: state.address,
            ..Default::default()
        };
        params.set_access(WRITE_CAPABILITY, state.write.clone());
        Ok(params)
    }

    async fn load(
        &self,
        blocks: &dyn BlockStore,
        manifest_address: &Cid,
    ) -> Result<(), AccessError> {
        let manifest = resolve_manifest(blocks, manifest_address).await?;
        let write = manifest.params.get_access(WRITE_CAPABILITY).to_vec();

        let mut state = self.state.write().expect("lock poisoned");
        state.write = write;
        state.address = Some(*manifest_address);
        debug!(address = %manifest_address, grants = state.write.len(), "loaded allow-list");
        Ok(())
    }
}
