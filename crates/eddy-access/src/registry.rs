//! Explicit registry of access-controller types.
//!
//! The orchestrator constructs one registry at startup and threads it to
//! each store — there is no process-wide mutable map.

use std::collections::HashMap;
use std::sync::Arc;

use cid::Cid;

use eddy_storage::BlockStore;

use crate::controller::AccessController;
use crate::error::AccessError;
use crate::manifest::{create_manifest, resolve_manifest, ManifestParams};
use crate::simple::{SimpleAccessController, SIMPLE_CONTROLLER_TYPE};

/// Builds a controller instance from manifest parameters.
pub type ControllerConstructor =
    Arc<dyn Fn(&ManifestParams) -> Arc<dyn AccessController> + Send + Sync>;

/// Maps controller type tags to constructors.
#[derive(Clone)]
pub struct Registry {
    constructors: HashMap<String, ControllerConstructor>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a controller type. Replaces any previous constructor for
    /// the same tag.
    pub fn register(&mut self, controller_type: impl Into<String>, ctor: ControllerConstructor) {
        self.constructors.insert(controller_type.into(), ctor);
    }

    /// Whether a controller type is known.
    pub fn is_supported(&self, controller_type: &str) -> bool {
        self.constructors.contains_key(controller_type)
    }

    /// Create an access controller and return its manifest CID.
    ///
    /// With `skip_manifest` set, no block is written and the params'
    /// address is returned verbatim.
    pub async fn create(
        &self,
        blocks: &dyn BlockStore,
        controller_type: &str,
        params: &ManifestParams,
    ) -> Result<Cid, AccessError> {
        let ctor = self
            .constructors
            .get(controller_type)
            .ok_or_else(|| AccessError::UnknownType(controller_type.to_string()))?;

        if params.skip_manifest {
            return params
                .address
                .ok_or_else(|| AccessError::InvalidManifest("skip_manifest without address".into()));
        }

        let controller = ctor(params);
        let saved = controller.save(blocks).await?;
        create_manifest(blocks, controller_type, &saved).await
    }

    /// Resolve a controller from its manifest address.
    pub async fn resolve(
        &self,
        blocks: &dyn BlockStore,
        manifest_address: &Cid,
    ) -> Result<Arc<dyn AccessController>, AccessError> {
        let manifest = resolve_manifest(blocks, manifest_address).await?;

        let ctor = self
            .constructors
            .get(&manifest.controller_type)
            .ok_or_else(|| AccessError::UnknownType(manifest.controller_type.clone()))?;

        let controller = ctor(&manifest.params);
        controller.load(blocks, manifest_address).await?;
        Ok(controller)
    }
}

impl Default for Registry {
    /// A registry with the built-in `simple` controller.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(
            SIMPLE_CONTROLLER_TYPE,
            Arc::new(|params: &ManifestParams| {
                Arc::new(SimpleAccessController::from_params(params)) as Arc<dyn AccessController>
            }),
        );
        registry
    }
}
