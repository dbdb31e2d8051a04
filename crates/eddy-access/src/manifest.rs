//! Content-addressed access-controller manifests.

use std::collections::BTreeMap;

use bytes::Bytes;
use cid::Cid;
use libipld::codec::Encode;
use libipld::prelude::Codec as _;
use libipld::{Ipld, IpldCodec};
use tracing::debug;

use eddy_storage::BlockStore;

use crate::error::AccessError;

/// Parameters carried by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestParams {
    /// Address of an already-existing manifest, when one is being reused.
    pub address: Option<Cid>,
    /// When set, no manifest block is written; `address` is used verbatim.
    pub skip_manifest: bool,
    /// Capability name → identity ids granted that capability.
    pub access: BTreeMap<String, Vec<String>>,
}

impl ManifestParams {
    /// Grant a capability to a list of identity ids.
    pub fn set_access(&mut self, capability: impl Into<String>, ids: Vec<String>) {
        self.access.insert(capability.into(), ids);
    }

    /// Identity ids granted the given capability.
    pub fn get_access(&self, capability: &str) -> &[String] {
        self.access.get(capability).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A content-addressed record parameterizing an access controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Controller type tag.
    pub controller_type: String,
    /// Controller parameters.
    pub params: ManifestParams,
}

/// Write a manifest block and return its CID.
pub async fn create_manifest(
    blocks: &dyn BlockStore,
    controller_type: &str,
    params: &ManifestParams,
) -> Result<Cid, AccessError> {
    let manifest = Manifest {
        controller_type: controller_type.to_string(),
        params: params.clone(),
    };
    let cid = blocks.put_block(Bytes::from(manifest.to_cbor()?)).await?;
    debug!(%cid, controller_type, "created access manifest");
    Ok(cid)
}

/// Fetch and decode a manifest by CID.
pub async fn resolve_manifest(
    blocks: &dyn BlockStore,
    address: &Cid,
) -> Result<Manifest, AccessError> {
    let block = blocks.get_block(address).await?;
    Manifest::from_cbor(&block)
}

impl Manifest {
    fn to_cbor(&self) -> Result<Vec<u8>, AccessError> {
        let mut access = BTreeMap::new();
        for (capability, ids) in &self.params.access {
            access.insert(
                capability.clone(),
                Ipld::List(ids.iter().map(|id| Ipld::String(id.clone())).collect()),
            );
        }

        let mut params = BTreeMap::new();
        if let Some(address) = self.params.address {
            params.insert("address".to_string(), Ipld::Link(address));
        }
        params.insert(
            "skip_manifest".to_string(),
            Ipld::Bool(self.params.skip_manifest),
        );
        params.insert("access".to_string(), Ipld::Map(access));

        let mut map = BTreeMap::new();
        map.insert("type".to_string(), Ipld::String(self.controller_type.clone()));
        map.insert("params".to_string(), Ipld::Map(params));

        let mut bytes = Vec::new();
        Ipld::Map(map)
            .encode(IpldCodec::DagCbor, &mut bytes)
            .map_err(|e| AccessError::InvalidManifest(e.to_string()))?;
        Ok(bytes)
    }

    fn from_cbor(bytes: &[u8]) -> Result<Self, AccessError> {
        let invalid = |msg: &str| AccessError::InvalidManifest(msg.to_string());

        let ipld: Ipld = IpldCodec::DagCbor
            .decode(bytes)
            .map_err(|e| AccessError::InvalidManifest(e.to_string()))?;
        let Ipld::Map(map) = ipld else {
            return Err(invalid("manifest is not a map"));
        };

        let controller_type = match map.get("type") {
            Some(Ipld::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(invalid("missing or empty controller type")),
        };

        let Some(Ipld::Map(params_map)) = map.get("params") else {
            return Err(invalid("missing params"));
        };

        let address = match params_map.get("address") {
            Some(Ipld::Link(cid)) => Some(*cid),
            None => None,
            _ => return Err(invalid("address is not a link")),
        };

        let skip_manifest = matches!(params_map.get("skip_manifest"), Some(Ipld::Bool(true)));

        let mut access = BTreeMap::new();
        if let Some(Ipld::Map(access_map)) = params_map.get("access") {
            for (capability, ids) in access_map {
                let Ipld::List(items) = ids else {
                    return Err(invalid("capability grant is not a list"));
                };
                let ids = items
                    .iter()
                    .map(|item| match item {
                        Ipld::String(s) => Ok(s.clone()),
                        _ => Err(invalid("identity id is not a string")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                access.insert(capability.clone(), ids);
            }
        }

        Ok(Self {
            controller_type,
            params: ManifestParams {
                address,
                skip_manifest,
                access,
            },
        })
    }
}
