//! Log entries: canonical encoding, signing, content addressing.

use std::collections::BTreeMap;

use bytes::Bytes;
use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use libipld::codec::Encode;
use libipld::prelude::Codec as _;
use libipld::{Ipld, IpldCodec};
use serde::{Deserialize, Serialize};

use eddy_types::LamportClock;

use crate::error::LogError;
use crate::identity::{Identity, IdentityProvider};

/// Current entry format version.
pub const ENTRY_FORMAT_VERSION: u64 = 2;

/// A single immutable entry in the log DAG.
///
/// `next` holds the direct causal predecessors (the heads at append time);
/// `refs` holds skip-list shortcuts deeper into history for faster
/// traversal. The signature covers the canonical dag-cbor encoding of the
/// signed fields; the hash is the CID of the full dag-cbor block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier of the log this entry belongs to.
    pub id: String,
    /// Opaque application payload.
    pub payload: Vec<u8>,
    /// Hashes of the direct causal predecessors. An absent field
    /// normalizes to the empty set.
    #[serde(default, with = "cid_vec_serde")]
    pub next: Vec<Cid>,
    /// Skip-list shortcut hashes.
    #[serde(default, with = "cid_vec_serde")]
    pub refs: Vec<Cid>,
    /// Causal clock of the author.
    pub clock: LamportClock,
    /// Entry format version.
    pub v: u64,
    /// Public key the signature verifies against.
    pub key: Vec<u8>,
    /// Signer identity descriptor.
    pub identity: Identity,
    /// Signature over the canonical encoding of the signed fields.
    pub sig: Vec<u8>,
    /// CID of the entry's dag-cbor block. Derived, not part of the block.
    #[serde(with = "cid_serde")]
    pub hash: Cid,
}

impl Entry {
    /// Create, sign and hash a new entry.
    pub fn create(
        provider: &dyn IdentityProvider,
        identity: &Identity,
        id: &str,
        payload: Vec<u8>,
        next: Vec<Cid>,
        refs: Vec<Cid>,
        clock: LamportClock,
    ) -> Result<Self, LogError> {
        let mut entry = Self {
            id: id.to_string(),
            payload,
            next,
            refs,
            clock,
            v: ENTRY_FORMAT_VERSION,
            key: identity.pub_key.clone(),
            identity: identity.clone(),
            sig: Vec::new(),
            hash: block_cid(&[]),
        };

        entry.sig = provider.sign(identity, &entry.signing_bytes()?)?;
        entry.hash = block_cid(&entry.to_block()?);
        Ok(entry)
    }

    /// Canonical dag-cbor bytes of the signed fields (everything except
    /// `key`, `identity`, `sig` and the derived `hash`).
    pub fn signing_bytes(&self) -> Result<Vec<u8>, LogError> {
        let mut map = self.base_map();
        map.remove("key");
        map.remove("identity");
        map.remove("sig");
        encode_cbor(&Ipld::Map(map))
    }

    /// Canonical dag-cbor block written to the object store.
    pub fn to_block(&self) -> Result<Bytes, LogError> {
        Ok(Bytes::from(encode_cbor(&Ipld::Map(self.base_map()))?))
    }

    /// Recompute the entry's content hash from its fields.
    pub fn compute_hash(&self) -> Result<Cid, LogError> {
        Ok(block_cid(&self.to_block()?))
    }

    /// Decode an entry from its dag-cbor block, deriving the hash from the
    /// block bytes.
    pub fn from_block(bytes: &[u8]) -> Result<Self, LogError> {
        let ipld: Ipld = IpldCodec::DagCbor
            .decode(bytes)
            .map_err(LogError::encoding)?;
        let mut entry = Self::from_ipld(&ipld)?;
        entry.hash = block_cid(bytes);
        Ok(entry)
    }

    /// Verify the signature against the entry's own key.
    pub fn verify(&self, provider: &dyn IdentityProvider) -> Result<(), LogError> {
        provider.verify(&self.sig, &self.key, &self.signing_bytes()?)
    }

    /// Check that the declared hash matches the canonical encoding.
    pub fn verify_hash(&self) -> Result<(), LogError> {
        let computed = self.compute_hash()?;
        if computed != self.hash {
            return Err(LogError::TamperedEntry {
                declared: self.hash,
                computed,
            });
        }
        Ok(())
    }

    /// Whether this entry is a root (no causal predecessors).
    pub fn is_root(&self) -> bool {
        self.next.is_empty()
    }

    // ----- dag-cbor mapping -----

    fn base_map(&self) -> BTreeMap<String, Ipld> {
        let mut clock = BTreeMap::new();
        clock.insert("id".to_string(), Ipld::Bytes(self.clock.id.clone()));
        clock.insert("time".to_string(), Ipld::Integer(self.clock.time as i128));

        let mut identity = BTreeMap::new();
        identity.insert("id".to_string(), Ipld::String(self.identity.id.clone()));
        identity.insert(
            "pub_key".to_string(),
            Ipld::Bytes(self.identity.pub_key.clone()),
        );
        identity.insert(
            "type".to_string(),
            Ipld::String(self.identity.id_type.clone()),
        );

        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Ipld::String(self.id.clone()));
        map.insert("payload".to_string(), Ipld::Bytes(self.payload.clone()));
        map.insert(
            "next".to_string(),
            Ipld::List(self.next.iter().map(|c| Ipld::Link(*c)).collect()),
        );
        map.insert(
            "refs".to_string(),
            Ipld::List(self.refs.iter().map(|c| Ipld::Link(*c)).collect()),
        );
        map.insert("clock".to_string(), Ipld::Map(clock));
        map.insert("v".to_string(), Ipld::Integer(self.v as i128));
        map.insert("key".to_string(), Ipld::Bytes(self.key.clone()));
        map.insert("identity".to_string(), Ipld::Map(identity));
        map.insert("sig".to_string(), Ipld::Bytes(self.sig.clone()));
        map
    }

    fn from_ipld(ipld: &Ipld) -> Result<Self, LogError> {
        let map = as_map(ipld)?;
        let clock_map = as_map(lookup(map, "clock")?)?;
        let identity_map = as_map(lookup(map, "identity")?)?;

        Ok(Self {
            id: as_string(lookup(map, "id")?)?,
            payload: as_bytes(lookup(map, "payload")?)?,
            next: as_links(lookup(map, "next")?)?,
            refs: as_links(lookup(map, "refs")?)?,
            clock: LamportClock {
                id: as_bytes(lookup(clock_map, "id")?)?,
                time: as_u64(lookup(clock_map, "time")?)?,
            },
            v: as_u64(lookup(map, "v")?)?,
            key: as_bytes(lookup(map, "key")?)?,
            identity: Identity {
                id: as_string(lookup(identity_map, "id")?)?,
                pub_key: as_bytes(lookup(identity_map, "pub_key")?)?,
                id_type: as_string(lookup(identity_map, "type")?)?,
            },
            sig: as_bytes(lookup(map, "sig")?)?,
            hash: block_cid(&[]),
        })
    }
}

/// CID of a dag-cbor block: CIDv1, sha2-256.
pub(crate) fn block_cid(bytes: &[u8]) -> Cid {
    Cid::new_v1(IpldCodec::DagCbor.into(), Code::Sha2_256.digest(bytes))
}

fn encode_cbor(ipld: &Ipld) -> Result<Vec<u8>, LogError> {
    let mut bytes = Vec::new();
    ipld.encode(IpldCodec::DagCbor, &mut bytes)
        .map_err(LogError::encoding)?;
    Ok(bytes)
}

// ----- ipld extraction helpers -----

fn lookup<'a>(map: &'a BTreeMap<String, Ipld>, key: &str) -> Result<&'a Ipld, LogError> {
    map.get(key)
        .ok_or_else(|| LogError::Encoding(format!("missing field {key:?}")))
}

fn as_map(ipld: &Ipld) -> Result<&BTreeMap<String, Ipld>, LogError> {
    match ipld {
        Ipld::Map(m) => Ok(m),
        other => Err(LogError::Encoding(format!("expected map, got {other:?}"))),
    }
}

fn as_string(ipld: &Ipld) -> Result<String, LogError> {
    match ipld {
        Ipld::String(s) => Ok(s.clone()),
        other => Err(LogError::Encoding(format!("expected string, got {other:?}"))),
    }
}

fn as_bytes(ipld: &Ipld) -> Result<Vec<u8>, LogError> {
    match ipld {
        Ipld::Bytes(b) => Ok(b.clone()),
        other => Err(LogError::Encoding(format!("expected bytes, got {other:?}"))),
    }
}

fn as_u64(ipld: &Ipld) -> Result<u64, LogError> {
    match ipld {
        Ipld::Integer(i) => {
            u64::try_from(*i).map_err(|_| LogError::Encoding(format!("integer out of range: {i}")))
        }
        other => Err(LogError::Encoding(format!("expected integer, got {other:?}"))),
    }
}

fn as_links(ipld: &Ipld) -> Result<Vec<Cid>, LogError> {
    match ipld {
        Ipld::List(items) => items
            .iter()
            .map(|item| match item {
                Ipld::Link(cid) => Ok(*cid),
                other => Err(LogError::Encoding(format!("expected link, got {other:?}"))),
            })
            .collect(),
        other => Err(LogError::Encoding(format!("expected list, got {other:?}"))),
    }
}

// ----- serde helpers: CIDs as strings in JSON -----

mod cid_serde {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&cid.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

mod cid_vec_serde {
    use cid::Cid;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cids: &[Cid], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(cids.len()))?;
        for cid in cids {
            seq.serialize_element(&cid.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Cid>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| Cid::try_from(s.as_str()).map_err(serde::de::Error::custom))
            .collect()
    }
}
