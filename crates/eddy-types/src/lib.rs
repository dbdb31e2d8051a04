//! Shared types and identifiers for eddy.
//!
//! This crate defines the types used across the eddy workspace:
//! log addresses ([`Address`]), the per-entry causal clock ([`LamportClock`]),
//! store configuration ([`StoreOptions`]), and the typed intra-node
//! [`EventBus`](events::EventBus).

pub mod events;

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use cid::Cid;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Protocol tag carried by canonical addresses.
pub const PROTOCOL_TAG: &str = "eddy";

/// Errors produced while parsing or validating an [`Address`].
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// The input is empty or has no usable segments.
    #[error("not a valid eddy address: {0:?}")]
    Invalid(String),

    /// The root segment is not a valid CID.
    #[error("invalid root cid {root:?}: {source}")]
    InvalidRoot {
        /// The offending segment.
        root: String,
        /// Underlying CID parse error.
        source: cid::Error,
    },
}

/// Address of a log: `/eddy/<root-cid>/<name>`.
///
/// The root CID identifies the access-controller manifest; the path names
/// the log itself. Parsing is lenient about the leading protocol tag and
/// the trailing name, but strict about the root being a well-formed CID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// CID of the manifest this log is rooted at.
    pub root: Cid,
    /// Human-readable log name.
    pub path: String,
}

impl Address {
    /// Create an address from a manifest CID and a log name.
    pub fn new(root: Cid, path: impl Into<String>) -> Self {
        Self {
            root,
            path: path.into(),
        }
    }

    /// Parse an address string.
    ///
    /// Accepted forms, with `<cid>` a valid CID in any multibase encoding:
    /// `/eddy/<cid>/<name>`, `/<tag>/<cid>/<name>`, `<cid>/<name>`, `<cid>`.
    /// A foreign leading tag is tolerated so that addresses minted by other
    /// deployments of the protocol still resolve.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let mut segments: Vec<&str> = s.split('/').filter(|p| !p.is_empty()).collect();

        if segments.is_empty() {
            return Err(AddressError::Invalid(s.to_string()));
        }

        // Drop a leading protocol tag when the root sits in the second slot.
        if segments.len() > 1 && Cid::try_from(segments[0]).is_err() {
            segments.remove(0);
        }

        let root = Cid::try_from(segments[0]).map_err(|source| AddressError::InvalidRoot {
            root: segments[0].to_string(),
            source,
        })?;

        Ok(Self {
            root,
            path: segments[1..].join("/"),
        })
    }

    /// Validate an address string without keeping the parsed value.
    pub fn is_valid(s: &str) -> Result<(), AddressError> {
        Self::parse(s).map(|_| ())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "/{PROTOCOL_TAG}/{}", self.root)
        } else {
            write!(f, "/{PROTOCOL_TAG}/{}/{}", self.root, self.path)
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Lamport clock
// ---------------------------------------------------------------------------

/// Lamport-style logical clock: an author identity paired with a counter.
///
/// Total order: by `time` first, identity bytes as tiebreak. Every appended
/// entry carries a clock strictly greater than all of its parents' clocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportClock {
    /// Public key bytes of the author.
    pub id: Vec<u8>,
    /// Logical timestamp.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock for the given author at time zero.
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into(), time: 0 }
    }

    /// Create a clock at an explicit time.
    pub fn at(id: impl Into<Vec<u8>>, time: u64) -> Self {
        Self { id: id.into(), time }
    }

    /// Return a copy advanced by one tick.
    pub fn tick(&self) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Merge with another clock, keeping the local identity.
    ///
    /// After merging, `time = max(self.time, other.time)`.
    pub fn merge(&mut self, other: &LamportClock) {
        self.time = self.time.max(other.time);
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// How many skip-list reference hashes each appended entry carries.
    pub reference_count: usize,
    /// Maximum number of concurrently fetched heads during replication.
    pub replication_concurrency: usize,
    /// Cap on how much history `load` reconstructs. `None` means everything.
    pub max_history: Option<usize>,
    /// Whether the store announces and ingests heads over pub/sub.
    pub replicate: bool,
    /// Local working directory for store data.
    pub directory: PathBuf,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reference_count: 64,
            replication_concurrency: 128,
            max_history: None,
            replicate: true,
            directory: PathBuf::from("./eddy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
