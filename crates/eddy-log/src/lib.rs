//! Append-only, causally linked, signed log DAG.
//!
//! The [`Log`] is a grow-only CRDT: entries reference their causal
//! predecessors by CID (like Git's commit graph), are ed25519-signed, and
//! merge by set union. Two replicas that have exchanged all entries converge
//! to identical traversals regardless of delivery order.
//!
//! Entry blocks are canonical dag-cbor, content-addressed with sha2-256
//! CIDs; the JSON form of an entry is used for head caching and snapshots.

mod entry;
mod error;
mod fetch;
mod identity;
mod log;

#[cfg(test)]
mod tests;

pub use entry::{Entry, ENTRY_FORMAT_VERSION};
pub use error::LogError;
pub use fetch::{from_entry_hash, FetchOptions};
pub use identity::{Identity, IdentityProvider, Keypair};
pub use log::Log;
