//! Storage interfaces consumed by the eddy log store.
//!
//! Two external collaborators live behind traits here:
//!
//! - [`BlockStore`] — a content-addressed object store. Entry blocks are
//!   dag-cbor; snapshot files are raw byte streams. Both are addressed by
//!   CID (sha2-256 multihash).
//! - [`Datastore`] — a small key-value store used for the head cache.
//!
//! In-memory implementations back the tests and single-process setups; the
//! fjall-backed [`FjallDatastore`] provides durable head persistence.

mod disk;
mod error;
mod memory;
mod traits;

pub use disk::FjallDatastore;
pub use error::StorageError;
pub use memory::{MemBlockStore, MemDatastore};
pub use traits::{BlockStore, Datastore};
