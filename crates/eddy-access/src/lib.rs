//! Access control for eddy logs.
//!
//! Every candidate entry — local append or remote sync — passes through an
//! [`AccessController`] before it is admitted. Controllers are parameterized
//! by a content-addressed [`Manifest`] and constructed through an explicit
//! [`Registry`] value that the orchestrator threads to each store.

mod controller;
mod error;
mod manifest;
mod registry;
mod simple;

#[cfg(test)]
mod tests;

pub use controller::{AccessController, CanAppendContext, SnapshotContext};
pub use error::AccessError;
pub use manifest::{create_manifest, resolve_manifest, Manifest, ManifestParams};
pub use registry::{ControllerConstructor, Registry};
pub use simple::{SimpleAccessController, SIMPLE_CONTROLLER_TYPE, WRITE_CAPABILITY, WILDCARD};
