//! Tests for the log crate.

mod entry_tests;
mod log_tests;

use crate::identity::Keypair;
use crate::log::Log;

/// Create a deterministic keypair from a seed.
fn test_keypair(seed: u8) -> Keypair {
    Keypair::from_bytes(&[seed; 32])
}

/// Create an empty log owned by the seeded identity.
fn test_log(seed: u8, id: &str) -> (Keypair, Log) {
    let keypair = test_keypair(seed);
    let log = Log::new(id, keypair.identity());
    (keypair, log)
}
