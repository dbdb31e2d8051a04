//! Entry encoding, signing and integrity tests.

use cid::Cid;
use eddy_types::LamportClock;

use super::test_keypair;
use crate::entry::{Entry, ENTRY_FORMAT_VERSION};
use crate::error::LogError;

fn make_entry(seed: u8, payload: &[u8], next: Vec<Cid>) -> Entry {
    let keypair = test_keypair(seed);
    let identity = keypair.identity();
    let clock = LamportClock::at(identity.pub_key.clone(), 1);
    Entry::create(
        &keypair,
        &identity,
        "/eddy/test/log",
        payload.to_vec(),
        next,
        vec![],
        clock,
    )
    .unwrap()
}

#[test]
fn test_create_sets_version_and_key() {
    let entry = make_entry(1, b"hello", vec![]);
    assert_eq!(entry.v, ENTRY_FORMAT_VERSION);
    assert_eq!(entry.key, entry.identity.pub_key);
    assert!(entry.is_root());
}

#[test]
fn test_signature_verifies() {
    let keypair = test_keypair(1);
    let entry = make_entry(1, b"hello", vec![]);
    entry.verify(&keypair).unwrap();
}

#[test]
fn test_tampered_payload_fails_signature() {
    let keypair = test_keypair(1);
    let mut entry = make_entry(1, b"hello", vec![]);
    entry.payload = b"tampered".to_vec();
    assert!(matches!(
        entry.verify(&keypair),
        Err(LogError::InvalidSignature)
    ));
}

#[test]
fn test_hash_matches_canonical_encoding() {
    let entry = make_entry(1, b"hello", vec![]);
    entry.verify_hash().unwrap();
    assert_eq!(entry.compute_hash().unwrap(), entry.hash);
}

#[test]
fn test_tampered_entry_detected_by_hash() {
    let mut entry = make_entry(1, b"hello", vec![]);
    entry.payload = b"evil".to_vec();
    assert!(matches!(
        entry.verify_hash(),
        Err(LogError::TamperedEntry { .. })
    ));
}

#[test]
fn test_block_roundtrip() {
    let parent = make_entry(1, b"parent", vec![]);
    let entry = make_entry(1, b"child", vec![parent.hash]);

    let block = entry.to_block().unwrap();
    let decoded = Entry::from_block(&block).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(decoded.hash, entry.hash, "hash is derived from the block bytes");
    assert_eq!(decoded.next, vec![parent.hash]);
}

#[test]
fn test_same_content_same_hash() {
    let a = make_entry(1, b"hello", vec![]);
    let b = make_entry(1, b"hello", vec![]);
    assert_eq!(a.hash, b.hash, "canonical encoding is deterministic");
}

#[test]
fn test_different_authors_different_hash() {
    let a = make_entry(1, b"hello", vec![]);
    let b = make_entry(2, b"hello", vec![]);
    assert_ne!(a.hash, b.hash);
}

#[test]
fn test_json_roundtrip_preserves_cids() {
    let parent = make_entry(1, b"parent", vec![]);
    let entry = make_entry(1, b"child", vec![parent.hash]);

    let json = serde_json::to_string(&entry).unwrap();
    assert!(
        json.contains(&parent.hash.to_string()),
        "CIDs serialize as strings in JSON"
    );

    let decoded: Entry = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_foreign_signer_rejected() {
    let keypair = test_keypair(1);
    let other = test_keypair(2);
    let identity = other.identity();
    let clock = LamportClock::at(identity.pub_key.clone(), 1);

    let result = Entry::create(
        &keypair,
        &identity,
        "/eddy/test/log",
        b"x".to_vec(),
        vec![],
        vec![],
        clock,
    );
    assert!(matches!(result, Err(LogError::IdentityMismatch)));
}
