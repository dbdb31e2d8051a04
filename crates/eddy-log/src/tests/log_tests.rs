//! Log DAG tests: append, join, traversal, convergence.

use super::{test_keypair, test_log};
use crate::error::LogError;
use crate::log::Log;

const LOG_ID: &str = "/eddy/test/log";

#[test]
fn test_append_chains_heads() {
    let (keypair, mut log) = test_log(1, LOG_ID);

    let a = log.append(&keypair, b"a".to_vec(), 0).unwrap();
    let b = log.append(&keypair, b"b".to_vec(), 0).unwrap();

    assert_eq!(b.next, vec![a.hash], "second entry lists the first as parent");
    assert_eq!(log.heads().len(), 1);
    assert_eq!(log.heads()[0].hash, b.hash);
    assert_eq!(log.len(), 2);
}

#[test]
fn test_append_clock_strictly_increases() {
    let (keypair, mut log) = test_log(1, LOG_ID);

    let mut prev = 0;
    for i in 0..10u8 {
        let entry = log.append(&keypair, vec![i], 0).unwrap();
        assert!(entry.clock.time > prev);
        prev = entry.clock.time;
    }
}

#[test]
fn test_values_are_in_append_order_for_a_chain() {
    let (keypair, mut log) = test_log(1, LOG_ID);

    for i in 0..20u32 {
        log.append(&keypair, format!("hello{i}").into_bytes(), 0)
            .unwrap();
    }

    let values = log.values();
    assert_eq!(values.len(), 20);
    assert_eq!(values[0].payload, b"hello0");
    assert_eq!(values[19].payload, b"hello19");
}

#[test]
fn test_join_unions_and_dedupes() {
    let (keypair, mut a) = test_log(1, LOG_ID);
    a.append(&keypair, b"one".to_vec(), 0).unwrap();
    a.append(&keypair, b"two".to_vec(), 0).unwrap();

    let mut b = a.clone();
    b.join(&a, -1).unwrap();

    assert_eq!(b.len(), 2, "joining identical logs adds nothing");
}

#[test]
fn test_join_is_commutative() {
    let (kp1, mut a) = test_log(1, LOG_ID);
    let kp2 = test_keypair(2);
    let mut b = Log::new(LOG_ID, kp2.identity());

    // Two writers fork from empty.
    a.append(&kp1, b"from-a".to_vec(), 0).unwrap();
    b.append(&kp2, b"from-b".to_vec(), 0).unwrap();

    let mut ab = a.clone();
    ab.join(&b, -1).unwrap();
    let mut ba = b.clone();
    ba.join(&a, -1).unwrap();

    let ab_values: Vec<_> = ab.values().iter().map(|e| e.hash).collect();
    let ba_values: Vec<_> = ba.values().iter().map(|e| e.hash).collect();
    assert_eq!(ab_values, ba_values, "join order must not matter");

    let mut ab_heads: Vec<_> = ab.heads().iter().map(|e| e.hash).collect();
    let mut ba_heads: Vec<_> = ba.heads().iter().map(|e| e.hash).collect();
    ab_heads.sort();
    ba_heads.sort();
    assert_eq!(ab_heads, ba_heads);
    assert_eq!(ab.heads().len(), 2, "both forks remain heads after join");
}

#[test]
fn test_join_is_idempotent() {
    let (kp1, mut a) = test_log(1, LOG_ID);
    let kp2 = test_keypair(2);
    let mut b = Log::new(LOG_ID, kp2.identity());

    a.append(&kp1, b"x".to_vec(), 0).unwrap();
    b.append(&kp2, b"y".to_vec(), 0).unwrap();

    let mut joined = a.clone();
    joined.join(&b, -1).unwrap();
    let once: Vec<_> = joined.values().iter().map(|e| e.hash).collect();

    joined.join(&b, -1).unwrap();
    let twice: Vec<_> = joined.values().iter().map(|e| e.hash).collect();

    assert_eq!(once, twice);
}

#[test]
fn test_join_rejects_different_log_id() {
    let (kp1, a) = test_log(1, LOG_ID);
    let mut b = Log::new("/eddy/test/other", kp1.identity());
    b.append(&kp1, b"x".to_vec(), 0).unwrap();

    let mut target = a.clone();
    assert!(matches!(
        target.join(&b, -1),
        Err(LogError::LogIdMismatch { .. })
    ));
}

#[test]
fn test_concurrent_writers_converge_after_merge_append() {
    let kp1 = test_keypair(1);
    let kp2 = test_keypair(2);
    let mut a = Log::new(LOG_ID, kp1.identity());
    let mut b = Log::new(LOG_ID, kp2.identity());

    a.append(&kp1, b"a1".to_vec(), 0).unwrap();
    b.append(&kp2, b"b1".to_vec(), 0).unwrap();

    a.join(&b, -1).unwrap();
    b.join(&a, -1).unwrap();

    // Appending after the merge references both forks.
    let merge = a.append(&kp1, b"merge".to_vec(), 0).unwrap();
    assert_eq!(merge.next.len(), 2);
    assert_eq!(a.heads().len(), 1);

    b.join(&a, -1).unwrap();
    let a_values: Vec<_> = a.values().iter().map(|e| e.hash).collect();
    let b_values: Vec<_> = b.values().iter().map(|e| e.hash).collect();
    assert_eq!(a_values, b_values);
}

#[test]
fn test_causality_clock_dominates_parents() {
    let kp1 = test_keypair(1);
    let kp2 = test_keypair(2);
    let mut a = Log::new(LOG_ID, kp1.identity());
    let mut b = Log::new(LOG_ID, kp2.identity());

    for i in 0..5u8 {
        a.append(&kp1, vec![i], 0).unwrap();
    }
    b.join(&a, -1).unwrap();
    let entry = b.append(&kp2, b"after".to_vec(), 0).unwrap();

    for parent_hash in &entry.next {
        let parent = b.get(parent_hash).unwrap();
        assert!(parent.clock.time < entry.clock.time);
    }
}

#[test]
fn test_multiple_roots_permitted() {
    let kp1 = test_keypair(1);
    let kp2 = test_keypair(2);
    let mut a = Log::new(LOG_ID, kp1.identity());
    let mut b = Log::new(LOG_ID, kp2.identity());

    a.append(&kp1, b"root-a".to_vec(), 0).unwrap();
    b.append(&kp2, b"root-b".to_vec(), 0).unwrap();
    a.join(&b, -1).unwrap();

    let roots: Vec<_> = a.values().into_iter().filter(|e| e.is_root()).collect();
    assert_eq!(roots.len(), 2);
}

#[test]
fn test_join_size_limit_keeps_newest() {
    let (keypair, mut a) = test_log(1, LOG_ID);
    for i in 0..10u32 {
        a.append(&keypair, format!("e{i}").into_bytes(), 0).unwrap();
    }

    let mut truncated = Log::new(LOG_ID, keypair.identity());
    truncated.join(&a, 3).unwrap();

    assert_eq!(truncated.len(), 3);
    let values = truncated.values();
    assert_eq!(values.last().unwrap().payload, b"e9", "newest entry survives");
}

#[test]
fn test_refs_follow_exponential_strides() {
    let (keypair, mut log) = test_log(1, LOG_ID);
    for i in 0..64u32 {
        log.append(&keypair, format!("e{i}").into_bytes(), 16).unwrap();
    }

    let last = log.values().pop().unwrap();
    assert!(!last.refs.is_empty());
    assert!(last.refs.len() <= 16);
    // Refs never duplicate the direct parents.
    for r in &last.refs {
        assert!(!last.next.contains(r));
    }
}

#[test]
fn test_traversal_tiebreak_is_deterministic() {
    let kp1 = test_keypair(1);
    let kp2 = test_keypair(2);
    let mut a = Log::new(LOG_ID, kp1.identity());
    let mut b = Log::new(LOG_ID, kp2.identity());

    // Same clock times on both forks force the hash tiebreak.
    a.append(&kp1, b"fork-a".to_vec(), 0).unwrap();
    b.append(&kp2, b"fork-b".to_vec(), 0).unwrap();

    let mut left = a.clone();
    left.join(&b, -1).unwrap();
    let mut right = b.clone();
    right.join(&a, -1).unwrap();

    let l: Vec<_> = left.values().iter().map(|e| e.hash).collect();
    let r: Vec<_> = right.values().iter().map(|e| e.hash).collect();
    assert_eq!(l, r);
}
