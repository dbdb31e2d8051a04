//! Reconstructing sub-logs from the object store.

use std::collections::{HashSet, VecDeque};

use cid::Cid;
use tracing::{debug, warn};

use eddy_storage::BlockStore;

use crate::entry::Entry;
use crate::error::LogError;
use crate::identity::{Identity, IdentityProvider};
use crate::log::Log;

/// Options controlling a [`from_entry_hash`] fetch.
pub struct FetchOptions<'a> {
    /// Hashes that are already known; traversal stops at them.
    pub exclude: &'a HashSet<Cid>,
    /// Maximum number of entries to fetch. `-1` means unlimited.
    pub length: i64,
    /// Per-entry admission check. Entries rejected by the filter are
    /// dropped and their ancestors are not traversed.
    pub filter: Option<&'a (dyn Fn(&Entry) -> bool + Send + Sync)>,
    /// Called for every entry fetched, in fetch order.
    pub progress: Option<&'a (dyn Fn(&Entry) + Send + Sync)>,
}

impl Default for FetchOptions<'_> {
    fn default() -> Self {
        static EMPTY: std::sync::LazyLock<HashSet<Cid>> = std::sync::LazyLock::new(HashSet::new);
        Self {
            exclude: &EMPTY,
            length: -1,
            filter: None,
            progress: None,
        }
    }
}

/// Fetch the causal closure of a set of head hashes from the object store.
///
/// Traverses `next ∪ refs` breadth-first from the given heads until no
/// parents remain, `length` entries have been fetched, or all remaining
/// parents are excluded. Every fetched entry is integrity-checked (declared
/// hash against the block bytes) and signature-verified; a missing block or
/// failed verification aborts the fetch with an error.
pub async fn from_entry_hash(
    blocks: &dyn BlockStore,
    provider: &dyn IdentityProvider,
    id: &str,
    identity: Identity,
    heads: &[Cid],
    options: FetchOptions<'_>,
) -> Result<Log, LogError> {
    let mut queue: VecDeque<Cid> = heads.iter().copied().collect();
    let mut seen: HashSet<Cid> = HashSet::new();
    let mut entries: Vec<Entry> = Vec::new();

    while let Some(cid) = queue.pop_front() {
        if options.length >= 0 && entries.len() >= options.length as usize {
            break;
        }
        if !seen.insert(cid) || options.exclude.contains(&cid) {
            continue;
        }

        let block = blocks.get_block(&cid).await?;
        let entry = Entry::from_block(&block)?;

        if entry.hash != cid {
            return Err(LogError::TamperedEntry {
                declared: cid,
                computed: entry.hash,
            });
        }
        entry.verify(provider)?;

        if entry.id != id {
            warn!(hash = %cid, entry_id = %entry.id, "fetched entry belongs to a different log");
            continue;
        }

        if let Some(filter) = options.filter
            && !filter(&entry)
        {
            debug!(hash = %cid, "entry rejected by admission filter");
            continue;
        }

        for parent in entry.next.iter().chain(entry.refs.iter()) {
            if !seen.contains(parent) && !options.exclude.contains(parent) {
                queue.push_back(*parent);
            }
        }

        if let Some(progress) = options.progress {
            progress(&entry);
        }
        entries.push(entry);
    }

    let head_set: Vec<Cid> = heads.to_vec();
    debug!(
        requested = heads.len(),
        fetched = entries.len(),
        "built sub-log from entry hashes"
    );
    Ok(Log::from_entries(id, identity, entries, Some(head_set)))
}
