//! The log DAG: append, join, ordered traversal.

use std::collections::{BinaryHeap, HashMap, HashSet};

use cid::Cid;
use tracing::debug;

use eddy_types::LamportClock;

use crate::entry::Entry;
use crate::error::LogError;
use crate::identity::{Identity, IdentityProvider};

/// An append-only DAG of entries identified by a log id.
///
/// Holds the content-addressed entry set and the current heads (entries with
/// no children in the set). Merging two logs is a set union with head
/// recomputation — commutative, associative, idempotent.
#[derive(Debug, Clone)]
pub struct Log {
    id: String,
    identity: Identity,
    entries: HashMap<Cid, Entry>,
    heads: HashSet<Cid>,
}

impl Log {
    /// Create an empty log.
    pub fn new(id: impl Into<String>, identity: Identity) -> Self {
        Self {
            id: id.into(),
            identity,
            entries: HashMap::new(),
            heads: HashSet::new(),
        }
    }

    /// Build a log from an existing entry set.
    ///
    /// When `heads` is given it is trusted (snapshot path); otherwise heads
    /// are recomputed from the set.
    pub fn from_entries(
        id: impl Into<String>,
        identity: Identity,
        entries: Vec<Entry>,
        heads: Option<Vec<Cid>>,
    ) -> Self {
        let id = id.into();
        let entries: HashMap<Cid, Entry> =
            entries.into_iter().map(|e| (e.hash, e)).collect();
        let heads = match heads {
            Some(cids) => cids
                .into_iter()
                .filter(|c| entries.contains_key(c))
                .collect(),
            None => find_heads(&entries),
        };
        Self {
            id,
            identity,
            entries,
            heads,
        }
    }

    /// The log identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identity the log signs new entries with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the log contains an entry with the given hash.
    pub fn contains(&self, hash: &Cid) -> bool {
        self.entries.contains_key(hash)
    }

    /// Look up an entry by hash.
    pub fn get(&self, hash: &Cid) -> Option<&Entry> {
        self.entries.get(hash)
    }

    /// All entry hashes currently in the log.
    pub fn entry_hashes(&self) -> HashSet<Cid> {
        self.entries.keys().copied().collect()
    }

    /// Current heads, sorted by clock then hash for determinism.
    pub fn heads(&self) -> Vec<Entry> {
        let mut heads: Vec<Entry> = self
            .heads
            .iter()
            .filter_map(|c| self.entries.get(c).cloned())
            .collect();
        heads.sort_by(|a, b| {
            a.clock
                .cmp(&b.clock)
                .then_with(|| a.hash.to_string().cmp(&b.hash.to_string()))
        });
        heads
    }

    /// Append a payload, producing a new signed entry.
    ///
    /// `next` becomes the current heads; `refs` are skip-list shortcuts
    /// selected by walking the traversal backwards at exponentially
    /// increasing strides (2^k), capped at `ref_count`. The new entry's
    /// clock is one past the maximum head clock, and it becomes the sole
    /// head.
    pub fn append(
        &mut self,
        provider: &dyn IdentityProvider,
        payload: Vec<u8>,
        ref_count: usize,
    ) -> Result<Entry, LogError> {
        let entry = self.draft(provider, payload, ref_count)?;
        self.apply(entry.clone());
        Ok(entry)
    }

    /// Build and sign the entry an append would produce, without inserting
    /// it. Callers that admission-check candidates commit them with
    /// [`apply`](Self::apply).
    pub fn draft(
        &self,
        provider: &dyn IdentityProvider,
        payload: Vec<u8>,
        ref_count: usize,
    ) -> Result<Entry, LogError> {
        let mut next: Vec<Cid> = self.heads.iter().copied().collect();
        next.sort_by_key(|c| c.to_string());

        let max_head_time = next
            .iter()
            .filter_map(|c| self.entries.get(c))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        let clock = LamportClock::at(self.identity.pub_key.clone(), max_head_time + 1);

        let refs = self.pick_references(ref_count, &next);

        Entry::create(
            provider,
            &self.identity,
            &self.id,
            payload,
            next,
            refs,
            clock,
        )
    }

    /// Commit a drafted entry: insert it and make it the sole head.
    pub fn apply(&mut self, entry: Entry) {
        let hash = entry.hash;
        let time = entry.clock.time;
        self.entries.insert(hash, entry);
        self.heads = HashSet::from([hash]);
        debug!(%hash, time, "appended entry");
    }

    /// Merge another log into this one (CRDT join).
    ///
    /// Entries are unioned and deduplicated by hash; heads are recomputed.
    /// A non-negative `size_limit` truncates the result to the newest
    /// entries in traversal order; `-1` keeps everything.
    pub fn join(&mut self, other: &Log, size_limit: i64) -> Result<(), LogError> {
        if other.id != self.id {
            return Err(LogError::LogIdMismatch {
                ours: self.id.clone(),
                theirs: other.id.clone(),
            });
        }

        let mut added = 0usize;
        for (hash, entry) in &other.entries {
            if entry.id != self.id {
                debug!(%hash, entry_id = %entry.id, "skipping entry from foreign log");
                continue;
            }
            if self.entries.insert(*hash, entry.clone()).is_none() {
                added += 1;
            }
        }

        self.heads = find_heads(&self.entries);

        if size_limit >= 0 && self.entries.len() > size_limit as usize {
            let keep: Vec<Entry> = self
                .values()
                .into_iter()
                .rev()
                .take(size_limit as usize)
                .collect();
            self.entries = keep.into_iter().map(|e| (e.hash, e)).collect();
            self.heads = find_heads(&self.entries);
        }

        if added > 0 {
            debug!(added, total = self.entries.len(), "joined logs");
        }
        Ok(())
    }

    /// Ordered traversal of all entries.
    ///
    /// Topological (parents before children), tiebreak by clock time
    /// ascending then hash string. The returned sequence is a snapshot of
    /// the current entry set.
    pub fn values(&self) -> Vec<Entry> {
        // Kahn's algorithm with an ordered ready-queue. In-degree counts
        // only parents present in the set, so partial logs traverse fine.
        let mut in_degree: HashMap<Cid, usize> = HashMap::new();
        let mut children: HashMap<Cid, Vec<Cid>> = HashMap::new();

        for (hash, entry) in &self.entries {
            let parents: HashSet<Cid> = entry
                .next
                .iter()
                .chain(entry.refs.iter())
                .filter(|p| self.entries.contains_key(p))
                .copied()
                .collect();
            in_degree.insert(*hash, parents.len());
            for parent in parents {
                children.entry(parent).or_default().push(*hash);
            }
        }

        let mut ready: BinaryHeap<std::cmp::Reverse<(u64, String, Cid)>> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(h, _)| ready_key(&self.entries[h]))
            .collect();

        let mut result = Vec::with_capacity(self.entries.len());

        while let Some(std::cmp::Reverse((_, _, hash))) = ready.pop() {
            let entry = &self.entries[&hash];
            result.push(entry.clone());

            if let Some(kids) = children.get(&hash) {
                for kid in kids {
                    let deg = in_degree.get_mut(kid).expect("child tracked in in_degree");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(ready_key(&self.entries[kid]));
                    }
                }
            }
        }

        result
    }

    /// Select up to `count` skip-list references by walking the traversal
    /// backwards at strides of 2^k, skipping entries already in `exclude`.
    fn pick_references(&self, count: usize, exclude: &[Cid]) -> Vec<Cid> {
        if count == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let ordered = self.values();
        let exclude: HashSet<&Cid> = exclude.iter().collect();
        let mut refs = Vec::new();

        let mut stride = 1usize;
        while stride <= ordered.len() && refs.len() < count {
            let entry = &ordered[ordered.len() - stride];
            if !exclude.contains(&entry.hash) && !refs.contains(&entry.hash) {
                refs.push(entry.hash);
            }
            stride *= 2;
        }

        refs
    }
}

fn ready_key(entry: &Entry) -> std::cmp::Reverse<(u64, String, Cid)> {
    std::cmp::Reverse((entry.clock.time, entry.hash.to_string(), entry.hash))
}

/// Heads of an entry set: entries referenced by no other entry's
/// `next` or `refs`.
fn find_heads(entries: &HashMap<Cid, Entry>) -> HashSet<Cid> {
    let mut referenced: HashSet<Cid> = HashSet::new();
    for entry in entries.values() {
        referenced.extend(entry.next.iter().copied());
        referenced.extend(entry.refs.iter().copied());
    }
    entries
        .keys()
        .filter(|h| !referenced.contains(h))
        .copied()
        .collect()
}
