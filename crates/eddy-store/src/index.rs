//! Secondary indexes over the log.

use eddy_log::{Entry, Log};

/// A materialized view rebuilt after every log mutation.
///
/// Application-level stores layer richer indexes on top; the base store
/// ships [`BaseIndex`], which simply mirrors the ordered traversal.
pub trait Index: Send + Sync {
    /// Rebuild the view from the current log.
    fn update_index(&mut self, log: &Log);

    /// The indexed entries.
    fn entries(&self) -> Vec<Entry>;
}

/// Default index: the log's ordered traversal.
#[derive(Default)]
pub struct BaseIndex {
    entries: Vec<Entry>,
}

impl BaseIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index for BaseIndex {
    fn update_index(&mut self, log: &Log) {
        self.entries = log.values();
    }

    fn entries(&self) -> Vec<Entry> {
        self.entries.clone()
    }
}
