//! Replication progress counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A point-in-time view of the replication counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicationStatus {
    /// Entries applied so far.
    pub progress: usize,
    /// Best known target entry count.
    pub max: usize,
    /// Completed sub-logs awaiting delivery.
    pub buffered: usize,
    /// Heads queued or in flight.
    pub queued: usize,
}

/// Mutable replication counters shared between the store and its observers.
///
/// `progress` and `max` only move forward (monotonic updates prevent UI
/// flicker when fetches complete out of order); `queued` saturates at zero.
#[derive(Debug, Default)]
pub struct ReplicationInfo {
    progress: AtomicUsize,
    max: AtomicUsize,
    buffered: AtomicUsize,
    queued: AtomicUsize,
}

impl ReplicationInfo {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `progress` to `p` if it is larger than the current value.
    pub fn set_progress(&self, p: usize) {
        self.progress.fetch_max(p, Ordering::SeqCst);
    }

    /// Raise `max` to `m` if it is larger than the current value.
    pub fn set_max(&self, m: usize) {
        self.max.fetch_max(m, Ordering::SeqCst);
    }

    /// Record one more queued head.
    pub fn inc_queued(&self) {
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove `n` heads from the queued count, saturating at zero.
    pub fn decrease_queued(&self, n: usize) {
        let _ = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| {
                Some(q.saturating_sub(n))
            });
    }

    /// Set the buffered sub-log count.
    pub fn set_buffered(&self, b: usize) {
        self.buffered.store(b, Ordering::SeqCst);
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.progress.store(0, Ordering::SeqCst);
        self.max.store(0, Ordering::SeqCst);
        self.buffered.store(0, Ordering::SeqCst);
        self.queued.store(0, Ordering::SeqCst);
    }

    /// Current `progress` value.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    /// Current `max` value.
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Current `buffered` value.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    /// Current `queued` value.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Snapshot all counters at once.
    pub fn snapshot(&self) -> ReplicationStatus {
        ReplicationStatus {
            progress: self.progress(),
            max: self.max(),
            buffered: self.buffered(),
            queued: self.queued(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let info = ReplicationInfo::new();
        info.set_progress(5);
        info.set_progress(3);
        assert_eq!(info.progress(), 5, "progress never retreats");
        info.set_progress(8);
        assert_eq!(info.progress(), 8);
    }

    #[test]
    fn test_max_is_monotonic() {
        let info = ReplicationInfo::new();
        info.set_max(10);
        info.set_max(2);
        assert_eq!(info.max(), 10);
    }

    #[test]
    fn test_queued_saturates_at_zero() {
        let info = ReplicationInfo::new();
        info.inc_queued();
        info.inc_queued();
        info.decrease_queued(5);
        assert_eq!(info.queued(), 0);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let info = ReplicationInfo::new();
        info.set_progress(4);
        info.set_max(9);
        info.set_buffered(2);
        info.inc_queued();

        info.reset();
        assert_eq!(info.snapshot(), ReplicationStatus::default());
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let info = ReplicationInfo::new();
        info.set_progress(1);
        info.set_max(3);
        info.set_buffered(2);
        info.inc_queued();

        let status = info.snapshot();
        assert_eq!(status.progress, 1);
        assert_eq!(status.max, 3);
        assert_eq!(status.buffered, 2);
        assert_eq!(status.queued, 1);
    }
}
