//! Per-dispatcher request counters and their snapshot form.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::Strategy;

/// Atomic request counters shared by callers and executors.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    active: AtomicU64,
    total: AtomicU64,
    rejected: AtomicU64,
}

impl DispatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call, admitted or not.
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Admit unconditionally. The guard releases the slot on drop.
    pub fn admit(&self) -> ActiveGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard { counters: self }
    }

    /// Admit only while fewer than `max` calls are active.
    pub fn try_admit(&self, max: u64) -> Option<ActiveGuard<'_>> {
        loop {
            let current = self.active.load(Ordering::Relaxed);
            if current >= max {
                return None;
            }
            if self
                .active
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ActiveGuard { counters: self });
            }
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// RAII guard for one active call.
pub struct ActiveGuard<'a> {
    counters: &'a DispatchCounters,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time view of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMetrics {
    pub strategy: Strategy,
    pub active_requests: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    /// Executor count, or the group size for admission groups.
    pub workers: usize,
    pub queue_capacity: usize,
    /// Items waiting in the queue or the live admission group.
    pub queued: usize,
    /// Admission-group strategy only.
    pub groups_flushed: u64,
}

impl DispatchMetrics {
    pub(crate) fn from_counters(
        strategy: Strategy,
        counters: &DispatchCounters,
        workers: usize,
        queue_capacity: usize,
        queued: usize,
    ) -> Self {
        Self {
            strategy,
            active_requests: counters.active(),
            total_requests: counters.total(),
            rejected_requests: counters.rejected(),
            workers,
            queue_capacity,
            queued,
            groups_flushed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_slot() {
        let counters = DispatchCounters::new();
        let guard = counters.admit();
        assert_eq!(counters.active(), 1);
        drop(guard);
        assert_eq!(counters.active(), 0);
    }

    #[test]
    fn try_admit_stops_at_max() {
        let counters = DispatchCounters::new();
        let g1 = counters.try_admit(2);
        let g2 = counters.try_admit(2);
        assert!(g1.is_some() && g2.is_some());
        assert!(counters.try_admit(2).is_none());

        drop(g1);
        assert!(counters.try_admit(2).is_some());
    }

    #[test]
    fn concurrent_admission_never_exceeds_max() {
        let counters = std::sync::Arc::new(DispatchCounters::new());
        let admitted = std::sync::Arc::new(AtomicU64::new(0));
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(16));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let counters = counters.clone();
                let admitted = admitted.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if let Some(guard) = counters.try_admit(5) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                        std::mem::forget(guard);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 5);
        assert_eq!(counters.active(), 5);
    }
}
