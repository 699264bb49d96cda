use crate::sqe::RingEntry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Wake, Waker};

/// A waker that only counts how often it fires.
pub(crate) struct WakeCounter {
    count: AtomicUsize,
}

impl WakeCounter {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn mock_waker() -> (Waker, Arc<WakeCounter>) {
    let counter = Arc::new(WakeCounter {
        count: AtomicUsize::new(0),
    });
    (Waker::from(Arc::clone(&counter)), counter)
}

/// A stand-in for one ring submission entry: remembers its tag and exposes
/// it through a shared probe so a "reaper" thread can pick it up while the
/// awaitable still mutably borrows the entry.
pub(crate) struct MockEntry {
    tag: Arc<AtomicU64>,
}

impl MockEntry {
    pub(crate) fn new() -> Self {
        Self {
            tag: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn probe(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.tag)
    }
}

impl RingEntry for MockEntry {
    fn tag(&mut self, user_data: u64) {
        self.tag.store(user_data, Ordering::Release);
    }
}
