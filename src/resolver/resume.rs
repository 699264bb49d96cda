use crate::resolver::{RawResolver, ResolverVtable};
use crate::sync::Spinlock;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::task::{Poll, Waker};

static RESUME_VTABLE: ResolverVtable = ResolverVtable {
    resolve: resume_resolve,
};

unsafe fn resume_resolve(ptr: NonNull<RawResolver>, result: i32) {
    // Safety: repr(C) guarantees the header is the first field.
    let this = unsafe { ptr.cast::<ResumeResolver>().as_ref() };
    this.deliver(result);
}

/// Resolves a completion by waking the suspended caller's recorded waker.
///
/// Lives inside the awaitable that suspended on the submission, pinned for
/// the duration of the operation since its address is the completion tag. It
/// carries no `Drop` glue (its lifetime is bound to the suspended frame) and
/// the actual resumption policy, including which thread the caller resumes
/// on, belongs to the driver's executor, not to this type.
#[repr(C)]
pub struct ResumeResolver {
    raw: RawResolver,

    waker: Spinlock<Option<Waker>>,

    result: AtomicI32,
    resolved: AtomicBool,

    // The address doubles as the submission tag, so the resolver must not
    // move between tagging and resolution.
    _pinned: PhantomPinned,
}

impl ResumeResolver {
    pub fn new() -> Self {
        Self {
            raw: RawResolver::new(&RESUME_VTABLE),
            waker: Spinlock::new(None),
            result: AtomicI32::new(0),
            resolved: AtomicBool::new(false),
            _pinned: PhantomPinned,
        }
    }

    /// The tag to attach to the submission entry. Pinned: the address must
    /// stay valid until the reaper resolves it.
    pub(crate) fn user_data(self: Pin<&Self>) -> u64 {
        &self.get_ref().raw as *const RawResolver as u64
    }

    /// Called by the reaper thread that observed the completion record.
    fn deliver(&self, result: i32) {
        self.result.store(result, Ordering::Relaxed);

        // Publish inside the waker cell's critical section so a concurrently
        // re-registering caller either sees `resolved` or hands us the fresh
        // waker; the wake itself runs without touching the cell again.
        let waker = {
            let mut guard = self.waker.lock();
            self.resolved.store(true, Ordering::Release);
            guard.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Caller-side poll: registers (or refreshes) the waker until the
    /// delivered result is available.
    pub(crate) fn poll_result(&self, waker: &Waker) -> Poll<i32> {
        let mut guard = self.waker.lock();

        if self.resolved.load(Ordering::Acquire) {
            drop(guard);
            return Poll::Ready(self.result.load(Ordering::Relaxed));
        }

        match guard.as_ref() {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *guard = Some(waker.clone()),
        }
        Poll::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

impl Default for ResumeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResumeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeResolver")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve_user_data;
    use crate::test_utils::mock_waker;
    use static_assertions::assert_impl_all;
    use std::pin::pin;

    assert_impl_all!(ResumeResolver: Send, Sync);

    #[test]
    fn test_resolve_wakes_registered_waker_once() {
        let resolver = pin!(ResumeResolver::new());
        let (waker, counter) = mock_waker();

        assert!(resolver.poll_result(&waker).is_pending());
        assert!(!resolver.is_resolved());

        let tag = resolver.as_ref().user_data();
        unsafe { resolve_user_data(tag, 42) };

        assert_eq!(counter.count(), 1);
        assert!(resolver.is_resolved());
        assert_eq!(resolver.poll_result(&waker), Poll::Ready(42));
    }

    #[test]
    fn test_resolve_before_any_registration() {
        let resolver = pin!(ResumeResolver::new());

        let tag = resolver.as_ref().user_data();
        unsafe { resolve_user_data(tag, -11) };

        // A late poller still observes the stored result.
        let (waker, counter) = mock_waker();
        assert_eq!(resolver.poll_result(&waker), Poll::Ready(-11));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_cross_thread_resolution() {
        let resolver = pin!(ResumeResolver::new());
        let (waker, counter) = mock_waker();
        assert!(resolver.poll_result(&waker).is_pending());

        let tag = resolver.as_ref().user_data();
        std::thread::scope(|s| {
            s.spawn(move || unsafe { resolve_user_data(tag, 7) });
        });

        assert_eq!(counter.count(), 1);
        assert_eq!(resolver.poll_result(&waker), Poll::Ready(7));
    }
}
