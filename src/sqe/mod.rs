use crate::resolver::{CallbackResolver, DeferredResolver, ResumeResolver};
use crate::sync::{Spinlock, SpinlockGuard};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The one operation this core needs from a submission entry: attaching
/// opaque user data, retrievable from the entry's completion record.
pub trait RingEntry {
    fn tag(&mut self, user_data: u64);
}

impl RingEntry for io_uring::squeue::Entry {
    fn tag(&mut self, user_data: u64) {
        let entry = std::mem::replace(self, io_uring::opcode::Nop::new().build());
        *self = entry.user_data(user_data);
    }
}

/// Serializes concurrent submitters of one ring.
///
/// Owned by the ring collaborator and handed out per submission; the permit
/// must be held across the whole "build entry, tag resolver, submit"
/// sequence. Plain mutual exclusion, no reader/writer split.
#[derive(Debug, Default)]
pub struct SubmitLock {
    inner: Spinlock<()>,
}

impl SubmitLock {
    pub const fn new() -> Self {
        Self {
            inner: Spinlock::new(()),
        }
    }

    pub fn acquire(&self) -> SubmitPermit<'_> {
        SubmitPermit {
            _guard: self.inner.lock(),
        }
    }

    pub fn try_acquire(&self) -> Option<SubmitPermit<'_>> {
        self.inner.try_lock().map(|guard| SubmitPermit { _guard: guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Exclusive right to submit; released on drop.
pub struct SubmitPermit<'a> {
    _guard: SpinlockGuard<'a, ()>,
}

impl std::fmt::Debug for SubmitPermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("SubmitPermit")
    }
}

/// Adapts one submission entry into a wait-point for a resumable computation.
///
/// Before the entry goes to the ring, the consumer picks exactly one
/// resolution strategy: awaiting this future (implicit [`ResumeResolver`],
/// created on first suspension), attaching a caller-owned
/// [`DeferredResolver`] for later polling, or a fire-and-forget callback.
/// Awaiting yields the raw i32 the ring delivered (byte count or negative
/// errno by the ring's own convention); this core does not reinterpret it.
#[pin_project]
pub struct SqeAwaitable<'a, E: RingEntry> {
    entry: &'a mut E,

    /// Released only after the entry is fully tagged, so a submission never
    /// becomes reaper-visible before its resolver is registered.
    permit: Option<SubmitPermit<'a>>,

    #[pin]
    resolver: ResumeResolver,

    tagged: bool,
}

impl<'a, E: RingEntry> SqeAwaitable<'a, E> {
    pub fn new(entry: &'a mut E) -> Self {
        Self {
            entry,
            permit: None,
            resolver: ResumeResolver::new(),
            tagged: false,
        }
    }

    /// Like [`SqeAwaitable::new`], but carries the submission permit so it
    /// can be released at the suspension point.
    pub fn with_permit(entry: &'a mut E, permit: SubmitPermit<'a>) -> Self {
        Self {
            entry,
            permit: Some(permit),
            resolver: ResumeResolver::new(),
            tagged: false,
        }
    }

    /// Tags the entry with a caller-owned deferred resolver and hands any
    /// held permit back to the submitter, who still has to push the entry.
    ///
    /// The resolver must stay alive (and pinned) until resolution.
    pub fn set_deferred(mut self, resolver: Pin<&DeferredResolver>) -> Option<SubmitPermit<'a>> {
        self.entry.tag(resolver.user_data());
        self.permit.take()
    }

    /// Tags the entry with a self-owning callback resolver; the callback runs
    /// on whichever thread observes the completion, then frees itself.
    pub fn set_callback(
        mut self,
        cb: impl FnOnce(i32) + Send + 'static,
    ) -> Option<SubmitPermit<'a>> {
        self.entry.tag(CallbackResolver::boxed(cb).user_data());
        self.permit.take()
    }
}

impl<E: RingEntry> Future for SqeAwaitable<'_, E> {
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let this = self.project();

        if !*this.tagged {
            // Suspension point. Register the continuation first: once the
            // tag is written a reaper may resolve at any moment.
            let pending = this.resolver.poll_result(cx.waker());
            debug_assert!(pending.is_pending(), "resolved before tagging");

            this.entry.tag(this.resolver.as_ref().user_data());
            *this.tagged = true;

            // The entry is fully tagged; let the next submitter in.
            drop(this.permit.take());

            return Poll::Pending;
        }

        this.resolver.poll_result(cx.waker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve_user_data;
    use crate::test_utils::{MockEntry, mock_waker};
    use std::pin::pin;
    use std::sync::atomic::Ordering;
    use std::thread;

    #[test]
    fn test_suspend_tags_entry_then_releases_permit() {
        let lock = SubmitLock::new();
        let mut entry = MockEntry::new();
        let probe = entry.probe();

        let mut fut = pin!(SqeAwaitable::with_permit(&mut entry, lock.acquire()));
        assert!(lock.is_locked());

        let (waker, counter) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(fut.as_mut().poll(&mut cx).is_pending());

        // Tag registered and the submission lock released, in that order.
        let tag = probe.load(Ordering::Acquire);
        assert_ne!(tag, 0);
        assert!(!lock.is_locked());

        unsafe { resolve_user_data(tag, 42) };
        assert_eq!(counter.count(), 1);
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(42));
    }

    #[test]
    fn test_cross_thread_resume_through_mock_ring() {
        let lock = SubmitLock::new();
        let mut entry = MockEntry::new();
        let probe = entry.probe();

        thread::scope(|s| {
            // Reaper: waits for the tagged submission to appear, then
            // delivers its completion record.
            s.spawn(move || {
                let tag = loop {
                    let tag = probe.load(Ordering::Acquire);
                    if tag != 0 {
                        break tag;
                    }
                    std::hint::spin_loop();
                };
                unsafe { resolve_user_data(tag, 42) };
            });

            let awaitable = SqeAwaitable::with_permit(&mut entry, lock.acquire());
            let got = futures::executor::block_on(awaitable);
            assert_eq!(got, 42);
        });

        assert!(!lock.is_locked());
    }

    #[test]
    fn test_set_deferred_tags_and_returns_permit() {
        let lock = SubmitLock::new();
        let mut entry = MockEntry::new();
        let probe = entry.probe();

        let resolver = pin!(crate::resolver::DeferredResolver::new());

        let awaitable = SqeAwaitable::with_permit(&mut entry, lock.acquire());
        let permit = awaitable.set_deferred(resolver.as_ref());

        // The submitter keeps the lock until it pushed the entry.
        assert!(permit.is_some());
        assert!(lock.is_locked());
        assert_eq!(probe.load(Ordering::Acquire), resolver.as_ref().user_data());

        drop(permit);
        assert!(!lock.is_locked());

        assert_eq!(resolver.result(), None);
        unsafe { resolve_user_data(probe.load(Ordering::Acquire), 7) };
        assert_eq!(resolver.result(), Some(7));
    }

    #[test]
    fn test_set_callback_fire_and_forget() {
        let mut entry = MockEntry::new();
        let probe = entry.probe();

        let (tx, rx) = std::sync::mpsc::channel();
        let permit = SqeAwaitable::new(&mut entry).set_callback(move |result| {
            tx.send(result).unwrap();
        });
        assert!(permit.is_none());

        let tag = probe.load(Ordering::Acquire);
        thread::scope(|s| {
            s.spawn(move || unsafe { resolve_user_data(tag, -libc::EAGAIN) });
        });

        assert_eq!(rx.recv().unwrap(), -libc::EAGAIN);
    }

    #[test]
    fn test_real_uring_entry_is_taggable() {
        let mut entry = io_uring::opcode::Nop::new().build();
        entry.tag(0xdead_beef);
    }
}
