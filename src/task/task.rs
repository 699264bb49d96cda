use crate::task::frame::Frame;
use crate::task::state::CallerState;
use crate::task::{TaskError, TaskOpts};
use std::future::Future;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll, Waker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No readiness decision made yet.
    Initial,

    /// `await_suspend` recorded a continuation; waiting for the callee.
    Suspended,

    /// Completion observed; the result is cached or already consumed.
    Done,
}

/// The caller-facing handle over one suspended computation.
///
/// Exposes the three-operation suspension contract (`await_ready`,
/// `await_suspend`, `await_resume`) and implements [`Future`] on top of it,
/// so a task is usable as a suspension point inside any async context. The
/// handle owns destruction of the frame unless the handshake hands it to the
/// callee.
pub struct Task<T> {
    frame: Option<NonNull<Frame<T>>>,

    phase: Phase,

    /// Result pulled out of the slot before the frame can go away.
    cached: Option<Result<T, TaskError>>,

    /// Cleared when the fast path hands destruction back to the callee.
    destroy_callee: bool,
}

// Safety: frame access is serialized by the caller-state handshake; the
// value crosses threads through the spinlock-guarded slot.
unsafe impl<T: Send> Send for Task<T> {}

// The handle is address-insensitive regardless of T: the frame lives behind
// a NonNull and only the cached result moves with the handle, always by
// value. Without this impl the Future impl would demand T: Unpin.
impl<T> Unpin for Task<T> {}

impl<T> Task<T> {
    pub(crate) fn new(ptr: NonNull<Frame<T>>) -> Self {
        Self {
            frame: Some(ptr),
            phase: Phase::Initial,
            cached: None,
            destroy_callee: true,
        }
    }

    fn frame_ptr(&self) -> NonNull<Frame<T>> {
        // `frame` is only None after destruction was handed away, and every
        // path doing so clears it first.
        self.frame.expect("frame already released")
    }

    /// First operation of the suspension contract: decides between the
    /// synchronous fast path and suspension.
    ///
    /// Returns true if the result is already available, in which case no
    /// suspension or resumption machinery runs. Returns false if the caller
    /// must suspend and call [`Task::await_suspend`].
    pub fn await_ready(&mut self) -> bool {
        debug_assert_eq!(self.phase, Phase::Initial, "await_ready called twice");

        // Safety: NonNull::as_ref detaches the borrow from `self`; the frame
        // stays alive until a handshake decision destroys it.
        let frame = unsafe { self.frame_ptr().as_ref() };
        debug_assert!(
            !frame.opts.contains(TaskOpts::ENTRY),
            "entry tasks are never awaited"
        );

        match frame
            .state
            .transition(CallerState::NotReady, CallerState::QueriedAwaitReady)
        {
            Ok(()) => {
                // We hold the decision point; the callee spins while we are
                // in QueriedAwaitReady. Probe the slot under its lock.
                if let Some(result) = frame.slot.take() {
                    // Completed concurrently: keep the result, hand
                    // destruction to the callee, and never touch the frame
                    // again.
                    self.cached = Some(result);
                    self.phase = Phase::Done;
                    self.destroy_callee = false;

                    frame
                        .state
                        .store(CallerState::NoContinue, Ordering::Release);
                    self.frame = None;

                    true
                } else {
                    false
                }
            }

            // The callee finished and fully settled before we queried: the
            // result is ready and we keep ownership of destruction.
            Err(CallerState::ControlledDetach) => {
                frame.await_settled();

                self.cached = frame.slot.take();
                debug_assert!(self.cached.is_some(), "settled frame with empty slot");
                self.phase = Phase::Done;

                true
            }

            Err(other) => unreachable!("await_ready on a task in state {other:?}"),
        }
    }

    /// Second operation: records the continuation. Only legal immediately
    /// after [`Task::await_ready`] returned false. From this point, whichever
    /// side reaches the completion point second transfers control to the
    /// recorded waker.
    pub fn await_suspend(&mut self, waker: &Waker) {
        debug_assert_eq!(self.phase, Phase::Initial, "await_suspend out of order");

        let frame = unsafe { self.frame_ptr().as_ref() };
        *frame.waker.lock() = Some(waker.clone());

        // The release store is what un-parks the callee's rendezvous spin.
        frame
            .state
            .store(CallerState::ReadyToResume, Ordering::Release);
        self.phase = Phase::Suspended;
    }

    /// Third operation: extracts the result once completion is certain.
    ///
    /// The error arm propagates here, never at capture time. Panics if called
    /// before completion was observed through `await_ready` or a wakeup.
    pub fn await_resume(&mut self) -> Result<T, TaskError> {
        if let Some(cached) = self.cached.take() {
            self.phase = Phase::Done;
            return cached;
        }

        assert_eq!(self.phase, Phase::Suspended, "await_resume before completion");

        let frame = unsafe { self.frame_ptr().as_ref() };
        frame.await_settled();

        let result = frame
            .slot
            .take()
            .expect("settled frame with empty result slot");
        self.phase = Phase::Done;
        result
    }

    /// Alias for [`Task::await_resume`], for callers that observed completion
    /// out of band.
    pub fn get_result(&mut self) -> Result<T, TaskError> {
        self.await_resume()
    }

    /// Non-suspending probe, the only way to read an entry task's result.
    /// Returns None until the callee has fully settled.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        if let Some(cached) = self.cached.take() {
            self.phase = Phase::Done;
            return Some(cached);
        }

        if self.phase == Phase::Done {
            return None;
        }

        let frame = unsafe { self.frame_ptr().as_ref() };
        if !frame.settled.load(Ordering::Acquire) {
            return None;
        }

        let result = frame.slot.take();
        if result.is_some() {
            self.phase = Phase::Done;
        }
        result
    }

    /// True once completion has been observed from this handle's side.
    pub fn done(&self) -> bool {
        if self.cached.is_some() || self.phase == Phase::Done {
            return true;
        }

        match self.frame {
            Some(ptr) => unsafe { ptr.as_ref() }.settled.load(Ordering::Acquire),
            None => true,
        }
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.phase {
            Phase::Initial => {
                if this.await_ready() {
                    return Poll::Ready(this.await_resume());
                }

                this.await_suspend(cx.waker());
                Poll::Pending
            }

            Phase::Suspended => {
                let frame = unsafe { this.frame_ptr().as_ref() };

                {
                    // Same critical section the callee takes the waker in, so
                    // a spurious poll can re-register without a lost wakeup.
                    let mut guard = frame.waker.lock();
                    if !frame.settled.load(Ordering::Acquire) {
                        match guard.as_ref() {
                            Some(waker) if waker.will_wake(cx.waker()) => {}
                            _ => *guard = Some(cx.waker().clone()),
                        }
                        return Poll::Pending;
                    }
                }

                Poll::Ready(this.await_resume())
            }

            Phase::Done => {
                if this.cached.is_some() {
                    return Poll::Ready(this.await_resume());
                }
                panic!("Future polled after completion");
            }
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        let Some(ptr) = self.frame else { return };

        if !self.destroy_callee {
            return;
        }

        let frame = unsafe { ptr.as_ref() };
        if frame.settled.load(Ordering::Acquire) {
            // The callee's last store is behind us; we own destruction.
            unsafe { Frame::destroy(ptr) };
        } else if !std::thread::panicking() {
            // Discarding a live, non-detached task. Leak the frame rather
            // than racing the callee for a double destroy.
            debug_assert!(
                false,
                "task discarded while its computation is still pending"
            );
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("phase", &self.phase)
            .field("destroy_callee", &self.destroy_callee)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskOpts, new_detached, new_task};
    use crate::test_utils::mock_waker;
    use anyhow::{Result, anyhow};
    use static_assertions::assert_impl_all;
    use std::sync::Arc;
    use std::thread;

    assert_impl_all!(Task<i32>: Send, Unpin);
    assert_impl_all!(Task<std::marker::PhantomPinned>: Unpin);
    assert_impl_all!(crate::task::Completer<i32>: Send);

    #[test]
    fn test_synchronous_fast_path() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());

        completer.complete(42);

        // Completion beat await_ready: no suspension machinery runs.
        assert!(task.await_ready());
        assert!(task.done());
        assert_eq!(task.await_resume().unwrap(), 42);
    }

    #[test]
    fn test_fast_path_frame_destroyed_once() {
        let probe = Arc::new(());

        let (mut task, completer) = new_task::<Arc<()>>(TaskOpts::empty());
        completer.complete(Arc::clone(&probe));

        assert!(task.await_ready());
        let value = task.await_resume().unwrap();
        assert_eq!(Arc::strong_count(&probe), 2);

        drop(value);
        drop(task);
        assert_eq!(Arc::strong_count(&probe), 1);
    }

    #[test]
    fn test_suspend_then_cross_thread_resume() -> Result<()> {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());
        let (waker, counter) = mock_waker();

        assert!(!task.await_ready());
        task.await_suspend(&waker);
        assert!(!task.done());

        let handle = thread::spawn(move || completer.complete(42));
        handle.join().unwrap();

        // Completion always transfers control to exactly the recorded waker.
        assert_eq!(counter.count(), 1);
        assert!(task.done());
        assert_eq!(task.await_resume()?, 42);
        Ok(())
    }

    #[test]
    fn test_block_on_cross_thread_completion() -> Result<()> {
        let (task, completer) = new_task::<i32>(TaskOpts::empty());

        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            completer.complete(7);
        });

        let got = futures::executor::block_on(task)?;
        handle.join().unwrap();

        assert_eq!(got, 7);
        Ok(())
    }

    #[test]
    fn test_spurious_polls_re_register_waker() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());
        let (waker, counter) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        for _ in 0..5 {
            assert!(Pin::new(&mut task).poll(&mut cx).is_pending());
        }
        assert_eq!(counter.count(), 0);

        completer.complete(9);
        assert_eq!(counter.count(), 1);

        assert!(matches!(
            Pin::new(&mut task).poll(&mut cx),
            Poll::Ready(Ok(9))
        ));
    }

    #[test]
    #[should_panic(expected = "Future polled after completion")]
    fn test_poll_after_completion_panics() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());
        completer.complete(1);

        let (waker, _) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut task).poll(&mut cx).is_ready());
        let _ = Pin::new(&mut task).poll(&mut cx);
    }

    #[test]
    fn test_fault_propagates_lazily() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());

        completer.fail(anyhow!("disk on fire"));

        // Stored at completion time, only observed at the read.
        assert!(task.await_ready());
        let err = task.await_resume().unwrap_err();
        assert!(err.is_fault());
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_panic_captured_into_error_arm() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::empty());

        completer.run(|| panic!("boom"));

        assert!(task.await_ready());
        let err = task.await_resume().unwrap_err();
        assert!(err.is_panic());

        let payload = err.into_panic();
        assert_eq!(*payload.downcast::<&str>().unwrap(), "boom");
    }

    #[test]
    #[should_panic(expected = "fault delivered to a nothrow task")]
    fn test_nothrow_violation_panics() {
        let (task, completer) = new_task::<i32>(TaskOpts::NOTHROW);
        // Leak the handle so its drop assertion cannot mask the panic under test.
        std::mem::forget(task);

        completer.fail(anyhow!("should be fatal"));
    }

    #[test]
    fn test_detached_frame_self_destroys() {
        let probe = Arc::new(());

        let completer = new_detached::<Arc<()>>(TaskOpts::empty());
        completer.complete(Arc::clone(&probe));

        // Nobody reads the slot; the frame destroyed itself, value included.
        assert_eq!(Arc::strong_count(&probe), 1);
    }

    #[test]
    fn test_entry_task_polls_result_without_suspending() {
        let (mut task, completer) = new_task::<i32>(TaskOpts::ENTRY);

        assert!(task.try_result().is_none());
        assert!(!task.done());

        completer.complete(5);

        assert_eq!(task.try_result().unwrap().unwrap(), 5);
        assert!(task.try_result().is_none());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "task discarded while its computation is still pending")]
    fn test_discarding_pending_task_is_a_contract_violation() {
        let (task, _completer) = new_task::<i32>(TaskOpts::empty());
        drop(task);
    }

    // Racing the caller's await decision against the callee's completion.
    // The frame must be destroyed exactly once and the result delivered on
    // every interleaving; the Arc count doubles as a leak/double-free probe.
    #[test]
    fn test_handshake_race_destroys_frame_exactly_once() -> Result<()> {
        let probe = Arc::new(());

        for _ in 0..2000 {
            let (task, completer) = new_task::<Arc<()>>(TaskOpts::empty());

            let value = Arc::clone(&probe);
            let callee = thread::spawn(move || completer.complete(value));

            let got = futures::executor::block_on(task)?;
            assert_eq!(Arc::strong_count(&got), 2);

            callee.join().unwrap();
            drop(got);
            assert_eq!(Arc::strong_count(&probe), 1);
        }

        Ok(())
    }

    #[test]
    fn test_poll_with_non_unpin_result_type() -> Result<()> {
        // The result type pins nothing in the handle; awaiting must not
        // require it to be Unpin.
        let (task, completer) = new_task::<std::marker::PhantomPinned>(TaskOpts::empty());

        let handle = thread::spawn(move || completer.complete(std::marker::PhantomPinned));
        futures::executor::block_on(task)?;
        handle.join().unwrap();
        Ok(())
    }

    #[test]
    fn test_three_op_contract_fast_path_skips_suspension() {
        let (mut task, completer) = new_task::<&str>(TaskOpts::empty());
        completer.complete("done");

        assert!(task.await_ready());
        // await_suspend is never called; destruction was handed off or kept
        // depending on the interleaving, both invisible to the caller.
        assert_eq!(task.get_result().unwrap(), "done");
    }
}
