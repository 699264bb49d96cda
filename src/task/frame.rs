use crate::sync::{Slot, Spinlock};
use crate::task::state::{CallerState, CallerStateCell};
use crate::task::{TaskError, TaskOpts};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

/// The heap-resident state of one suspended computation.
///
/// A frame is shared by exactly two parties: the [`Task`](crate::task::Task)
/// handle (caller side) and the [`Completer`](crate::task::Completer) (callee
/// side), possibly on different threads. It is destroyed exactly once; which
/// side destroys it is decided by the caller-state handshake in
/// [`Frame::complete`].
pub(crate) struct Frame<T> {
    pub(crate) state: CallerStateCell,

    /// Set by the callee as its very last access whenever it leaves the frame
    /// alive. Owners may only read the slot or destroy the frame after
    /// observing this flag.
    pub(crate) settled: AtomicBool,

    /// The caller's recorded continuation. The callee takes it under the lock
    /// so a spuriously re-polling caller can swap in a fresh waker without a
    /// lost wakeup.
    pub(crate) waker: Spinlock<Option<Waker>>,

    pub(crate) slot: Slot<Result<T, TaskError>>,

    pub(crate) opts: TaskOpts,
}

impl<T> Frame<T> {
    pub(crate) fn allocate(opts: TaskOpts) -> NonNull<Frame<T>> {
        let initial = if opts.contains(TaskOpts::DETACHED) {
            CallerState::NoContinue
        } else if opts.contains(TaskOpts::ENTRY) {
            CallerState::ControlledDetach
        } else {
            CallerState::NotReady
        };

        let frame = Box::new(Frame {
            state: CallerStateCell::new(initial),
            settled: AtomicBool::new(false),
            waker: Spinlock::new(None),
            slot: Slot::new(),
            opts,
        });

        // Safety: Box::into_raw never returns null.
        unsafe { NonNull::new_unchecked(Box::into_raw(frame)) }
    }

    /// Frees the frame. Callers must hold the destruction right granted by
    /// the handshake; the frame must not be touched afterwards.
    pub(crate) unsafe fn destroy(ptr: NonNull<Frame<T>>) {
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }

    /// Busy-waits for the callee's final store. Only legal once the result is
    /// known to be on its way: the other side has nothing left but a bounded
    /// sequence of stores, never a syscall.
    pub(crate) fn await_settled(&self) {
        while !self.settled.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    /// Callee-side completion: publish the result, then decide the frame's
    /// fate without a caller-held lock.
    ///
    /// Exactly one of {caller resumes synchronously, callee resumes caller,
    /// callee self-destroys} happens, regardless of which side reaches its
    /// decision point first.
    pub(crate) unsafe fn complete(ptr: NonNull<Frame<T>>, result: Result<T, TaskError>) {
        let frame = unsafe { ptr.as_ref() };

        frame.slot.set(result);

        // A caller that has not queried yet will find the result ready and
        // owns destruction from here on.
        let _ = frame
            .state
            .transition(CallerState::NotReady, CallerState::ControlledDetach);

        loop {
            match frame.state.load(Ordering::Acquire) {
                // The caller is mid-decision and will settle on NoContinue or
                // ReadyToResume within a few stores. This spin is the
                // linearization point of the whole protocol.
                CallerState::QueriedAwaitReady => std::hint::spin_loop(),

                CallerState::ReadyToResume => {
                    // Take the continuation and mark the frame settled inside
                    // the same critical section the caller re-registers in.
                    // The wake itself runs with no frame access left: it may
                    // resume the caller on another thread, and the caller
                    // destroys the frame.
                    let waker = {
                        let mut guard = frame.waker.lock();
                        let waker = guard.take();
                        frame.settled.store(true, Ordering::Release);
                        waker
                    };

                    tracing::trace!("frame complete: resuming recorded waiter");
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                    return;
                }

                CallerState::NoContinue => {
                    // Either the frame is detached, or a racing caller took
                    // the result on the fast path and handed destruction back.
                    tracing::trace!("frame complete: self-destroying");
                    unsafe { Frame::destroy(ptr) };
                    return;
                }

                CallerState::ControlledDetach => {
                    // Entry task or not-yet-queried caller: leave the frame
                    // for its owner.
                    tracing::trace!("frame complete: leaving frame to its owner");
                    frame.settled.store(true, Ordering::Release);
                    return;
                }

                CallerState::NotReady => {
                    unreachable!("NotReady survived the completion transition")
                }
            }
        }
    }
}
