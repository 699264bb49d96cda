use crate::task::frame::Frame;
use crate::task::{TaskError, TaskOpts};
use std::mem::ManuallyDrop;
use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;

/// The callee half of a frame: delivers the result exactly once, then runs
/// the fate decision of the caller-state handshake.
///
/// Completion may happen on any thread. Dropping a completer without
/// completing strands the caller and is a contract violation.
pub struct Completer<T> {
    ptr: NonNull<Frame<T>>,
}

// Safety: the frame only hands the value across threads through its
// spinlock-guarded slot, and the handshake serializes destruction.
unsafe impl<T: Send> Send for Completer<T> {}

impl<T> Completer<T> {
    pub(crate) fn new(ptr: NonNull<Frame<T>>) -> Self {
        Self { ptr }
    }

    pub fn opts(&self) -> TaskOpts {
        // Safety: the frame outlives the completer until settle().
        unsafe { self.ptr.as_ref() }.opts
    }

    /// Publishes a value and resolves who resumes and who destroys the frame.
    pub fn complete(self, value: T) {
        self.settle(Ok(value));
    }

    /// Publishes a fault, to be re-raised when the result is read.
    ///
    /// Panics if the frame is `NOTHROW`: such tasks have no error arm.
    pub fn fail(self, error: anyhow::Error) {
        if self.opts().contains(TaskOpts::NOTHROW) {
            std::mem::forget(self);
            panic!("fault delivered to a nothrow task: {error}");
        }

        self.settle(Err(TaskError::from(error)));
    }

    /// Runs the wrapped computation, capturing an unwind into the error arm.
    ///
    /// A `NOTHROW` frame re-raises the payload on this thread instead of
    /// storing it; the fault is never silently discarded.
    pub fn run<F>(self, f: F)
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => self.complete(value),
            Ok(Err(error)) => self.fail(error),
            Err(payload) => {
                if self.opts().contains(TaskOpts::NOTHROW) {
                    std::mem::forget(self);
                    std::panic::resume_unwind(payload);
                }

                self.settle(Err(TaskError::panic(payload)));
            }
        }
    }

    fn settle(self, result: Result<T, TaskError>) {
        let this = ManuallyDrop::new(self);

        // Safety: settle() consumes the completer, so this is the single
        // completion of this frame.
        unsafe { Frame::complete(this.ptr, result) };
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        // The frame leaks rather than leaving a dangling caller handle.
        debug_assert!(false, "completer dropped without completing its task");
    }
}

impl<T> std::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer").field("opts", &self.opts()).finish()
    }
}
