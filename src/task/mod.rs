mod error;
pub use error::TaskError;

pub(crate) mod frame;
use frame::Frame;

pub(crate) mod state;

mod completer;
pub use completer::Completer;

#[allow(clippy::module_inception)]
mod task;
pub use task::Task;

bitflags::bitflags! {
    /// Task behaviour axes, fixed when the frame is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TaskOpts: u8 {
        /// The error arm of the result slot is never used. Delivering a fault
        /// anyway is a fatal contract breach, not a recoverable error.
        const NOTHROW = 1 << 0;

        /// A root computation: never awaited by another task. Its
        /// caller-state starts in `ControlledDetach` and the handle owns
        /// destruction.
        const ENTRY = 1 << 1;

        /// Nobody owns destruction on behalf of a caller; the frame destroys
        /// itself on completion. Only reachable through [`new_detached`].
        const DETACHED = 1 << 2;
    }
}

/// Creates one frame split into its caller half ([`Task`]) and callee half
/// ([`Completer`]).
pub fn new_task<T>(opts: TaskOpts) -> (Task<T>, Completer<T>) {
    assert!(
        !opts.contains(TaskOpts::DETACHED),
        "detached frames have no awaiting handle, use new_detached"
    );

    let ptr = Frame::allocate(opts);
    (Task::new(ptr), Completer::new(ptr))
}

/// Creates a detached frame: there is no caller handle, and the frame
/// destroys itself when the completer delivers its result.
pub fn new_detached<T>(opts: TaskOpts) -> Completer<T> {
    Completer::new(Frame::allocate(opts | TaskOpts::DETACHED))
}
