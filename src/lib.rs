pub mod resolver;
pub use resolver::{
    CallbackResolver, DeferredResolver, ResolverRef, ResumeResolver, resolve_user_data,
};

pub mod sqe;
pub use sqe::{RingEntry, SqeAwaitable, SubmitLock, SubmitPermit};

pub mod sync;

pub mod task;
pub use task::{Completer, Task, TaskError, TaskOpts, new_detached, new_task};

mod utils;

#[cfg(test)]
mod test_utils;
