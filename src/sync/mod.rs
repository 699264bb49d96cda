pub mod spinlock;
pub use spinlock::{Spinlock, SpinlockGuard};

pub(crate) mod slot;
pub(crate) use slot::Slot;
