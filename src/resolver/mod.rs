//! Completion-delivery strategies for a pending ring submission.
//!
//! A submission entry is tagged with the address of exactly one resolver; the
//! driver loop reconstructs a [`ResolverRef`] from the completion record's
//! user data and fires it once. Three variants cover the three ownership
//! shapes: resume (owned by the suspended frame), deferred (owned by the
//! caller), callback (owns itself on the heap).

pub(crate) mod raw;
pub use raw::{ResolverRef, resolve_user_data};
pub(crate) use raw::{RawResolver, ResolverVtable};

mod resume;
pub use resume::ResumeResolver;

mod deferred;
pub use deferred::DeferredResolver;

mod callback;
pub use callback::CallbackResolver;
