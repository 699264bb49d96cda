use crate::resolver::{RawResolver, ResolverVtable};
use crate::sync::Slot;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::NonNull;

static DEFERRED_VTABLE: ResolverVtable = ResolverVtable {
    resolve: deferred_resolve,
};

unsafe fn deferred_resolve(ptr: NonNull<RawResolver>, result: i32) {
    // Safety: repr(C) guarantees the header is the first field.
    let this = unsafe { ptr.cast::<DeferredResolver>().as_ref() };
    this.result.set(result);
}

/// Stores a completion result for later polling by the caller that owns it.
///
/// The holder must keep the resolver alive (and pinned, since its address is
/// the completion tag) until resolution; destroying it before then is a
/// programming error, caught by an assertion in debug builds.
#[repr(C)]
pub struct DeferredResolver {
    raw: RawResolver,

    result: Slot<i32>,

    _pinned: PhantomPinned,
}

impl DeferredResolver {
    pub fn new() -> Self {
        Self {
            raw: RawResolver::new(&DEFERRED_VTABLE),
            result: Slot::new(),
            _pinned: PhantomPinned,
        }
    }

    /// The tag to attach to the submission entry.
    pub fn user_data(self: Pin<&Self>) -> u64 {
        &self.get_ref().raw as *const RawResolver as u64
    }

    /// Empty until the completion record has been resolved.
    pub fn result(&self) -> Option<i32> {
        self.result.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_set()
    }
}

impl Default for DeferredResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredResolver {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        debug_assert!(
            self.result.is_set(),
            "deferred resolver destroyed before it was resolved"
        );
    }
}

impl std::fmt::Debug for DeferredResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredResolver")
            .field("result", &self.result())
            .finish()
    }
}
