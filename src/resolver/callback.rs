use crate::resolver::{RawResolver, ResolverRef, ResolverVtable};
use std::ptr::NonNull;

static CALLBACK_VTABLE: ResolverVtable = ResolverVtable {
    resolve: callback_resolve,
};

unsafe fn callback_resolve(ptr: NonNull<RawResolver>, result: i32) {
    // Safety: repr(C) guarantees the header is the first field, and the
    // pointer came from Box::into_raw in `CallbackResolver::boxed`. The
    // resolver reclaims its own storage here, which is what makes it safe to
    // fire-and-forget from the submission side.
    let this = unsafe { Box::from_raw(ptr.cast::<CallbackResolver>().as_ptr()) };

    let cb = this.cb;
    cb(result);
}

/// Resolves a completion by invoking a user callback, then frees itself.
///
/// Heap-allocated and single-use: there is no caller-visible handle after
/// attachment, only the tag travelling through the ring.
#[repr(C)]
pub struct CallbackResolver {
    raw: RawResolver,

    cb: Box<dyn FnOnce(i32) + Send + 'static>,
}

impl CallbackResolver {
    /// Allocates the resolver and leaks it as a tag handle; the allocation
    /// is reclaimed inside `resolve`.
    pub fn boxed(cb: impl FnOnce(i32) + Send + 'static) -> ResolverRef {
        let boxed = Box::new(CallbackResolver {
            raw: RawResolver::new(&CALLBACK_VTABLE),
            cb: Box::new(cb),
        });

        // Safety: Box::into_raw never returns null.
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) };
        ResolverRef::from_ptr(ptr.cast())
    }
}

impl std::fmt::Debug for CallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("CallbackResolver")
    }
}
