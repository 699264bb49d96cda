use std::ptr::NonNull;

/// One-entry vtable shared by all resolver variants.
pub(crate) struct ResolverVtable {
    /// Delivers the i32 completion result. Fires at most once per resolver
    /// and must be safe to call from any thread.
    pub(crate) resolve: unsafe fn(NonNull<RawResolver>, i32),
}

/// Common header embedded as the first field (`repr(C)`) of every resolver,
/// so that a completion tag can be a thin pointer dispatched without knowing
/// the concrete variant.
#[repr(C)]
pub(crate) struct RawResolver {
    vtable: &'static ResolverVtable,
}

impl RawResolver {
    pub(crate) const fn new(vtable: &'static ResolverVtable) -> Self {
        Self { vtable }
    }
}

/// A thin handle over a tagged resolver, reconstructed by the driver loop
/// from a completion record's user data.
#[derive(Debug)]
pub struct ResolverRef {
    ptr: NonNull<RawResolver>,
}

// Safety: the handle is an opaque address; all mutation behind it goes
// through atomics or a spinlock.
unsafe impl Send for ResolverRef {}

impl ResolverRef {
    pub(crate) fn from_ptr(ptr: NonNull<RawResolver>) -> Self {
        Self { ptr }
    }

    /// Reconstructs the handle from a completion record.
    ///
    /// # Safety
    ///
    /// `user_data` must be the tag of a still-live resolver produced by this
    /// crate, and must not have been resolved yet.
    pub unsafe fn from_user_data(user_data: u64) -> Self {
        debug_assert_ne!(user_data, 0, "completion record with a null tag");
        Self {
            ptr: unsafe { NonNull::new_unchecked(user_data as *mut RawResolver) },
        }
    }

    /// The opaque value to attach to a submission entry.
    pub fn user_data(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Delivers the result through whichever strategy this resolver
    /// implements. Consumes the handle: at most one resolution per tag.
    ///
    /// # Safety
    ///
    /// The resolver behind the tag must still be live. A callback resolver
    /// frees itself inside this call.
    pub unsafe fn resolve(self, result: i32) {
        tracing::trace!(user_data = self.user_data(), result, "resolving completion");

        let resolve = unsafe { self.ptr.as_ref() }.vtable.resolve;
        unsafe { resolve(self.ptr, result) }
    }
}

/// Driver-loop helper: resolve one completion record `{user_data, result}`.
///
/// # Safety
///
/// Same contract as [`ResolverRef::from_user_data`] plus
/// [`ResolverRef::resolve`]: a live, not-yet-resolved tag.
pub unsafe fn resolve_user_data(user_data: u64, result: i32) {
    unsafe { ResolverRef::from_user_data(user_data).resolve(result) }
}
