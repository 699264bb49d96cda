use crate::sync::Spinlock;

/// A write-once result slot guarded by a [`Spinlock`].
///
/// Transitions empty -> occupied exactly once and never reverts. The lock
/// closes the race between the completing side publishing a value and a
/// concurrent reader probing for it; once completion is externally known
/// (through the caller-state handshake) a single read is safe and stable.
pub(crate) struct Slot<T> {
    inner: Spinlock<Option<T>>,
}

impl<T> Slot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            inner: Spinlock::new(None),
        }
    }

    /// Publishes the value. Writing twice breaks the write-once contract.
    pub(crate) fn set(&self, value: T) {
        let mut guard = self.inner.lock();
        debug_assert!(guard.is_none(), "result slot written twice");
        *guard = Some(value);
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.inner.lock().take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T: Copy> Slot<T> {
    pub(crate) fn get(&self) -> Option<T> {
        *self.inner.lock()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("inner", &self.inner).finish()
    }
}
