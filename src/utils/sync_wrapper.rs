/// A wrapper that is `Sync` as long as `T` is `Send`.
///
/// Sound because the wrapper hands out no shared access to the inner value:
/// it can only be consumed by value or borrowed mutably, both of which
/// require exclusive ownership. Used to carry panic payloads
/// (`Box<dyn Any + Send>`) inside an error type that must be `Sync`.
pub(crate) struct SyncWrapper<T> {
    value: T,
}

// Safety: an immutable reference to SyncWrapper<T> is useless (no accessor
// takes &self), so sharing it across threads cannot observe T.
unsafe impl<T: Send> Sync for SyncWrapper<T> {}

impl<T> SyncWrapper<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }

    pub(crate) fn into_inner(self) -> T {
        self.value
    }
}

impl<T> std::fmt::Debug for SyncWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("SyncWrapper")
    }
}
