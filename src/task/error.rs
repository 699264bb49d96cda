use crate::utils::SyncWrapper;
use std::any::Any;

/// The error arm of a task's result slot.
///
/// Captured when the wrapped computation fails, stored at completion time and
/// only observed when the result is actually read. Never constructed for a
/// `NOTHROW` task; delivering a fault to one is a fatal contract breach, not
/// a value of this type.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// The computation reported an explicit failure.
    #[error("task failed: {0}")]
    Fault(#[from] anyhow::Error),

    /// The computation panicked; the unwind payload is carried so the reader
    /// can re-raise it.
    #[error("task panicked")]
    Panic(SyncWrapper<Box<dyn Any + Send + 'static>>),
}

impl TaskError {
    pub(crate) fn panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        TaskError::Panic(SyncWrapper::new(payload))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panic(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, TaskError::Fault(_))
    }

    /// Consumes the error, returning the panic payload.
    ///
    /// Panics if this error is not a captured panic; gate on
    /// [`TaskError::is_panic`] or use [`TaskError::try_into_panic`].
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.try_into_panic()
            .expect("TaskError::into_panic called on a non-panic error")
    }

    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, TaskError> {
        match self {
            TaskError::Panic(payload) => Ok(payload.into_inner()),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TaskError: Send, Sync, std::error::Error);

    #[test]
    fn test_fault_display() {
        let err = TaskError::from(anyhow!("connection reset"));
        assert!(err.is_fault());
        assert!(!err.is_panic());
        assert_eq!(err.to_string(), "task failed: connection reset");
    }

    #[test]
    fn test_panic_payload_roundtrip() {
        let err = TaskError::panic(Box::new("boom"));
        assert!(err.is_panic());

        let payload = err.into_panic();
        assert_eq!(*payload.downcast::<&str>().unwrap(), "boom");
    }

    #[test]
    fn test_try_into_panic_on_fault() {
        let err = TaskError::from(anyhow!("nope"));
        assert!(err.try_into_panic().is_err());
    }
}
