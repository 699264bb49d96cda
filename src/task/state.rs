use std::sync::atomic::{AtomicU8, Ordering};

/// The synchronization variable arbitrating which of {caller, callee} resumes
/// and which destroys a suspended frame.
///
/// Exactly one frame owns one cell. It is mutated by both the callee (on
/// completion) and the caller (when deciding whether to wait), possibly from
/// different threads, so every transition is an atomic store/CAS. The only
/// wait in the protocol is the callee spinning while the caller sits in
/// `QueriedAwaitReady`, which is bounded by a handful of stores on the caller
/// side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CallerState {
    /// The caller has not reached its await-ready decision yet.
    NotReady = 0,

    /// The caller is mid-decision: it has queried readiness and will settle
    /// on either `NoContinue` or `ReadyToResume` within a few stores.
    QueriedAwaitReady = 1,

    /// A continuation is recorded; the callee transfers control to it on
    /// completion and the caller destroys the frame afterwards.
    ReadyToResume = 2,

    /// The callee does not continue to the caller and destroys the frame
    /// itself.
    NoContinue = 3,

    /// The callee neither continues nor destroys; an external owner (the
    /// entry task handle, or a caller that raced the fast path) destroys the
    /// frame later.
    ControlledDetach = 4,
}

impl CallerState {
    fn from_u8(raw: u8) -> CallerState {
        match raw {
            0 => CallerState::NotReady,
            1 => CallerState::QueriedAwaitReady,
            2 => CallerState::ReadyToResume,
            3 => CallerState::NoContinue,
            4 => CallerState::ControlledDetach,
            _ => unreachable!("invalid caller state: {raw}"),
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallerState::ReadyToResume | CallerState::NoContinue | CallerState::ControlledDetach
        )
    }
}

#[derive(Debug)]
pub(crate) struct CallerStateCell(AtomicU8);

impl CallerStateCell {
    pub(crate) fn new(initial: CallerState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub(crate) fn load(&self, order: Ordering) -> CallerState {
        CallerState::from_u8(self.0.load(order))
    }

    pub(crate) fn store(&self, state: CallerState, order: Ordering) {
        self.0.store(state as u8, order);
    }

    /// Single-shot CAS; on failure returns the state actually observed.
    pub(crate) fn transition(
        &self,
        from: CallerState,
        to: CallerState,
    ) -> Result<(), CallerState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(CallerState::from_u8)
    }
}
