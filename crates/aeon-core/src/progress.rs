//! Poll result for cooperative state machines.

/// Outcome of one poll of a step-driven state machine.
///
/// `Pending` means the machine is parked waiting on external input or a
/// deadline and the driver should poll again later; `Ready` carries the
/// state the machine just moved into. Handlers never sleep, so a driver
/// owns all pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<T> {
    /// Nothing changed; poll again later.
    Pending,
    /// The machine advanced into the contained state.
    Ready(T),
}

impl<T> Progress<T> {
    /// Whether this poll made no progress.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether this poll advanced the machine.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The reached state, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Pending => None,
            Self::Ready(state) => Some(state),
        }
    }

    /// Map the reached state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Self::Pending => Progress::Pending,
            Self::Ready(state) => Progress::Ready(f(state)),
        }
    }
}
