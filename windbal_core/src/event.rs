//! Observer notifications from the sampling loop.

use crossbeam_channel as xch;

use crate::error::AcqError;
use crate::status::AcquisitionState;

#[derive(Debug, Clone, PartialEq)]
pub enum AcqEvent {
    /// A cycle was skipped; the session continues.
    Recoverable(AcqError),
    /// The session ended in `Faulted`.
    Fatal(AcqError),
    /// The controller entered a new state.
    State(AcquisitionState),
}

impl AcqEvent {
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::State(_))
    }
}

/// Non-blocking event publisher. A lagging observer loses events; the loop
/// never waits on it.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: xch::Sender<AcqEvent>,
}

impl EventBus {
    pub(crate) fn bounded(capacity: usize) -> (Self, xch::Receiver<AcqEvent>) {
        let (tx, rx) = xch::bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, ev: AcqEvent) {
        match &ev {
            AcqEvent::Recoverable(AcqError::LayoutMismatch { expected, found }) => {
                tracing::error!(expected, found, "scan does not match channel layout; sample skipped");
            }
            AcqEvent::Recoverable(e) => tracing::warn!(error = %e, "sample skipped"),
            AcqEvent::Fatal(e) => tracing::error!(error = %e, "acquisition faulted"),
            AcqEvent::State(s) => tracing::debug!(state = %s, "acquisition state"),
        }
        if let Err(xch::TrySendError::Full(dropped)) = self.tx.try_send(ev) {
            tracing::trace!(?dropped, "event channel full; dropping");
        }
    }
}
