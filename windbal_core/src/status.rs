//! Acquisition session state.

use std::fmt;

/// Lifecycle of one controller's acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionState {
    /// No session; channels and sinks may be changed.
    Idle,
    /// Sampling loop is scanning.
    Running,
    /// Sampling loop is parked until resumed or stopped.
    Paused,
    /// Session ended by `stop()`; may be started again.
    Stopped,
    /// Session ended by an unrecoverable link error; needs `reset()`.
    Faulted,
}

impl AcquisitionState {
    /// True while a sampling thread exists for this session.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}
