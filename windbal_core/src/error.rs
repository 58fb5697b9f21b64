use thiserror::Error;

use crate::status::AcquisitionState;

/// Failure to turn one scan response into a `RawSample`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed scan response: expected {expected} fields, got {found}")]
    MalformedRecord { expected: usize, found: usize },
    #[error("invalid number in record {record}, field {field}: {text:?}")]
    InvalidNumber {
        record: usize,
        field: &'static str,
        text: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcqError {
    #[error("instrument connection error: {0}")]
    Connection(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("layout mismatch: configured {expected} channels, scan carried {found}")]
    LayoutMismatch { expected: usize, found: usize },
    #[error("channel configuration is busy while acquisition is active")]
    ConfigurationBusy,
    #[error("cannot {op} while {state}")]
    InvalidStateTransition {
        op: &'static str,
        state: AcquisitionState,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

impl AcqError {
    /// Fatal errors end the session; everything else skips one cycle or
    /// rejects one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
