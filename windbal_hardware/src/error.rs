use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("instrument response timeout")]
    Timeout,
    #[error("instrument not connected")]
    NotConnected,
    #[error("unexpected instrument: expected {expected:?} in *IDN? reply, got {idn:?}")]
    UnexpectedInstrument { expected: String, idn: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
