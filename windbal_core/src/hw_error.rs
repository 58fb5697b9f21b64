//! Maps `Box<dyn Error>` from the link boundary to typed `AcqError`.
//!
//! `windbal_traits::InstrumentLink` returns boxed errors; with the
//! `hardware-errors` feature the DAQ970A error type is downcast for a precise
//! message, otherwise the error text is carried as-is. Every link failure is
//! a `Connection` error and therefore fatal to a running session.

use crate::error::AcqError;

pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> AcqError {
    #[cfg(feature = "hardware-errors")]
    {
        use windbal_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => {
                    AcqError::Connection("timed out waiting for instrument response".into())
                }
                other => AcqError::Connection(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return AcqError::Connection(format!("I/O: {io}"));
    }
    AcqError::Connection(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_connection_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let mapped = map_link_error(&e);
        assert!(mapped.is_fatal());
        assert_eq!(mapped, AcqError::Connection("I/O: pipe".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_timeout_is_described() {
        let e = windbal_hardware::error::HwError::Timeout;
        let AcqError::Connection(msg) = map_link_error(&e) else {
            panic!("expected Connection");
        };
        assert!(msg.contains("timed out"));
    }
}
