pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at the hardware trait boundary.
pub type LinkError = Box<dyn std::error::Error + Send + Sync>;

/// Command/response link to a scanning data-acquisition instrument.
///
/// The acquisition core only needs these four operations; byte transport,
/// discovery and retries live below this trait.
pub trait InstrumentLink {
    /// Open the session with the instrument and verify its identity.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Set up the scan list and measurement mode for `channels`, in scan order.
    fn configure(&mut self, channels: &[u16]) -> Result<(), LinkError>;

    /// Trigger one scan and return the raw response line.
    ///
    /// May block for the instrument's full integration time.
    fn scan(&mut self) -> Result<String, LinkError>;

    /// Release the connection. Must be safe to call more than once.
    fn close(&mut self);
}

impl<L: InstrumentLink + ?Sized> InstrumentLink for Box<L> {
    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }
    fn configure(&mut self, channels: &[u16]) -> Result<(), LinkError> {
        (**self).configure(channels)
    }
    fn scan(&mut self) -> Result<String, LinkError> {
        (**self).scan()
    }
    fn close(&mut self) {
        (**self).close()
    }
}
