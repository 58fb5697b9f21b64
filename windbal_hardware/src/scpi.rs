//! Line-oriented SCPI transport.

use crate::error::Result;

/// Byte-level command channel to an instrument. One command or response per
/// newline-terminated line.
pub trait ScpiTransport: Send {
    fn open(&mut self) -> Result<()>;
    /// Reset the instrument's interface state before the first query.
    fn clear(&mut self) -> Result<()>;
    fn write_line(&mut self, cmd: &str) -> Result<()>;
    /// Next response line without its terminator.
    fn read_line(&mut self) -> Result<String>;
    fn close(&mut self);

    fn query(&mut self, cmd: &str) -> Result<String> {
        self.write_line(cmd)?;
        self.read_line()
    }
}
