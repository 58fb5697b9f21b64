//! Keysight DAQ970A scanning DMM driver.
//!
//! Readings are returned with absolute time stamps enabled, so every channel
//! in a `READ?` response is the 7-field record
//! `value,year,month,day,hour,minute,second.fraction`.

use tracing::{debug, info};
use windbal_traits::{InstrumentLink, LinkError};

use crate::error::{HwError, Result};
use crate::scpi::ScpiTransport;
use crate::util::scan_list;

/// Measurement settings pushed by `configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Daq970Settings {
    /// Substring required in the `*IDN?` reply.
    pub model: String,
    /// `CONF:VOLT:DC` range argument.
    pub range: String,
    /// `CONF:VOLT:DC` resolution argument.
    pub resolution: String,
}

impl Default for Daq970Settings {
    fn default() -> Self {
        Self {
            model: "DAQ970A".into(),
            range: "1mV".into(),
            resolution: "0.00001".into(),
        }
    }
}

pub struct Daq970Link<T: ScpiTransport> {
    transport: T,
    settings: Daq970Settings,
    idn: Option<String>,
}

impl<T: ScpiTransport> Daq970Link<T> {
    pub fn new(transport: T, settings: Daq970Settings) -> Self {
        Self {
            transport,
            settings,
            idn: None,
        }
    }

    /// `*IDN?` reply from the last successful connect.
    pub fn idn(&self) -> Option<&str> {
        self.idn.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn connected(&mut self) -> Result<&mut T> {
        if self.idn.is_none() {
            return Err(HwError::NotConnected);
        }
        Ok(&mut self.transport)
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open()?;
        self.transport.clear()?;
        let idn = self.transport.query("*IDN?")?;
        if !idn.contains(&self.settings.model) {
            self.transport.close();
            return Err(HwError::UnexpectedInstrument {
                expected: self.settings.model.clone(),
                idn,
            });
        }
        info!(idn = %idn.trim(), "instrument identified");
        self.idn = Some(idn);
        Ok(())
    }

    pub fn apply_channels(&mut self, channels: &[u16]) -> Result<()> {
        let range = self.settings.range.clone();
        let resolution = self.settings.resolution.clone();
        let t = self.connected()?;
        t.write_line("FORM:READ:TIME:TYPE ABS")?;
        t.write_line("FORM:READ:TIME ON")?;
        if channels.is_empty() {
            return Ok(());
        }
        let list = scan_list(channels);
        t.write_line(&format!("CONF:VOLT:DC {range},{resolution},{list}"))?;
        t.write_line(&format!("ROUT:SCAN {list}"))?;
        debug!(channels = channels.len(), list = %list, "scan list configured");
        Ok(())
    }

    pub fn read_scan(&mut self) -> Result<String> {
        self.connected()?.query("READ?")
    }

    pub fn shutdown(&mut self) {
        if self.idn.take().is_some() {
            debug!("closing instrument link");
        }
        self.transport.close();
    }
}

impl<T: ScpiTransport> InstrumentLink for Daq970Link<T> {
    fn connect(&mut self) -> std::result::Result<(), LinkError> {
        Ok(self.open()?)
    }

    fn configure(&mut self, channels: &[u16]) -> std::result::Result<(), LinkError> {
        Ok(self.apply_channels(channels)?)
    }

    fn scan(&mut self) -> std::result::Result<String, LinkError> {
        Ok(self.read_scan()?)
    }

    fn close(&mut self) {
        self.shutdown();
    }
}
