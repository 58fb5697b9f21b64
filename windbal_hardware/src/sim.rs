//! In-process DAQ970A stand-in.
//!
//! Speaks the same SCPI subset as the real instrument so it can sit under a
//! `Daq970Link`: it answers `*IDN?`, remembers the `ROUT:SCAN` list and
//! answers `READ?` with one time-stamped record per scanned channel.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::scpi::ScpiTransport;
use crate::util::parse_scan_list;

pub const SIM_IDN: &str = "Keysight Technologies,DAQ970A,SIM00000,A.03.00";

pub struct SimulatedDaq {
    open: bool,
    scan: Vec<u16>,
    levels: HashMap<u16, f64>,
    noise: f64,
    integration: Duration,
    fail_after: Option<u64>,
    scans: u64,
    rng: u64,
    pending: Option<String>,
    written: Vec<String>,
}

impl Default for SimulatedDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDaq {
    pub fn new() -> Self {
        Self {
            open: false,
            scan: Vec::new(),
            levels: HashMap::new(),
            noise: 2e-6,
            integration: Duration::from_millis(5),
            fail_after: None,
            scans: 0,
            rng: 0x9E37_79B9_7F4A_7C15,
            pending: None,
            written: Vec::new(),
        }
    }

    /// Mean voltage for `channel`; unset channels read a small offset
    /// derived from the channel number.
    pub fn with_level(mut self, channel: u16, volts: f64) -> Self {
        self.levels.insert(channel, volts);
        self
    }

    /// Peak uniform noise added to every reading.
    pub fn with_noise(mut self, volts: f64) -> Self {
        self.noise = volts.abs();
        self
    }

    /// Time `READ?` takes to produce a response.
    pub fn with_integration(mut self, d: Duration) -> Self {
        self.integration = d;
        self
    }

    /// Drop the connection on the scan after `n` successful ones.
    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Commands received so far, in order.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn scan_channels(&self) -> &[u16] {
        &self.scan
    }

    fn next_noise(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let unit = (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11) as f64 / (1u64 << 53) as f64;
        (unit * 2.0 - 1.0) * self.noise
    }

    fn level(&self, ch: u16) -> f64 {
        self.levels
            .get(&ch)
            .copied()
            .unwrap_or_else(|| f64::from(ch % 100) * 1e-5)
    }

    fn read_response(&mut self) -> Result<String> {
        if self.fail_after.is_some_and(|n| self.scans >= n) {
            self.open = false;
            return Err(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "simulated link loss",
            )));
        }
        if !self.integration.is_zero() {
            std::thread::sleep(self.integration);
        }
        self.scans += 1;
        let channels = self.scan.clone();
        let mut records = Vec::with_capacity(channels.len());
        for ch in channels {
            let v = self.level(ch) + self.next_noise();
            let stamp = Local::now().format("%Y,%m,%d,%H,%M,%S%.3f");
            records.push(format!("{v:+.8E},{stamp}"));
        }
        Ok(records.join(","))
    }
}

impl ScpiTransport for SimulatedDaq {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn write_line(&mut self, cmd: &str) -> Result<()> {
        if !self.open {
            return Err(HwError::NotConnected);
        }
        trace!(cmd, "sim >");
        self.written.push(cmd.to_string());
        let cmd = cmd.trim();
        if cmd.eq_ignore_ascii_case("*IDN?") {
            self.pending = Some(SIM_IDN.to_string());
        } else if cmd.eq_ignore_ascii_case("READ?") {
            let resp = self.read_response()?;
            self.pending = Some(resp);
        } else if let Some(list) = cmd.strip_prefix("ROUT:SCAN") {
            self.scan = parse_scan_list(list)
                .ok_or_else(|| HwError::Protocol(format!("bad scan list {list:?}")))?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if !self.open {
            return Err(HwError::NotConnected);
        }
        // A real instrument with nothing queued just never answers.
        self.pending.take().ok_or(HwError::Timeout)
    }

    fn close(&mut self) {
        self.open = false;
        self.pending = None;
    }
}
