//! Scripted instrument link for driving the controller without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use windbal_traits::{InstrumentLink, LinkError};

/// Fixed timestamp fields used by [`daq_response`].
const STAMP: &str = "2024,2,18,12,30,45.123";

/// DAQ970A-shaped scan response carrying `values`, one record per channel.
pub fn daq_response(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:+.8E},{STAMP}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone)]
pub enum Step {
    Respond(String),
    Fail(String),
}

/// Call counters shared between a `ScriptedLink` and the test holding it.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub connects: AtomicUsize,
    pub configures: AtomicUsize,
    pub scans: AtomicUsize,
    pub closes: AtomicUsize,
    configured: Mutex<Vec<u16>>,
}

impl LinkStats {
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Channel list from the most recent `configure`.
    pub fn configured(&self) -> Vec<u16> {
        self.configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Plays back scripted scan results, then repeats `fallback` (or fails once
/// the script runs out when no fallback is set).
#[derive(Debug, Default)]
pub struct ScriptedLink {
    script: VecDeque<Step>,
    fallback: Option<Step>,
    delay: Duration,
    fail_connect: bool,
    stats: Arc<LinkStats>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `response`.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::new().then_repeat(response)
    }

    pub fn respond(mut self, response: impl Into<String>) -> Self {
        self.script.push_back(Step::Respond(response.into()));
        self
    }

    pub fn fail(mut self, msg: impl Into<String>) -> Self {
        self.script.push_back(Step::Fail(msg.into()));
        self
    }

    pub fn then_repeat(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(Step::Respond(response.into()));
        self
    }

    /// Block each `scan` for `d` to mimic instrument integration time.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn refuse_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }
}

impl InstrumentLink for ScriptedLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    fn configure(&mut self, channels: &[u16]) -> Result<(), LinkError> {
        self.stats.configures.fetch_add(1, Ordering::SeqCst);
        *self
            .stats
            .configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = channels.to_vec();
        Ok(())
    }

    fn scan(&mut self) -> Result<String, LinkError> {
        self.stats.scans.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let step = self
            .script
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Step::Fail("script exhausted".into()));
        match step {
            Step::Respond(s) => Ok(s),
            Step::Fail(msg) => Err(Box::new(std::io::Error::other(msg))),
        }
    }

    fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    #[test]
    fn daq_response_decodes() {
        let s = decode(&daq_response(&[0.001, -0.5, 3.0]), 3).unwrap();
        assert_eq!(s.values, vec![0.001, -0.5, 3.0]);
    }

    #[test]
    fn script_then_fallback_then_exhaustion() {
        let mut link = ScriptedLink::new().respond("a").fail("boom");
        assert_eq!(link.scan().unwrap(), "a");
        assert!(link.scan().is_err());
        assert!(link.scan().is_err());
        let mut link = ScriptedLink::repeating("x");
        assert_eq!(link.scan().unwrap(), "x");
        assert_eq!(link.scan().unwrap(), "x");
        assert_eq!(link.stats().scans(), 2);
    }
}
