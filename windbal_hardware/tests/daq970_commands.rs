use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rstest::rstest;
use windbal_hardware::error::{HwError, Result};
use windbal_hardware::{Daq970Link, Daq970Settings, ScpiTransport, SimulatedDaq};
use windbal_traits::InstrumentLink;

/// Transport that logs every command and replays canned replies.
#[derive(Clone, Default)]
struct Recording {
    log: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<VecDeque<String>>>,
}

impl Recording {
    fn with_replies(replies: &[&str]) -> Self {
        let r = Self::default();
        r.replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|s| (*s).to_string()));
        r
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ScpiTransport for Recording {
    fn open(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<open>".into());
        Ok(())
    }
    fn clear(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<clear>".into());
        Ok(())
    }
    fn write_line(&mut self, cmd: &str) -> Result<()> {
        self.log.lock().unwrap().push(cmd.to_string());
        Ok(())
    }
    fn read_line(&mut self) -> Result<String> {
        self.replies.lock().unwrap().pop_front().ok_or(HwError::Timeout)
    }
    fn close(&mut self) {
        self.log.lock().unwrap().push("<close>".into());
    }
}

const IDN: &str = "Keysight Technologies,DAQ970A,MY58000000,A.02.02-01.00-02.01-00.02-04-01";

#[test]
fn connect_configure_scan_sequence() {
    let t = Recording::with_replies(&[IDN, "0.1,2024,2,18,12,30,45.123"]);
    let mut link = Daq970Link::new(t.clone(), Daq970Settings::default());
    link.connect().unwrap();
    link.configure(&[304, 305]).unwrap();
    let resp = link.scan().unwrap();
    link.close();

    assert_eq!(resp, "0.1,2024,2,18,12,30,45.123");
    assert_eq!(
        t.log(),
        vec![
            "<open>",
            "<clear>",
            "*IDN?",
            "FORM:READ:TIME:TYPE ABS",
            "FORM:READ:TIME ON",
            "CONF:VOLT:DC 1mV,0.00001,(@304,@305)",
            "ROUT:SCAN (@304,@305)",
            "READ?",
            "<close>",
        ]
    );
}

#[test]
fn empty_channel_list_only_sets_time_format() {
    let t = Recording::with_replies(&[IDN]);
    let mut link = Daq970Link::new(t.clone(), Daq970Settings::default());
    link.connect().unwrap();
    link.configure(&[]).unwrap();
    assert_eq!(
        &t.log()[3..],
        &["FORM:READ:TIME:TYPE ABS", "FORM:READ:TIME ON"]
    );
}

#[test]
fn custom_range_and_resolution_are_sent() {
    let t = Recording::with_replies(&[IDN]);
    let settings = Daq970Settings {
        range: "100mV".into(),
        resolution: "MAX".into(),
        ..Daq970Settings::default()
    };
    let mut link = Daq970Link::new(t.clone(), settings);
    link.connect().unwrap();
    link.configure(&[101]).unwrap();
    assert!(t.log().contains(&"CONF:VOLT:DC 100mV,MAX,(@101)".to_string()));
}

#[rstest]
#[case("Keysight Technologies,34970A,MY1,1.0")]
#[case("")]
fn wrong_instrument_is_rejected(#[case] idn: &str) {
    let t = Recording::with_replies(&[idn]);
    let mut link = Daq970Link::new(t.clone(), Daq970Settings::default());
    let err = link.connect().unwrap_err();
    let hw = err.downcast_ref::<HwError>().unwrap();
    assert!(matches!(hw, HwError::UnexpectedInstrument { .. }));
    assert_eq!(t.log().last().map(String::as_str), Some("<close>"));
    assert!(link.idn().is_none());
}

#[test]
fn no_idn_reply_is_timeout() {
    let mut link = Daq970Link::new(Recording::default(), Daq970Settings::default());
    let err = link.connect().unwrap_err();
    assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
}

#[test]
fn commands_before_connect_are_refused() {
    let t = Recording::default();
    let mut link = Daq970Link::new(t.clone(), Daq970Settings::default());
    assert!(link.configure(&[1]).is_err());
    assert!(link.scan().is_err());
    assert!(t.log().is_empty());
}

#[test]
fn simulator_answers_full_command_path() {
    let sim = SimulatedDaq::new()
        .with_integration(std::time::Duration::ZERO)
        .with_level(301, 2.5e-4)
        .with_noise(0.0);
    let mut link = Daq970Link::new(sim, Daq970Settings::default());
    link.connect().unwrap();
    link.configure(&[301, 302, 303]).unwrap();
    assert_eq!(link.transport().scan_channels(), &[301, 302, 303]);
    let resp = link.scan().unwrap();
    assert_eq!(resp.split(',').count(), 21);
    assert!(resp.starts_with("+2.50000000E-4,"));
    link.close();
    assert!(link.scan().is_err());
}
