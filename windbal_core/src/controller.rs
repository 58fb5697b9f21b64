//! Acquisition session control.
//!
//! `AcquisitionController` owns the instrument link and the sinks while idle,
//! and moves both into a dedicated sampling thread for the length of a
//! session. The thread hands them back through its `JoinHandle`, so nothing
//! else can talk to the instrument while a session runs.
//!
//! Pause, stop and the session state share one mutex with one condvar. The
//! loop's check-then-wait is done under that lock, so a `resume()` or
//! `stop()` racing with the check cannot be missed.
//!
//! Safety: the sampling thread is always joined, either by `stop()`,
//! `reset()`, `close()` or `Drop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel as xch;
use windbal_traits::clock::{Clock, MonotonicClock};
use windbal_traits::InstrumentLink;

use crate::calibration::{CalibrationModel, Orientation};
use crate::codec::decode;
use crate::error::{AcqError, Report, Result};
use crate::event::{AcqEvent, EventBus};
use crate::hw_error::map_link_error;
use crate::layout::{ChannelSet, ScanLayout};
use crate::sink::{Sample, SampleSink};
use crate::status::AcquisitionState;

/// Runtime knobs for the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionCfg {
    /// Wait between cycles (ms); 0 scans back to back.
    pub interval_ms: u64,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            interval_ms: 1,
            event_capacity: 256,
        }
    }
}

/// Point-in-time view of the current session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionInfo {
    pub state: AcquisitionState,
    /// Wall-clock start of the latest session.
    pub started_at: Option<DateTime<Utc>>,
    pub sample_count: u64,
    pub elapsed: Duration,
}

struct Control {
    state: AcquisitionState,
    paused: bool,
    stop: bool,
    /// When the session stopped or faulted; freezes `elapsed`.
    ended: Option<Instant>,
}

struct Shared {
    ctl: Mutex<Control>,
    cv: Condvar,
    sample_count: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.ctl.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Sinks = Vec<Box<dyn SampleSink>>;

fn rejected(e: AcqError) -> Report {
    Report::new(e)
}

pub struct AcquisitionController<L, C = MonotonicClock>
where
    L: InstrumentLink + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    link: Option<L>,
    connected: bool,
    channels: ChannelSet,
    layout: ScanLayout,
    calibration: Arc<CalibrationModel>,
    sinks: Sinks,
    cfg: AcquisitionCfg,
    clock: Arc<C>,
    shared: Arc<Shared>,
    events: EventBus,
    events_rx: xch::Receiver<AcqEvent>,
    worker: Option<JoinHandle<(L, Sinks)>>,
    started_at: Option<DateTime<Utc>>,
    epoch: Option<Instant>,
}

impl<L> AcquisitionController<L, MonotonicClock>
where
    L: InstrumentLink + Send + 'static,
{
    pub fn new(link: L, calibration: CalibrationModel, cfg: AcquisitionCfg) -> Self {
        Self::with_clock(link, calibration, cfg, MonotonicClock::new())
    }
}

impl<L, C> AcquisitionController<L, C>
where
    L: InstrumentLink + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn with_clock(link: L, calibration: CalibrationModel, cfg: AcquisitionCfg, clock: C) -> Self {
        let (events, events_rx) = EventBus::bounded(cfg.event_capacity);
        Self {
            link: Some(link),
            connected: false,
            channels: ChannelSet::default(),
            layout: ScanLayout::default(),
            calibration: Arc::new(calibration),
            sinks: Vec::new(),
            cfg,
            clock: Arc::new(clock),
            shared: Arc::new(Shared {
                ctl: Mutex::new(Control {
                    state: AcquisitionState::Idle,
                    paused: false,
                    stop: false,
                    ended: None,
                }),
                cv: Condvar::new(),
                sample_count: AtomicU64::new(0),
            }),
            events,
            events_rx,
            worker: None,
            started_at: None,
            epoch: None,
        }
    }

    // ── observers ────────────────────────────────────────────────────────────

    pub fn state(&self) -> AcquisitionState {
        self.shared.lock().state
    }

    pub fn sample_count(&self) -> u64 {
        self.shared.sample_count.load(Ordering::Acquire)
    }

    /// Elapsed time runs from `start()` until the session stops or faults.
    pub fn session(&self) -> SessionInfo {
        let (state, ended) = {
            let ctl = self.shared.lock();
            (ctl.state, ctl.ended)
        };
        let now = ended.unwrap_or_else(|| self.clock.now());
        SessionInfo {
            state,
            started_at: self.started_at,
            sample_count: self.sample_count(),
            elapsed: self
                .epoch
                .map(|e| now.saturating_duration_since(e))
                .unwrap_or_default(),
        }
    }

    /// Receiver for error and state events. Clones share one queue.
    pub fn events(&self) -> xch::Receiver<AcqEvent> {
        self.events_rx.clone()
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn layout(&self) -> &ScanLayout {
        &self.layout
    }

    pub fn orientation(&self) -> Orientation {
        self.calibration.orientation()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ── configuration ────────────────────────────────────────────────────────

    /// Open the link and push the current channel set, if any.
    pub fn connect(&mut self) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(rejected(AcqError::InvalidStateTransition { op: "connect", state }));
        }
        self.reclaim();
        let channels = self.channels.channels();
        let link = self.link_mut()?;
        link.connect().map_err(|e| rejected(map_link_error(&*e)))?;
        if !channels.is_empty() {
            link.configure(&channels)
                .map_err(|e| rejected(map_link_error(&*e)))?;
        }
        self.connected = true;
        tracing::info!(channels = channels.len(), "instrument connected");
        Ok(())
    }

    /// Replace the channel configuration. Rejected while a session is active.
    pub fn set_channels(&mut self, channels: ChannelSet) -> Result<()> {
        if self.state().is_active() {
            return Err(rejected(AcqError::ConfigurationBusy));
        }
        self.reclaim();
        let layout = channels.layout();
        if !self.sinks.iter().all(|s| s.accepts_layout(&layout)) {
            return Err(rejected(AcqError::Config(
                "a registered sample log is bound to the previous channel layout".into(),
            )));
        }
        if self.connected {
            let ids = channels.channels();
            let link = self.link_mut()?;
            if let Err(e) = link.configure(&ids) {
                self.connected = false;
                return Err(rejected(map_link_error(&*e)));
            }
        }
        self.calibration.set_orientation(channels.orientation());
        self.layout = layout;
        tracing::info!(
            total = self.layout.len(),
            orientation = %channels.orientation(),
            "channel layout resolved"
        );
        self.channels = channels;
        Ok(())
    }

    /// Switch the calibration preset; applies from the next sample.
    pub fn set_orientation(&self, orientation: Orientation) {
        self.calibration.set_orientation(orientation);
    }

    /// Register a sink; dispatch follows registration order.
    pub fn add_sink(&mut self, sink: impl SampleSink + 'static) -> Result<()> {
        if self.state().is_active() {
            return Err(rejected(AcqError::ConfigurationBusy));
        }
        self.reclaim();
        self.sinks.push(Box::new(sink));
        Ok(())
    }

    // ── session control ──────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if !matches!(state, AcquisitionState::Idle | AcquisitionState::Stopped) {
            return Err(rejected(AcqError::InvalidStateTransition { op: "start", state }));
        }
        if self.channels.is_empty() {
            return Err(rejected(AcqError::Config("no channels configured".into())));
        }
        self.reclaim();
        if !self.connected {
            return Err(rejected(AcqError::Connection("instrument not connected".into())));
        }
        let link = self
            .link
            .take()
            .ok_or_else(|| rejected(AcqError::Connection("instrument link unavailable".into())))?;
        let sinks = std::mem::take(&mut self.sinks);

        let epoch = self.clock.now();
        self.epoch = Some(epoch);
        self.started_at = Some(Utc::now());
        self.shared.sample_count.store(0, Ordering::Release);
        {
            let mut ctl = self.shared.lock();
            ctl.state = AcquisitionState::Running;
            ctl.paused = false;
            ctl.stop = false;
            ctl.ended = None;
        }
        // Announce before the worker exists, so its events can only follow.
        self.events.emit(AcqEvent::State(AcquisitionState::Running));

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            calibration: Arc::clone(&self.calibration),
            layout: self.layout.clone(),
            events: self.events.clone(),
            clock: Arc::clone(&self.clock),
            interval: crate::util::interval(self.cfg.interval_ms),
            epoch,
        };
        let spawned = std::thread::Builder::new()
            .name("windbal-acq".into())
            .spawn(move || worker.run(link, sinks));
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                // The closure, link included, is gone with the failed spawn.
                self.connected = false;
                {
                    let mut ctl = self.shared.lock();
                    ctl.state = AcquisitionState::Faulted;
                    ctl.ended = Some(self.clock.now());
                }
                self.events.emit(AcqEvent::State(AcquisitionState::Faulted));
                return Err(Report::new(e).wrap_err("spawn acquisition thread"));
            }
        }
        tracing::info!(
            channels = self.layout.len(),
            interval_ms = self.cfg.interval_ms,
            "acquisition started"
        );
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.toggle_pause("pause", AcquisitionState::Running, AcquisitionState::Paused)
    }

    pub fn resume(&self) -> Result<()> {
        self.toggle_pause("resume", AcquisitionState::Paused, AcquisitionState::Running)
    }

    fn toggle_pause(
        &self,
        op: &'static str,
        from: AcquisitionState,
        to: AcquisitionState,
    ) -> Result<()> {
        {
            let mut ctl = self.shared.lock();
            if ctl.state != from {
                return Err(rejected(AcqError::InvalidStateTransition {
                    op,
                    state: ctl.state,
                }));
            }
            ctl.state = to;
            ctl.paused = to == AcquisitionState::Paused;
        }
        self.shared.cv.notify_all();
        tracing::info!(op, "acquisition {to}");
        self.events.emit(AcqEvent::State(to));
        Ok(())
    }

    /// End the session and wait for the sampling thread. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        let state = self.state();
        if state == AcquisitionState::Idle {
            return Err(rejected(AcqError::InvalidStateTransition { op: "stop", state }));
        }
        let now = self.clock.now();
        {
            let mut ctl = self.shared.lock();
            ctl.stop = true;
            ctl.paused = false;
            ctl.ended.get_or_insert(now);
        }
        self.shared.cv.notify_all();
        self.reclaim();

        let mut ctl = self.shared.lock();
        if ctl.state.is_active() {
            ctl.state = AcquisitionState::Stopped;
            drop(ctl);
            tracing::info!(samples = self.sample_count(), "acquisition stopped");
            self.events.emit(AcqEvent::State(AcquisitionState::Stopped));
        }
        Ok(())
    }

    /// Return a `Faulted` or `Stopped` controller to `Idle`.
    pub fn reset(&mut self) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(rejected(AcqError::InvalidStateTransition { op: "reset", state }));
        }
        self.reclaim();
        {
            let mut ctl = self.shared.lock();
            ctl.state = AcquisitionState::Idle;
            ctl.paused = false;
            ctl.stop = false;
        }
        if state != AcquisitionState::Idle {
            self.events.emit(AcqEvent::State(AcquisitionState::Idle));
        }
        Ok(())
    }

    /// Stop any session and release the instrument.
    pub fn close(&mut self) {
        if self.state() != AcquisitionState::Idle {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "stop during close failed");
            }
        }
        self.reclaim();
        if let Some(link) = self.link.as_mut() {
            link.close();
        }
        self.connected = false;
    }

    fn link_mut(&mut self) -> Result<&mut L> {
        self.link
            .as_mut()
            .ok_or_else(|| rejected(AcqError::Connection("instrument link unavailable".into())))
    }

    /// Join a finished or stopping sampling thread and take back the link and
    /// sinks. A faulted session leaves the link disconnected.
    fn reclaim(&mut self) {
        let Some(handle) = self.worker.take() else { return };
        match handle.join() {
            Ok((link, sinks)) => {
                self.link = Some(link);
                self.sinks = sinks;
                if self.state() == AcquisitionState::Faulted {
                    self.connected = false;
                }
            }
            Err(e) => {
                tracing::error!(?e, "acquisition thread panicked");
                self.connected = false;
                let now = self.clock.now();
                let mut ctl = self.shared.lock();
                ctl.state = AcquisitionState::Faulted;
                ctl.ended.get_or_insert(now);
            }
        }
    }
}

impl<L, C> Drop for AcquisitionController<L, C>
where
    L: InstrumentLink + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the sampling thread needs besides the link and sinks.
struct Worker<C> {
    shared: Arc<Shared>,
    calibration: Arc<CalibrationModel>,
    layout: ScanLayout,
    events: EventBus,
    clock: Arc<C>,
    interval: Duration,
    epoch: Instant,
}

impl<C: Clock> Worker<C> {
    fn run<L: InstrumentLink>(self, mut link: L, mut sinks: Sinks) -> (L, Sinks) {
        let total = self.layout.len();
        loop {
            if !self.wait_while_paused() {
                tracing::debug!("acquisition thread received stop");
                break;
            }

            let response = match link.scan() {
                Ok(r) => r,
                Err(e) => {
                    self.events.emit(AcqEvent::Fatal(map_link_error(&*e)));
                    {
                        let mut ctl = self.shared.lock();
                        ctl.state = AcquisitionState::Faulted;
                        ctl.ended = Some(self.clock.now());
                    }
                    self.events.emit(AcqEvent::State(AcquisitionState::Faulted));
                    break;
                }
            };

            match self.build_sample(&response, total) {
                Ok(sample) => {
                    for sink in &mut sinks {
                        sink.append(&sample);
                    }
                    self.shared.sample_count.store(sample.seq, Ordering::Release);
                }
                Err(e) => self.events.emit(AcqEvent::Recoverable(e)),
            }

            if !self.wait_interval() {
                break;
            }
        }
        tracing::trace!("acquisition thread exiting");
        (link, sinks)
    }

    fn build_sample(&self, response: &str, total: usize) -> std::result::Result<Sample, AcqError> {
        let raw = decode(response, total)?;
        let grouped = self.layout.split(&raw.values, &raw.timestamps)?;
        let force = grouped.sting_triplet().map(|r| self.calibration.calibrate(r));
        Ok(Sample {
            seq: self.shared.sample_count.load(Ordering::Acquire) + 1,
            elapsed_s: self.clock.secs_since(self.epoch),
            raw: grouped,
            force,
        })
    }

    /// Block while paused. Returns false when the session should end.
    fn wait_while_paused(&self) -> bool {
        let mut ctl = self.shared.lock();
        while ctl.paused && !ctl.stop {
            ctl = self
                .shared
                .cv
                .wait(ctl)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !ctl.stop
    }

    /// Inter-sample wait, cut short by `stop()`. Returns false on stop.
    fn wait_interval(&self) -> bool {
        let ctl = self.shared.lock();
        if self.interval.is_zero() || ctl.stop {
            return !ctl.stop;
        }
        let (ctl, _) = self
            .shared
            .cv
            .wait_timeout_while(ctl, self.interval, |c| !c.stop)
            .unwrap_or_else(PoisonError::into_inner);
        !ctl.stop
    }
}
