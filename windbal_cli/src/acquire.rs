//! Session assembly and execution: config mapping, link selection, run loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde_json::json;
use windbal_config::Config;
use windbal_core::{
    AcqError, AcqEvent, AcquisitionCfg, AcquisitionController, AcquisitionState,
    CalibrationMatrixSet, CalibrationModel, ChannelSet, CsvLogger, LiveBuffer, Orientation,
    Report, decode,
};
use windbal_hardware::{Daq970Link, Daq970Settings, SimulatedDaq, TcpTransport};
use windbal_traits::InstrumentLink;

use crate::cli::json_mode;

pub type BoxedLink = Box<dyn InstrumentLink + Send>;

/// Make the simulator drop the link after N scans (integration tests).
const SIM_FAIL_ENV: &str = "WINDBAL_SIM_FAIL_AFTER";

const TICK: Duration = Duration::from_millis(50);
const REPORT_EVERY: Duration = Duration::from_secs(1);

pub struct AcquireOpts {
    pub duration: Option<Duration>,
    pub orientation: Option<Orientation>,
    pub sim: bool,
    pub stats: bool,
}

#[derive(Debug)]
pub struct AcquireSummary {
    pub samples: u64,
    pub skipped: u64,
    pub elapsed: Duration,
    pub log_path: Option<PathBuf>,
    pub last_force: Option<[f64; 3]>,
    pub orientation: Orientation,
}

fn settings(cfg: &Config) -> Daq970Settings {
    Daq970Settings {
        model: cfg.instrument.model.clone(),
        range: cfg.instrument.range.clone(),
        resolution: cfg.instrument.resolution.clone(),
    }
}

/// TCP DAQ970A when an address is configured and `--sim` is not given,
/// otherwise the simulator behind the same command path.
pub fn build_link(cfg: &Config, sim: bool) -> BoxedLink {
    match (&cfg.instrument.address, sim) {
        (Some(addr), false) => {
            tracing::info!(addr = %addr, "using DAQ970A over TCP");
            let t = TcpTransport::new(addr.clone(), Duration::from_millis(cfg.instrument.timeout_ms));
            Box::new(Daq970Link::new(t, settings(cfg)))
        }
        _ => {
            tracing::info!("using simulated DAQ970A");
            let mut daq = SimulatedDaq::new();
            if let Some(n) = std::env::var(SIM_FAIL_ENV)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                daq = daq.fail_after(n);
            }
            Box::new(Daq970Link::new(daq, settings(cfg)))
        }
    }
}

fn channel_set(cfg: &Config) -> eyre::Result<ChannelSet> {
    ChannelSet::try_from(&cfg.channels)
        .map_err(Report::new)
        .wrap_err("invalid configuration: channels")
}

pub fn run_acquire(
    cfg: &Config,
    opts: &AcquireOpts,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<AcquireSummary> {
    let channels = channel_set(cfg)?;
    let matrices = CalibrationMatrixSet::from(&cfg.calibration);
    let calibration = CalibrationModel::new(matrices, channels.orientation());
    let mut ctl = AcquisitionController::new(
        build_link(cfg, opts.sim),
        calibration,
        AcquisitionCfg::from(&cfg.acquisition),
    );
    ctl.set_channels(channels)?;
    if let Some(o) = opts.orientation {
        ctl.set_orientation(o);
    }

    let live = LiveBuffer::new(cfg.acquisition.live_window);
    let view = live.view();
    ctl.add_sink(live)?;
    let log_path = if cfg.log.enabled {
        let dir = PathBuf::from(&cfg.log.dir);
        let log = CsvLogger::in_dir(&dir, cfg.log.flush_every)
            .wrap_err_with(|| format!("open sample log in {}", dir.display()))?;
        let path = log.path().to_path_buf();
        ctl.add_sink(log)?;
        Some(path)
    } else {
        None
    };

    ctl.connect().wrap_err("connect to instrument")?;
    let events = ctl.events();
    ctl.start()?;

    let t0 = Instant::now();
    let mut next_report = t0 + REPORT_EVERY;
    let mut skipped = 0u64;
    let mut fatal: Option<AcqError> = None;
    loop {
        std::thread::sleep(TICK);
        for ev in events.try_iter() {
            match ev {
                AcqEvent::Recoverable(_) => skipped += 1,
                AcqEvent::Fatal(e) => fatal = Some(e),
                AcqEvent::State(_) => {}
            }
        }
        if ctl.state() == AcquisitionState::Faulted {
            break;
        }
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("interrupted; stopping");
            break;
        }
        if opts.duration.is_some_and(|d| t0.elapsed() >= d) {
            break;
        }
        if Instant::now() >= next_report {
            next_report += REPORT_EVERY;
            report_progress(&view, ctl.sample_count());
        }
    }
    ctl.stop()?;
    // Late events from the final cycles.
    for ev in events.try_iter() {
        match ev {
            AcqEvent::Recoverable(_) => skipped += 1,
            AcqEvent::Fatal(e) => fatal = Some(e),
            AcqEvent::State(_) => {}
        }
    }
    if ctl.state() == AcquisitionState::Faulted {
        let e = fatal.unwrap_or_else(|| AcqError::Connection("session faulted".into()));
        return Err(Report::new(e).wrap_err(format!(
            "acquisition faulted after {} samples",
            ctl.sample_count()
        )));
    }

    let summary = AcquireSummary {
        samples: ctl.sample_count(),
        skipped,
        elapsed: ctl.session().elapsed,
        log_path,
        last_force: view.latest().and_then(|s| s.force),
        orientation: ctl.orientation(),
    };
    ctl.close();
    Ok(summary)
}

fn report_progress(view: &windbal_core::LiveView, count: u64) {
    let Some(s) = view.latest() else { return };
    if json_mode() {
        println!(
            "{}",
            json!({ "seq": s.seq, "elapsed_s": s.elapsed_s, "samples": count, "force": s.force })
        );
    } else if let Some([fx, fy, fz]) = s.force {
        println!(
            "t={:>8.2}s  n={count:<8}  F = [{fx:+10.4}, {fy:+10.4}, {fz:+10.4}]",
            s.elapsed_s
        );
    } else {
        println!("t={:>8.2}s  n={count:<8}  (no force: sting needs 3 channels)", s.elapsed_s);
    }
}

pub fn print_summary(s: &AcquireSummary, stats: bool) {
    let rate = windbal_core::util::rate_hz(s.samples, s.elapsed);
    if json_mode() {
        println!(
            "{}",
            json!({
                "samples": s.samples,
                "skipped": s.skipped,
                "elapsed_s": s.elapsed.as_secs_f64(),
                "rate_hz": rate,
                "orientation": s.orientation.name(),
                "force": s.last_force,
                "log": s.log_path.as_ref().map(|p| p.display().to_string()),
            })
        );
        return;
    }
    println!("acquisition complete: {} samples", s.samples);
    if let Some(p) = &s.log_path {
        println!("log: {}", p.display());
    }
    if let Some([fx, fy, fz]) = s.last_force {
        println!("last force ({}): [{fx:+.4}, {fy:+.4}, {fz:+.4}]", s.orientation);
    }
    if stats {
        eprintln!("\n--- Acquisition Stats ---");
        eprintln!("Samples: {}", s.samples);
        eprintln!("Skipped (decode/layout): {}", s.skipped);
        eprintln!("Elapsed (s): {:.3}", s.elapsed.as_secs_f64());
        eprintln!("Rate (Hz): {rate:.1}");
        eprintln!("-------------------------\n");
    }
}

/// Connect, configure, take one scan, decode it, close.
pub fn run_self_check(cfg: &Config, sim: bool) -> eyre::Result<()> {
    let channels = channel_set(cfg)?;
    let ids = channels.channels();
    let mut link = build_link(cfg, sim);
    let map = |e: windbal_traits::LinkError| Report::new(windbal_core::hw_error::map_link_error(&*e));
    link.connect().map_err(map).wrap_err("connect to instrument")?;
    let result = link
        .configure(&ids)
        .and_then(|()| link.scan())
        .map_err(map)
        .and_then(|resp| decode(&resp, ids.len()).map_err(|e| Report::new(AcqError::from(e))));
    link.close();
    let raw = result.wrap_err("self-check scan")?;

    if json_mode() {
        println!(
            "{}",
            json!({ "status": "ok", "channels": raw.len(), "values": raw.values })
        );
    } else {
        println!("self-check ok: {} channels", raw.len());
        for (ch, (v, _)) in ids.iter().zip(raw.readings()) {
            println!("  @{ch}: {v:+.6e} V");
        }
    }
    Ok(())
}
