#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the force-balance acquisition rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Channel groups are listed per category; the scan order is always
//!   pressure, velocity, temperature, sting regardless of TOML order.
//! - Calibration matrices may be overridden per orientation; otherwise the
//!   built-in balance constants apply.
use eyre::WrapErr;
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::HashMap;
use std::path::Path;

/// 3×3 matrix as written in TOML: an array of three rows.
pub type Matrix3 = [[f64; 3]; 3];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InstrumentCfg {
    /// `host:port` of the instrument's SCPI socket. Absent means simulator.
    pub address: Option<String>,
    /// Substring expected in the `*IDN?` reply.
    pub model: String,
    /// Per-command I/O timeout (ms).
    pub timeout_ms: u64,
    /// DC voltage range argument for `CONF:VOLT:DC`.
    pub range: String,
    /// Resolution argument for `CONF:VOLT:DC`.
    pub resolution: String,
}

impl Default for InstrumentCfg {
    fn default() -> Self {
        Self {
            address: None,
            model: "DAQ970A".to_string(),
            timeout_ms: 2000,
            range: "1mV".to_string(),
            resolution: "0.00001".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    #[serde(alias = "Normal", alias = "NORMAL")]
    #[serde(rename = "normal")]
    Normal,
    #[serde(alias = "Side", alias = "SIDE")]
    #[serde(rename = "side")]
    Side,
}

/// Force-balance ("sting") channels and the mounting orientation that selects
/// the calibration preset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StingCfg {
    pub channels: Vec<u16>,
    pub orientation: Orientation,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ChannelsCfg {
    pub pressure: Vec<u16>,
    pub velocity: Vec<u16>,
    pub temperature: Vec<u16>,
    /// Accepts either:
    /// - a plain array: `sting = [301, 302, 303]` (orientation defaults to normal)
    /// - a table: `sting = { channels = [301, 302, 303], orientation = "side" }`
    #[serde(deserialize_with = "de_sting")]
    pub sting: StingCfg,
}

impl ChannelsCfg {
    /// Groups in fixed scan order as `(name, channels)`.
    pub fn groups(&self) -> [(&'static str, &[u16]); 4] {
        [
            ("pressure", &self.pressure),
            ("velocity", &self.velocity),
            ("temperature", &self.temperature),
            ("sting", &self.sting.channels),
        ]
    }

    pub fn total(&self) -> usize {
        self.groups().iter().map(|(_, c)| c.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StingToml {
    List(Vec<u16>),
    Table {
        channels: Vec<u16>,
        #[serde(default)]
        orientation: Orientation,
    },
}

fn de_sting<'de, D>(deserializer: D) -> Result<StingCfg, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<StingToml> = Option::deserialize(deserializer)?;
    Ok(match opt {
        None => StingCfg::default(),
        Some(StingToml::List(channels)) => StingCfg {
            channels,
            orientation: Orientation::Normal,
        },
        Some(StingToml::Table {
            channels,
            orientation,
        }) => StingCfg {
            channels,
            orientation,
        },
    })
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionCfg {
    /// Pause between scan cycles (ms). 0 runs back-to-back.
    pub interval_ms: u64,
    /// Number of samples retained by the live view.
    pub live_window: usize,
    /// Capacity of the error/state event channel.
    pub event_capacity: usize,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            interval_ms: 1,
            live_window: 50,
            event_capacity: 256,
        }
    }
}

/// Raw sample CSV log settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SampleLogCfg {
    pub enabled: bool,
    /// Directory receiving `raw_data_<stamp>.csv` files.
    pub dir: String,
    /// Flush the CSV writer after this many rows.
    pub flush_every: usize,
}

impl Default for SampleLogCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "logs".to_string(),
            flush_every: 50,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct MatrixPairCfg {
    pub cinv: Matrix3,
    pub cinv_c2: Matrix3,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub normal: Option<MatrixPairCfg>,
    pub side: Option<MatrixPairCfg>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub instrument: InstrumentCfg,
    pub channels: ChannelsCfg,
    #[serde(default)]
    pub acquisition: AcquisitionCfg,
    #[serde(default)]
    pub log: SampleLogCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub calibration: CalibrationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn matrix_is_finite(m: &Matrix3) -> bool {
    m.iter().flatten().all(|v| v.is_finite())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Channels
        if self.channels.total() == 0 {
            eyre::bail!("channels: at least one channel must be configured");
        }
        let mut seen: HashMap<u16, &'static str> = HashMap::new();
        for (group, channels) in self.channels.groups() {
            for &ch in channels {
                if let Some(prev) = seen.insert(ch, group) {
                    eyre::bail!("channel {ch} appears in both {prev} and {group}");
                }
            }
        }

        // Acquisition
        if self.acquisition.interval_ms > 60_000 {
            eyre::bail!("acquisition.interval_ms is unreasonably large (>60s)");
        }
        if self.acquisition.live_window == 0 {
            eyre::bail!("acquisition.live_window must be >= 1");
        }
        if self.acquisition.event_capacity == 0 {
            eyre::bail!("acquisition.event_capacity must be >= 1");
        }

        // Instrument
        if self.instrument.timeout_ms == 0 {
            eyre::bail!("instrument.timeout_ms must be >= 1");
        }
        if self.instrument.model.trim().is_empty() {
            eyre::bail!("instrument.model must not be empty");
        }

        // Sample log
        if self.log.flush_every == 0 {
            eyre::bail!("log.flush_every must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        // Calibration overrides
        for (name, pair) in [
            ("normal", self.calibration.normal.as_ref()),
            ("side", self.calibration.side.as_ref()),
        ] {
            if let Some(p) = pair
                && !(matrix_is_finite(&p.cinv) && matrix_is_finite(&p.cinv_c2))
            {
                eyre::bail!("calibration.{name} matrices must be finite");
            }
        }

        Ok(())
    }
}
