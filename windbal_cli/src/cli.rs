//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;
use windbal_core::Orientation;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "windbal", version, about = "Wind-tunnel force balance acquisition")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/windbal.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OrientationArg {
    Normal,
    Side,
}

impl From<OrientationArg> for Orientation {
    fn from(o: OrientationArg) -> Self {
        match o {
            OrientationArg::Normal => Self::Normal,
            OrientationArg::Side => Self::Side,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream samples to the CSV log and print calibrated forces
    Acquire {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        duration_s: Option<f64>,
        /// Override the sting orientation from the config
        #[arg(long, value_enum)]
        orientation: Option<OrientationArg>,
        /// Use the built-in DAQ970A simulator instead of [instrument].address
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Print sample rate and skip counts on completion
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Connect, configure, take one scan and decode it
    SelfCheck {
        /// Use the built-in DAQ970A simulator instead of [instrument].address
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
}
