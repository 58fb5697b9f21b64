#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Acquisition and calibration pipeline (hardware-agnostic).
//!
//! All instrument traffic goes through `windbal_traits::InstrumentLink`; this
//! crate never touches a socket.
//!
//! ## Pipeline
//!
//! - **Codec**: scan response text to per-channel values and timestamps (`codec`)
//! - **Layout**: flat scan slots to category groups (`layout`)
//! - **Calibration**: sting voltages to forces per orientation (`calibration`)
//! - **Controller**: session state machine and sampling thread (`controller`)
//! - **Sinks**: live window and CSV log (`sink`)
//!
//! Errors are typed (`AcqError`, `DecodeError`) and travel inside
//! `eyre::Report` at operation boundaries; use `downcast_ref` to match.

pub mod calibration;
pub mod codec;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod event;
pub mod hw_error;
pub mod layout;
pub mod mocks;
pub mod sink;
pub mod status;
pub mod util;

pub use calibration::{CalibrationMatrixSet, CalibrationModel, MatrixPair, Orientation};
pub use codec::{RawSample, decode, decode_in};
pub use controller::{AcquisitionCfg, AcquisitionController, SessionInfo};
pub use error::{AcqError, DecodeError, Report, Result};
pub use event::AcqEvent;
pub use layout::{Category, ChannelGroup, ChannelSet, GroupedReadings, ScanLayout};
pub use sink::{CsvLogger, LiveBuffer, LiveView, Sample, SampleSink};
pub use status::AcquisitionState;
