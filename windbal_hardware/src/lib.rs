//! Instrument-side implementations of `windbal_traits::InstrumentLink`.
//!
//! - `Daq970Link`: Keysight DAQ970A command set over any `ScpiTransport`
//! - `TcpTransport`: SCPI raw socket
//! - `SimulatedDaq`: in-process transport answering like a DAQ970A

pub mod daq970;
pub mod error;
pub mod scpi;
pub mod sim;
pub mod tcp;
pub mod util;

pub use daq970::{Daq970Link, Daq970Settings};
pub use error::HwError;
pub use scpi::ScpiTransport;
pub use sim::SimulatedDaq;
pub use tcp::TcpTransport;

/// DAQ970A driven over a raw SCPI socket.
pub type TcpDaq970 = Daq970Link<TcpTransport>;

/// DAQ970A command path against the in-process simulator.
pub type SimDaq970 = Daq970Link<SimulatedDaq>;
