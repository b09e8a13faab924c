//! # meterreader
//!
//! Polls utility meters over serial and optical interfaces and normalizes their
//! readings into [`Sample`]s.
//!
//! ## Features
//!
//! - SML (binary, pushed by the meter) and EN 62056-21 plain text (request/response)
//! - Identity checks against the configured meter id
//! - Port probing to find meters on unknown interfaces
//! - Blocking, timeout-bounded I/O; every call is one self-contained attempt
//!
//! ## Quick Start
//!
//! ```no_run
//! use meterreader::{MeterConfig, MeterReader, reader};
//!
//! fn main() -> Result<(), meterreader::Error> {
//!     let mut meter = reader::build(MeterConfig::sml("1EMH004921570", "/dev/ttyUSB0"));
//!
//!     if let Some(sample) = meter.poll()? {
//!         for channel in &sample.channels {
//!             println!("{} = {} {}", channel.name, channel.value, channel.unit.as_deref().unwrap_or(""));
//!         }
//!     }
//!
//!     for device in meterreader::discovery::detect(Some("ttyUSB"), &MeterConfig::plain("", ""))? {
//!         println!("{} at {}", device.identifier, device.access_path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Measurement model (channels, samples, devices)
//! - [`transport`] - Serial links, loopback and mock ports
//! - [`protocol`] - SML framing and decoding, OBIS codes
//! - [`reader`] - The SML and plain-text readers
//! - [`identity`] - Meter id canonicalization and matching
//! - [`discovery`] - Probing candidate ports
//! - [`gateway`] - Interface for forwarding values upstream

pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod protocol;
pub mod reader;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{LineSettings, MeterConfig, Parity};
pub use error::{DecodeError, Error, FrameError, Result, TransportError};
pub use gateway::{DebugGateway, Gateway};
pub use protocol::{Node, SmlDecoder, TlvDecoder};
pub use reader::{MeterReader, PlainReader, SmlReader};
pub use transport::{Connector, Transport, list_ports};
pub use types::{Channel, Device, Protocol, Sample, Value};
