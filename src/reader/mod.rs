//! Meter readers.
//!
//! A reader owns one [`Transport`](crate::transport::Transport) and performs one
//! self-contained exchange per call. Two variants exist:
//! - [`SmlReader`] for meters pushing binary SML frames
//! - [`PlainReader`] for meters answering an EN 62056-21 request in plain text
//!
//! Field conditions (dead link, garbage on the wire, undecodable bytes) are logged
//! and turned into `Ok(None)` by [`MeterReader::poll`] and [`MeterReader::discover`].
//! Only unexpected faults such as configuration errors are returned as `Err`.

pub mod plain;
pub mod sml;

use std::sync::Arc;

use crate::config::MeterConfig;
use crate::error::{Error, Result};
use crate::identity;
use crate::transport::{Connector, SystemConnector};
use crate::types::{Device, Protocol, Sample};

pub use plain::PlainReader;
pub use sml::SmlReader;

/// Common capability of all protocol readers.
pub trait MeterReader: Send {
    /// Protocol spoken by this reader.
    fn protocol(&self) -> Protocol;

    /// Configuration this reader was built from.
    fn config(&self) -> &MeterConfig;

    /// Performs one exchange with the meter and parses the result.
    ///
    /// The transport is released before returning, on success and on failure.
    /// No identity check is applied and errors are returned unfiltered.
    fn read_sample(&mut self) -> Result<Sample>;

    /// Reads a sample and checks it against the configured meter id.
    ///
    /// Returns `Ok(None)` on field conditions, if the data carries no meter id, or if
    /// the meter id does not match.
    fn poll(&mut self) -> Result<Option<Sample>> {
        let result = self.read_sample();
        let Some(sample) = settle(self.protocol(), self.config(), result, false)? else {
            return Ok(None);
        };

        let expected = &self.config().meter_id;
        match sample.meter_id.as_deref() {
            Some(observed) if identity::matches(expected, observed) => Ok(Some(sample)),
            Some(observed) => {
                tracing::warn!(
                    "meter id {} from {} does not match expected id {}",
                    observed,
                    self.config().address,
                    expected
                );
                Ok(None)
            }
            None => {
                tracing::warn!(
                    "{} data from {} carries no meter id",
                    self.protocol(),
                    self.config().address
                );
                Ok(None)
            }
        }
    }

    /// Reads a sample and reports the meter found, whatever its id.
    ///
    /// Returns `Ok(None)` on field conditions or if the data carries no meter id.
    /// A silent port is the common case here and is only logged at debug level.
    fn discover(&mut self) -> Result<Option<Device>> {
        let result = self.read_sample();
        let Some(sample) = settle(self.protocol(), self.config(), result, true)? else {
            return Ok(None);
        };
        Ok(sample.meter_id.map(|identifier| Device {
            identifier,
            access_path: self.config().address.clone(),
            protocol: self.protocol(),
            channels: sample.channels,
        }))
    }
}

/// Logs field conditions and turns them into `None`; other errors pass through.
///
/// With `probing` set, transport errors mean "no meter here" and are logged at
/// debug level.
fn settle(
    protocol: Protocol,
    config: &MeterConfig,
    result: Result<Sample>,
    probing: bool,
) -> Result<Option<Sample>> {
    match result {
        Ok(sample) => Ok(Some(sample)),
        Err(e @ Error::Transport(_)) if probing => {
            tracing::debug!("{} reader at {}: nothing received: {}", protocol, config.address, e);
            Ok(None)
        }
        Err(e) if e.is_field_condition() => {
            tracing::error!(
                "{} reader at {}: {} error: {}",
                protocol,
                config.address,
                e.category(),
                e
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Builds the reader for `config.protocol` on the system serial ports.
#[must_use]
pub fn build(config: MeterConfig) -> Box<dyn MeterReader> {
    build_with(config, Arc::new(SystemConnector))
}

/// Builds the reader for `config.protocol` using the given connector.
#[must_use]
pub fn build_with(config: MeterConfig, connector: Arc<dyn Connector>) -> Box<dyn MeterReader> {
    config.warn_unused();
    match config.protocol {
        Protocol::Sml => Box::new(SmlReader::with_connector(config, connector)),
        Protocol::Plain => Box::new(PlainReader::with_connector(config, connector)),
    }
}
