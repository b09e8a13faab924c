//! Reader for EN 62056-21 meters answering in plain text.
//!
//! The request is sent at a slow initial baud rate, optionally preceded by NUL
//! bytes to wake the optical interface. The meter echoes its identification at
//! that rate and sends the data line at the working rate.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::MeterConfig;
use crate::error::{Error, Result};
use crate::protocol::obis::PLAIN_METER_ID;
use crate::reader::MeterReader;
use crate::transport::{Connector, SystemConnector, Transport};
use crate::types::{Channel, Protocol, Sample};

/// Request message: `/?!` CR LF.
pub const REQUEST: &[u8] = b"/?!\r\n";

/// `code(value)` or `code(value*unit)`.
static DATA_SET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\(([\d.]+)\*?([\w.]+)?\)").expect("data set pattern is valid")
});

/// Reads meters through the EN 62056-21 request/response handshake.
pub struct PlainReader {
    config: MeterConfig,
    transport: Transport,
}

impl PlainReader {
    /// Creates a reader on the system serial ports.
    #[must_use]
    pub fn new(config: MeterConfig) -> Self {
        Self::with_connector(config, Arc::new(SystemConnector))
    }

    /// Creates a reader using the given connector.
    #[must_use]
    pub fn with_connector(config: MeterConfig, connector: Arc<dyn Connector>) -> Self {
        let transport = Transport::with_connector(config.address.clone(), config.line.clone(), connector);
        Self { config, transport }
    }

    fn exchange(&mut self) -> Result<Sample> {
        let timeout = self.config.line.timeout;
        self.transport.set_baud_rate(self.config.request_baud_rate())?;
        self.transport.initialize()?;

        let zeros = self.config.wakeup_zero_count();
        if zeros > 0 {
            self.transport.write(&vec![0u8; zeros])?;
        }
        self.transport.write(REQUEST)?;
        self.transport.flush()?;

        let identification = self.transport.read_line(timeout)?;
        tracing::debug!(
            "identification from {}: {}",
            self.config.address,
            String::from_utf8_lossy(&identification).trim_end()
        );

        self.transport.set_baud_rate(self.config.line.baud_rate)?;
        let response = self.transport.read_line(timeout)?;
        let text = std::str::from_utf8(&response).map_err(|e| Error::encoding(e, &response))?;
        tracing::debug!("response from {}: {}", self.config.address, text.trim_end());

        Ok(parse_response(text))
    }
}

impl MeterReader for PlainReader {
    fn protocol(&self) -> Protocol {
        Protocol::Plain
    }

    fn config(&self) -> &MeterConfig {
        &self.config
    }

    fn read_sample(&mut self) -> Result<Sample> {
        let result = self.exchange();
        self.transport.close();
        result
    }
}

/// Extracts data sets from a response line.
///
/// A unit-less set with the identification code is the meter id (first one wins),
/// sets with a unit become channels. Other sets are ignored.
#[must_use]
pub fn parse_response(text: &str) -> Sample {
    let mut sample = Sample::new();
    for caps in DATA_SET.captures_iter(text) {
        let code = &caps[1];
        let value = &caps[2];
        match caps.get(3) {
            Some(unit) => match value.parse::<f64>() {
                Ok(number) => sample.channels.push(Channel::new(code, number, Some(unit.as_str()))),
                Err(e) => tracing::warn!("skipping data set {}({}): {}", code, value, e),
            },
            None if code == PLAIN_METER_ID && sample.meter_id.is_none() => {
                sample.meter_id = Some(value.to_owned());
            }
            None => {}
        }
    }
    sample
}
