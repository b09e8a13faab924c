//! Reader configuration.
//!
//! Configuration is plain data with builder-style setters. Loading it from files is
//! left to the embedding process; enable the `serde` feature to derive the
//! (de)serializers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::types::Protocol;

/// Default baud rate for pushing (SML) meters.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of NUL bytes sent ahead of a plain-text request.
pub const DEFAULT_WAKEUP_ZEROS: usize = 40;

/// Default baud rate for the plain-text request.
pub const DEFAULT_INITIAL_BAUD_RATE: u32 = 300;

/// Default baud rate for the plain-text response.
pub const DEFAULT_RESPONSE_BAUD_RATE: u32 = 2400;

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

impl FromStr for Parity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "even" | "e" => Ok(Self::Even),
            "odd" | "o" => Ok(Self::Odd),
            other => Err(Error::Config(format!("unknown parity: {other}"))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "N",
            Self::Even => "E",
            Self::Odd => "O",
        })
    }
}

/// Line parameters of a serial connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LineSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits per character (5-8).
    pub byte_size: u8,
    /// Parity.
    pub parity: Parity,
    /// Stop bits (1 or 2).
    pub stop_bits: u8,
    /// Timeout applied to every blocking read.
    pub timeout: Duration,
}

impl LineSettings {
    /// Creates settings for the given baud rate, 8N1 and the default timeout.
    #[must_use]
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            byte_size: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the data bits.
    #[must_use]
    pub const fn byte_size(mut self, bits: u8) -> Self {
        self.byte_size = bits;
        self
    }

    /// Sets the parity.
    #[must_use]
    pub const fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Sets the stop bits.
    #[must_use]
    pub const fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the settings describe a line a serial driver can open.
    pub fn validate(&self) -> Result<(), Error> {
        if self.baud_rate == 0 {
            return Err(Error::Config("baud rate must be positive".into()));
        }
        if !(5..=8).contains(&self.byte_size) {
            return Err(Error::Config(format!(
                "byte size must be 5-8, got {}",
                self.byte_size
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(Error::Config(format!(
                "stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.byte_size, self.parity, self.stop_bits
        )
    }
}

/// Configuration of one meter reader.
///
/// The plain-text parameters (`wakeup_zeros`, `initial_baud_rate`) only apply to
/// [`Protocol::Plain`]. For plain meters `line.baud_rate` is the response rate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterConfig {
    /// Expected meter identification.
    pub meter_id: String,
    /// Transport address (device path, `loop://` or `hwgrep://<regex>`).
    pub address: String,
    /// Wire protocol.
    pub protocol: Protocol,
    /// Line parameters.
    #[cfg_attr(feature = "serde", serde(default))]
    pub line: LineSettings,
    /// NUL bytes sent ahead of a plain-text request.
    #[cfg_attr(feature = "serde", serde(default))]
    pub wakeup_zeros: Option<usize>,
    /// Baud rate used to send a plain-text request.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial_baud_rate: Option<u32>,
}

impl MeterConfig {
    /// Creates a configuration with the protocol's default line parameters.
    #[must_use]
    pub fn new(meter_id: impl Into<String>, address: impl Into<String>, protocol: Protocol) -> Self {
        let line = match protocol {
            Protocol::Sml => LineSettings::new(DEFAULT_BAUD_RATE),
            Protocol::Plain => LineSettings::new(DEFAULT_RESPONSE_BAUD_RATE),
        };
        Self {
            meter_id: meter_id.into(),
            address: address.into(),
            protocol,
            line,
            wakeup_zeros: None,
            initial_baud_rate: None,
        }
    }

    /// Creates an SML configuration.
    #[must_use]
    pub fn sml(meter_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(meter_id, address, Protocol::Sml)
    }

    /// Creates a plain-text configuration.
    #[must_use]
    pub fn plain(meter_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(meter_id, address, Protocol::Plain)
    }

    /// Sets the line parameters.
    #[must_use]
    pub fn line(mut self, line: LineSettings) -> Self {
        self.line = line;
        self
    }

    /// Sets the number of wakeup NUL bytes.
    #[must_use]
    pub const fn wakeup_zeros(mut self, count: usize) -> Self {
        self.wakeup_zeros = Some(count);
        self
    }

    /// Sets the request baud rate.
    #[must_use]
    pub const fn initial_baud_rate(mut self, rate: u32) -> Self {
        self.initial_baud_rate = Some(rate);
        self
    }

    /// NUL bytes to send ahead of a plain-text request.
    #[must_use]
    pub fn wakeup_zero_count(&self) -> usize {
        self.wakeup_zeros.unwrap_or(DEFAULT_WAKEUP_ZEROS)
    }

    /// Baud rate for sending a plain-text request.
    #[must_use]
    pub fn request_baud_rate(&self) -> u32 {
        self.initial_baud_rate.unwrap_or(DEFAULT_INITIAL_BAUD_RATE)
    }

    /// Copy of this configuration bound to another address and expected id.
    #[must_use]
    pub fn for_address(&self, address: impl Into<String>, meter_id: impl Into<String>) -> Self {
        Self {
            meter_id: meter_id.into(),
            address: address.into(),
            ..self.clone()
        }
    }

    /// Logs parameters that the configured protocol does not use.
    pub(crate) fn warn_unused(&self) {
        if self.protocol != Protocol::Plain {
            let unused: Vec<&str> = [
                self.wakeup_zeros.map(|_| "wakeup_zeros"),
                self.initial_baud_rate.map(|_| "initial_baud_rate"),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !unused.is_empty() {
                tracing::warn!(
                    "unused parameter{} for {} reader: {}",
                    if unused.len() > 1 { "s" } else { "" },
                    self.protocol,
                    unused.join(", ")
                );
            }
        }
    }
}
