//! Device and protocol types.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::Channel;

/// Wire protocol spoken by a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Protocol {
    /// Binary Smart Message Language frames, pushed by the meter.
    Sml,
    /// EN 62056-21 plain text, requested with a handshake.
    Plain,
}

impl Protocol {
    /// Tag used in logs and device listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sml => "SML",
            Self::Plain => "PLAIN",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sml" => Ok(Self::Sml),
            "plain" => Ok(Self::Plain),
            other => Err(Error::Config(format!("unknown protocol: {other}"))),
        }
    }
}

/// A meter found at an address during discovery, with its last-seen readout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    /// Meter identification as reported by the meter.
    pub identifier: String,
    /// Transport address the meter answered on.
    pub access_path: String,
    /// Protocol the meter spoke.
    pub protocol: Protocol,
    /// Channels of the discovery readout.
    pub channels: Vec<Channel>,
}
