//! Sample type.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Channel;

/// Gets the current Unix time in seconds.
fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One readout of a meter.
///
/// A sample is filled while a single frame or response is parsed and is not
/// touched again once handed to the caller. Channels keep the order in which
/// they appeared on the wire.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Capture time in Unix epoch seconds.
    pub timestamp: f64,
    /// Meter identification found in the data, if any.
    pub meter_id: Option<String>,
    /// Measured channels in wire order.
    pub channels: Vec<Channel>,
}

impl Sample {
    /// Creates an empty sample stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::at(current_timestamp())
    }

    /// Creates an empty sample with an explicit timestamp.
    #[must_use]
    pub const fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            meter_id: None,
            channels: Vec::new(),
        }
    }

    /// Capture time in milliseconds, as expected by upload gateways.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        crate::gateway::timestamp_to_millis(self.timestamp)
    }

    /// Looks up a channel by name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

impl Default for Sample {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_captured_per_instance() {
        let first = Sample::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = Sample::new();
        assert!(second.timestamp > first.timestamp);
        assert!(first.meter_id.is_none());
        assert!(first.channels.is_empty());
    }

    #[test]
    fn test_timestamp_millis() {
        let sample = Sample::at(1_600_000_000.25);
        assert_eq!(sample.timestamp_millis(), 1_600_000_000_250);
    }

    #[test]
    fn test_channel_lookup() {
        let mut sample = Sample::at(0.0);
        sample.channels.push(Channel::new("6.8", 6047.0, Some("kWh")));
        assert_eq!(sample.channel("6.8").and_then(|c| c.value.as_f64()), Some(6047.0));
        assert!(sample.channel("9.21").is_none());
    }
}
