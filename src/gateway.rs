//! Upload gateway interface.
//!
//! Readers only produce [`Sample`](crate::types::Sample)s. Forwarding them to a
//! data-collection backend is the job of a [`Gateway`], driven by the embedding
//! process.

use std::collections::HashMap;

/// Converts Unix seconds to whole milliseconds (truncating).
#[must_use]
pub fn timestamp_to_millis(timestamp: f64) -> i64 {
    (timestamp * 1000.0) as i64
}

/// Destination for channel values.
pub trait Gateway {
    /// Uploads one value. Returns true on success.
    fn post(&mut self, identifier: &str, value: f64, timestamp_ms: i64) -> bool;

    /// Reads back the most recent `(timestamp_ms, value)` for `identifier`.
    fn get(&self, identifier: &str) -> Option<(i64, f64)>;
}

/// Gateway that keeps posted values in memory and logs them.
#[derive(Debug, Default)]
pub struct DebugGateway {
    posted: HashMap<String, (i64, f64)>,
}

impl DebugGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gateway for DebugGateway {
    fn post(&mut self, identifier: &str, value: f64, timestamp_ms: i64) -> bool {
        tracing::debug!("sent channel {} @ {}={}", identifier, timestamp_ms, value);
        self.posted.insert(identifier.to_owned(), (timestamp_ms, value));
        true
    }

    fn get(&self, identifier: &str) -> Option<(i64, f64)> {
        let last = self.posted.get(identifier).copied();
        tracing::debug!("received channel {}: {:?}", identifier, last);
        last
    }
}
