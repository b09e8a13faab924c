//! Scripted serial ports for testing readers without hardware.
//!
//! A [`MockPort`] is a handle to shared port state: bytes queued with
//! [`MockPort::queue`] are delivered to the reader, everything the reader writes is
//! recorded. A [`MockConnector`] hands out links to registered ports by address.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::LineSettings;
use crate::error::{Error, Result, TransportError};
use crate::transport::{Connector, Link, PortInfo};

#[derive(Default)]
struct State {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    chunk_size: Option<usize>,
    replies: Vec<(Vec<u8>, Vec<u8>)>,
    after_discard: Vec<u8>,
    baud_rates: Vec<u32>,
    description: Option<String>,
    opens: usize,
    open_links: usize,
}

/// Mock serial port that simulates a meter.
#[derive(Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<State>>,
}

impl MockPort {
    /// Creates a silent port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Limits how many bytes a single read delivers.
    #[must_use]
    pub fn chunk_size(self, n: usize) -> Self {
        self.state().chunk_size = Some(n.max(1));
        self
    }

    /// Sets the description reported by port enumeration.
    #[must_use]
    pub fn description(self, description: impl Into<String>) -> Self {
        self.state().description = Some(description.into());
        self
    }

    /// Queues bytes to be read from the port.
    pub fn queue(&self, data: &[u8]) {
        self.state().rx.extend(data);
    }

    /// Queues `response` every time the written bytes end with `trigger`.
    pub fn reply_to(&self, trigger: &[u8], response: &[u8]) {
        self.state().replies.push((trigger.to_vec(), response.to_vec()));
    }

    /// Queues `data` once the pending input has been discarded.
    pub fn after_discard(&self, data: &[u8]) {
        self.state().after_discard.extend_from_slice(data);
    }

    /// All bytes written to the port so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    /// Baud rates the port was opened with or switched to, in order.
    #[must_use]
    pub fn baud_rates(&self) -> Vec<u32> {
        self.state().baud_rates.clone()
    }

    /// Number of times the port has been opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    /// Returns true while a link to the port is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().open_links > 0
    }

    /// Bytes queued but not read yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state().rx.len()
    }

    fn open(&self, settings: &LineSettings) -> MockLink {
        let mut state = self.state();
        state.opens += 1;
        state.open_links += 1;
        state.baud_rates.push(settings.baud_rate);
        MockLink { port: self.clone() }
    }
}

struct MockLink {
    port: MockPort,
}

impl Link for MockLink {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = self.port.state();
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock port has no data"));
        }
        let limit = state.chunk_size.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.port.state();
        state.tx.extend_from_slice(data);
        let responses: Vec<Vec<u8>> = state
            .replies
            .iter()
            .filter(|(trigger, _)| !trigger.is_empty() && state.tx.ends_with(trigger))
            .map(|(_, response)| response.clone())
            .collect();
        for response in responses {
            state.rx.extend(response);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_baud_rate(&mut self, rate: u32) -> io::Result<()> {
        self.port.state().baud_rates.push(rate);
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.state().rx.len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.port.state();
        state.rx.clear();
        let data = std::mem::take(&mut state.after_discard);
        state.rx.extend(data);
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        let mut state = self.port.state();
        state.open_links = state.open_links.saturating_sub(1);
    }
}

enum Slot {
    Port(MockPort),
    Faulty(String),
}

/// Connector serving registered mock ports.
#[derive(Default)]
pub struct MockConnector {
    ports: Vec<(String, Slot)>,
}

impl MockConnector {
    /// Creates a connector without ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `port` under `address`. Enumeration follows registration order.
    #[must_use]
    pub fn with_port(mut self, address: impl Into<String>, port: MockPort) -> Self {
        self.ports.push((address.into(), Slot::Port(port)));
        self
    }

    /// Registers an address whose open fails with a configuration error.
    #[must_use]
    pub fn with_faulty_port(mut self, address: impl Into<String>, reason: impl Into<String>) -> Self {
        self.ports.push((address.into(), Slot::Faulty(reason.into())));
        self
    }
}

impl Connector for MockConnector {
    fn open(&self, address: &str, settings: &LineSettings) -> Result<Box<dyn Link>> {
        match self.ports.iter().find(|(name, _)| name == address) {
            Some((_, Slot::Port(port))) => Ok(Box::new(port.open(settings))),
            Some((_, Slot::Faulty(reason))) => Err(Error::Config(reason.clone())),
            None => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such port: {address}"),
            ))
            .into()),
        }
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self
            .ports
            .iter()
            .map(|(address, slot)| PortInfo {
                address: address.clone(),
                description: match slot {
                    Slot::Port(port) => port.state().description.clone(),
                    Slot::Faulty(_) => None,
                },
            })
            .collect())
    }
}
