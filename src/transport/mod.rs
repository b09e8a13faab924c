//! Transport layer for meter communication.
//!
//! A [`Transport`] owns at most one open [`Link`] for one reader. Links are produced by
//! a [`Connector`], which also enumerates the ports available on the host:
//! - [`SystemConnector`] opens real serial ports, `loop://` and `hwgrep://` addresses
//! - [`mock::MockConnector`] serves scripted ports for tests

pub mod loopback;
pub mod mock;
pub mod serial;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::config::LineSettings;
use crate::error::{Result, TransportError};

pub use loopback::Loopback;
pub use serial::{SystemConnector, list_ports};

/// Size of a single read from the link.
const READ_CHUNK: usize = 256;

/// One open connection to a serial-like endpoint.
pub trait Link: Send {
    /// Reads available bytes, waiting at most `timeout` for the first one.
    ///
    /// Fails with [`io::ErrorKind::TimedOut`] if nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Writes all bytes.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Blocks until written bytes have been transmitted.
    fn flush(&mut self) -> io::Result<()>;

    /// Changes the baud rate of the open connection.
    fn set_baud_rate(&mut self, rate: u32) -> io::Result<()>;

    /// Number of received bytes not read yet.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Drops all received bytes not read yet.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// A port reported by port enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Address to open the port with.
    pub address: String,
    /// Human readable description (USB product/manufacturer), if known.
    pub description: Option<String>,
}

impl PortInfo {
    /// Creates port info without a description.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            description: None,
        }
    }
}

/// Opens links and enumerates ports.
pub trait Connector: Send + Sync {
    /// Opens `address` with the given line parameters.
    fn open(&self, address: &str, settings: &LineSettings) -> Result<Box<dyn Link>>;

    /// Lists the ports currently available.
    fn available_ports(&self) -> Result<Vec<PortInfo>>;
}

/// Connection state of one reader.
///
/// The link is created by [`Transport::initialize`] and released by
/// [`Transport::close`]; afterwards a new `initialize()` opens a fresh link.
pub struct Transport {
    address: String,
    settings: LineSettings,
    connector: Arc<dyn Connector>,
    link: Option<Box<dyn Link>>,
    buffer: BytesMut,
}

impl Transport {
    /// Creates a transport for `address` using the system connector.
    #[must_use]
    pub fn new(address: impl Into<String>, settings: LineSettings) -> Self {
        Self::with_connector(address, settings, Arc::new(SystemConnector))
    }

    /// Creates a transport for `address` using the given connector.
    #[must_use]
    pub fn with_connector(
        address: impl Into<String>,
        settings: LineSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            address: address.into(),
            settings,
            connector,
            link: None,
            buffer: BytesMut::new(),
        }
    }

    /// Address this transport connects to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current line parameters.
    #[must_use]
    pub const fn settings(&self) -> &LineSettings {
        &self.settings
    }

    /// Returns true if a link is open.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.link.is_some()
    }

    /// Opens the link if none is open. Nothing is transmitted.
    pub fn initialize(&mut self) -> Result<()> {
        if self.link.is_none() {
            tracing::debug!("opening {} ({})", self.address, self.settings);
            self.link = Some(self.connector.open(&self.address, &self.settings)?);
            self.buffer.clear();
        }
        Ok(())
    }

    /// Changes the baud rate, in place if the link is open.
    pub fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.settings.baud_rate = rate;
        if let Some(link) = self.link.as_mut() {
            tracing::trace!("switching {} to {} baud", self.address, rate);
            link.set_baud_rate(rate).map_err(TransportError::Io)?;
        }
        Ok(())
    }

    /// Number of received bytes not consumed yet.
    pub fn bytes_waiting(&mut self) -> Result<usize> {
        let link = self.link.as_mut().ok_or(TransportError::NotInitialized)?;
        let pending = link.bytes_to_read().map_err(TransportError::Io)?;
        Ok(self.buffer.len() + pending)
    }

    /// Drops every received byte not consumed yet.
    pub fn discard_input(&mut self) -> Result<()> {
        let link = self.link.as_mut().ok_or(TransportError::NotInitialized)?;
        link.clear_input().map_err(TransportError::Io)?;
        self.buffer.clear();
        Ok(())
    }

    /// Reads up to and including the next `\n`.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Bytes> {
        self.read_until(b"\n", timeout)
    }

    /// Reads up to and including the next occurrence of `marker`.
    pub fn read_until(&mut self, marker: &[u8], timeout: Duration) -> Result<Bytes> {
        if marker.is_empty() {
            return Ok(Bytes::new());
        }
        self.fill_until(timeout, "read_until", |buffer| {
            buffer
                .windows(marker.len())
                .position(|window| window == marker)
                .map(|pos| pos + marker.len())
        })
    }

    /// Reads exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Bytes> {
        self.fill_until(timeout, "read_exact", |buffer| {
            (buffer.len() >= n).then_some(n)
        })
    }

    /// Writes all bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let link = self.link.as_mut().ok_or(TransportError::NotInitialized)?;
        tracing::trace!("sending {} bytes to {}", data.len(), self.address);
        link.write_all(data).map_err(TransportError::Io)?;
        Ok(())
    }

    /// Blocks until written bytes have left the host.
    pub fn flush(&mut self) -> Result<()> {
        let link = self.link.as_mut().ok_or(TransportError::NotInitialized)?;
        link.flush().map_err(TransportError::Io)?;
        Ok(())
    }

    /// Releases the link. A later [`Transport::initialize`] opens a new one.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            tracing::debug!("closed {}", self.address);
        }
        self.buffer.clear();
    }

    /// Reads into the buffer until `complete` reports how many bytes to return.
    fn fill_until<F>(&mut self, timeout: Duration, operation: &'static str, complete: F) -> Result<Bytes>
    where
        F: Fn(&[u8]) -> Option<usize>,
    {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = complete(&self.buffer[..]) {
                return Ok(self.buffer.split_to(end).freeze());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout { operation, timeout }.into());
            }

            let link = self.link.as_mut().ok_or(TransportError::NotInitialized)?;
            match link.read(&mut chunk, remaining) {
                Ok(n) => {
                    tracing::trace!("received {} bytes from {}", n, self.address);
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout { operation, timeout }.into());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Io(e).into()),
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
