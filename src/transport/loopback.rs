//! In-memory loopback line (`loop://`).
//!
//! Everything written to the line becomes readable again. Clones share the same line,
//! so a simulated meter can feed a reader from another thread.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::transport::Link;

#[derive(Default)]
struct Line {
    queue: Mutex<VecDeque<u8>>,
    readable: Condvar,
}

/// Loopback link.
#[derive(Clone, Default)]
pub struct Loopback {
    line: Arc<Line>,
}

impl Loopback {
    /// Creates an empty loopback line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<u8>> {
        self.line.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for Loopback {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let queue = self.queue();
        let (mut queue, _) = self
            .line
            .readable
            .wait_timeout_while(queue, timeout, |q| q.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if queue.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "loopback read timed out"));
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.queue().extend(data);
        self.line.readable.notify_all();
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_baud_rate(&mut self, _rate: u32) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.queue().len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.queue().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo() {
        let mut line = Loopback::new();
        line.write_all(b"/?!\r\n").unwrap();
        assert_eq!(line.bytes_to_read().unwrap(), 5);
        let mut buf = [0u8; 16];
        let n = line.read(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], b"/?!\r\n");
    }

    #[test]
    fn test_timeout_when_empty() {
        let mut line = Loopback::new();
        let mut buf = [0u8; 4];
        let err = line.read(&mut buf, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_shared_between_threads() {
        let mut reader = Loopback::new();
        let mut meter = reader.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            meter.write_all(b"frame").unwrap();
        });
        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(&buf[..n], b"frame");
        handle.join().unwrap();
    }
}
