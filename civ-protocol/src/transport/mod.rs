use std::io;
use std::sync::{Arc, Mutex};

#[cfg(feature = "serial")]
pub mod serial;

/// The write side of a CI-V connection.
///
/// Implementors provide blocking writes to a serial-like sink. Reading is
/// done by a separate reader that feeds the ingest queue.
pub trait Transport: Send {
    /// Write all bytes to the transport.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()>;
}

/// An in-memory transport that records every write.
///
/// Clones share the same record, so a test can keep one clone and hand
/// the other to the encoder.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose writes always fail, like a closed port.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every buffer written so far, one entry per `write_all` call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Drop the recorded writes.
    pub fn clear(&self) {
        if let Ok(mut w) = self.writes.lock() {
            w.clear();
        }
    }
}

impl Transport for MemoryTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "port closed"));
        }
        self.writes
            .lock()
            .map_err(|_| io::Error::other("transport record poisoned"))?
            .push(buf.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
