//! The buffered byte stream: output buffering, one-byte input cache,
//! flush orchestration, and transport lifecycle.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::{DEFAULT_CAPACITY, PortConfig};
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::write::{EchoWriter, PlainWriter, Writer};

/// Buffered byte stream over a serial transport.
///
/// Outgoing bytes are collected in a fixed-capacity buffer and sent in one
/// piece on overflow or explicit [`flush`]; incoming bytes are fetched one
/// at a time with at most one unread byte cached (no read-ahead). The
/// stream cannot report how many bytes are pending on the device.
///
/// All methods take `&self`: one mutex per instance serializes transport
/// access, so concurrent flushes never interleave their bytes on the wire.
///
/// # Example
///
/// ```no_run
/// use serbuf::SerialStream;
///
/// let stream = SerialStream::builder("/dev/ttyUSB0")
///     .baud(19_200)
///     .echo_verified(true)
///     .open()
///     .expect("failed to open serial port");
///
/// stream.put(b'E').unwrap();
/// stream.flush().unwrap();
/// ```
///
/// [`flush`]: Self::flush
#[derive(Debug)]
pub struct SerialStream {
    /// Transport, buffers, and lifecycle flag.
    inner: Mutex<Inner>,
    /// Flush policy selected at construction.
    writer: Box<dyn Writer + Send + Sync>,
    /// Output buffer capacity `C`; occupancy never exceeds `C - 1`.
    capacity: usize,
}

/// State behind the stream's mutex.
struct Inner {
    /// Raw device transport.
    transport: Box<dyn Transport + Send>,
    /// Bytes awaiting transmission.
    buf: Vec<u8>,
    /// At most one pending received byte (filled by `peek`, consumed by
    /// `get`).
    cache: Option<u8>,
    /// Set once the transport has been released.
    closed: bool,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("buffered", &self.buf.len())
            .field("cache", &self.cache)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Inner {
    /// Fails with [`Error::Closed`] once the transport has been released.
    fn ensure_open(&self) -> Result<()> {
        if self.closed { Err(Error::Closed) } else { Ok(()) }
    }
}

impl SerialStream {
    /// Starts building a stream over the serial device at `path`.
    pub fn builder(path: impl Into<PathBuf>) -> SerialStreamBuilder {
        SerialStreamBuilder {
            path: path.into(),
            config: PortConfig::default(),
            capacity: DEFAULT_CAPACITY,
            echo_verified: false,
        }
    }

    /// Builds a stream over an already-open transport with an explicit
    /// flush policy — the substitution point for mock transports.
    pub fn with_transport(
        transport: Box<dyn Transport + Send>,
        capacity: usize,
        writer: Box<dyn Writer + Send + Sync>,
    ) -> Self {
        // One slot is reserved, so anything below two cannot hold a byte.
        let capacity = capacity.max(2);
        Self {
            inner: Mutex::new(Inner {
                transport,
                buf: Vec::with_capacity(capacity),
                cache: None,
                closed: false,
            }),
            writer,
            capacity,
        }
    }

    /// Appends a byte to the output buffer.
    ///
    /// A full buffer is flushed first; if that flush fails, the error is
    /// propagated, every buffered byte is retained, and `byte` is not
    /// appended.
    pub fn put(&self, byte: u8) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        if inner.buf.len() == self.capacity - 1 {
            Self::flush_locked(self.writer.as_ref(), &mut inner)?;
        }
        inner.buf.push(byte);
        Ok(())
    }

    /// Sends every buffered byte to the transport.
    ///
    /// A no-op success on an empty buffer. On failure the buffer is left
    /// unchanged, so a later flush retransmits the same bytes.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        Self::flush_locked(self.writer.as_ref(), &mut inner)
    }

    /// Returns the next byte without consuming it.
    ///
    /// If no byte is cached, performs exactly one read attempt and caches
    /// the result. `Ok(None)` means nothing arrived within the read timeout
    /// or the device is gone — the two are indistinguishable.
    pub fn peek(&self) -> Result<Option<u8>> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        if let Some(b) = inner.cache {
            return Ok(Some(b));
        }
        let byte = Self::read_locked(&mut inner);
        inner.cache = byte;
        Ok(byte)
    }

    /// Returns the next byte, consuming it.
    ///
    /// A byte cached by [`peek`] is returned without touching the
    /// transport; otherwise exactly one read attempt is made. `Ok(None)` is
    /// the end-of-stream-equivalent, as for [`peek`].
    ///
    /// [`peek`]: Self::peek
    pub fn get(&self) -> Result<Option<u8>> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        if let Some(b) = inner.cache.take() {
            return Ok(Some(b));
        }
        Ok(Self::read_locked(&mut inner))
    }

    /// Releases the transport. Idempotent; buffered output is **not**
    /// flushed — call [`flush`](Self::flush) first if it matters.
    ///
    /// All subsequent operations fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        inner.transport.close()?;
        Ok(())
    }

    /// Number of bytes currently buffered for output.
    pub fn buffered(&self) -> usize {
        self.lock().buf.len()
    }

    /// Output buffer capacity chosen at construction.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// One read attempt from the transport; timeout and hard failure both
    /// collapse to `None`.
    fn read_locked(inner: &mut Inner) -> Option<u8> {
        let mut slot = [0u8; 1];
        match inner.transport.recv(&mut slot) {
            Ok(n) if n > 0 => Some(slot[0]),
            Ok(_) => None,
            Err(e) => {
                debug!("serial read failed: {e}");
                None
            }
        }
    }

    /// Drains the output buffer through the writer. Clears the buffer only
    /// on success.
    fn flush_locked(writer: &dyn Writer, inner: &mut Inner) -> Result<()> {
        if inner.buf.is_empty() {
            return Ok(());
        }
        trace!(bytes = inner.buf.len(), "flushing output buffer");
        writer.write_all(inner.transport.as_mut(), &inner.buf)?;
        inner.buf.clear();
        Ok(())
    }

    /// Locks the shared state, recovering from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SerialStream {
    fn drop(&mut self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            if let Err(e) = inner.transport.close() {
                debug!("serial close on drop failed: {e}");
            }
        }
    }
}

impl io::Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.put(b).map_err(io::Error::from)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Self::flush(self).map_err(io::Error::from)
    }
}

impl io::Read for SerialStream {
    /// Reads at most one byte per call (the stream performs no read-ahead);
    /// `Ok(0)` is the end-of-stream-equivalent.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.get().map_err(io::Error::from)? {
            Some(b) => {
                buf[0] = b;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// Builder for a [`SerialStream`] over a real serial device.
///
/// Defaults: 19200 baud, 8N1, 1000 ms timeout, 128-byte output buffer,
/// plain (unverified) writes.
#[derive(Debug, Clone)]
#[must_use = "a SerialStreamBuilder does nothing until .open() is called"]
pub struct SerialStreamBuilder {
    /// Device node path.
    path: PathBuf,
    /// Line configuration applied at open time.
    config: PortConfig,
    /// Output buffer capacity.
    capacity: usize,
    /// Whether every transmitted byte must be confirmed by its echo.
    echo_verified: bool,
}

impl SerialStreamBuilder {
    /// Sets the baud rate (default: 19200).
    pub const fn baud(mut self, baud: u32) -> Self {
        self.config.baud = baud;
        self
    }

    /// Sets the read/write/echo timeout (default: 1000 ms).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the output buffer capacity (default: 128).
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Selects the echo-verifying writer: each byte is confirmed by the
    /// peer's echo before the next one is sent (default: off).
    pub const fn echo_verified(mut self, on: bool) -> Self {
        self.echo_verified = on;
        self
    }

    /// Replaces the whole line configuration (e.g. a loaded profile).
    pub fn config(mut self, config: PortConfig) -> Self {
        self.config = config;
        self
    }

    /// Opens and configures the device, consuming the builder.
    #[cfg(unix)]
    pub fn open(self) -> Result<SerialStream> {
        let transport = crate::tty::TtyTransport::open(&self.path, &self.config)?;
        let writer: Box<dyn Writer + Send + Sync> = if self.echo_verified {
            Box::new(EchoWriter::new(self.config.timeout()))
        } else {
            Box::new(PlainWriter)
        };
        Ok(SerialStream::with_transport(
            Box::new(transport),
            self.capacity,
            writer,
        ))
    }
}
