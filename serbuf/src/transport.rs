//! The transport capability: raw byte I/O over a serial device.

use std::io;

/// Raw byte transport over a serial device.
///
/// This is the substitution seam of the crate: [`SerialStream`] talks to the
/// wire exclusively through this trait, so a [`MockTransport`] can stand in
/// for real hardware without recompiling anything.
///
/// Blocking behavior is governed entirely by the configuration applied when
/// the transport was opened — neither method loops or retries internally.
///
/// [`SerialStream`]: crate::SerialStream
/// [`MockTransport`]: crate::MockTransport
pub trait Transport {
    /// One bounded-time write attempt. Returns the number of bytes the
    /// device accepted, which may be less than `buf.len()`.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// One bounded-time read attempt into `buf`. Returns `Ok(0)` when the
    /// timeout elapses with nothing received.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the underlying device. Idempotent — a second call is a
    /// no-op.
    fn close(&mut self) -> io::Result<()>;
}
