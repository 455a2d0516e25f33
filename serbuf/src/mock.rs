//! In-memory transport for tests and development without hardware.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::transport::Transport;
use crate::write::expected_echo;

/// Scriptable transport that records what it observes on the wire.
///
/// Clones share state, so a handle kept outside a [`SerialStream`] can
/// inspect what the stream transmitted and script what it will receive:
///
/// ```
/// use serbuf::{MockTransport, Transport};
///
/// let mock = MockTransport::new();
/// mock.push_rx(b"ok");
///
/// let mut t = mock.clone();
/// t.send(b"ping").unwrap();
/// assert_eq!(mock.observed(), b"ping");
/// ```
///
/// [`SerialStream`]: crate::SerialStream
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Shared wire state.
    state: Arc<Mutex<State>>,
}

/// Wire state shared by all clones of a [`MockTransport`].
#[derive(Debug, Default)]
struct State {
    /// Bytes accepted per `send` call, in call order.
    sends: Vec<Vec<u8>>,
    /// Bytes waiting to be served by `recv`.
    rx: VecDeque<u8>,
    /// When set, every accepted byte enqueues its expected echo for `recv`.
    echo: bool,
    /// Upper bound on bytes accepted per `send` call.
    accept_at_most: Option<usize>,
    /// When set, every `send` fails with a broken-pipe error.
    write_error: bool,
    /// Simulated wire latency per `send` call.
    latency: Option<Duration>,
    /// Number of `recv` invocations.
    recv_calls: usize,
    /// Number of `close` invocations.
    close_calls: usize,
    /// A `send` call is currently in flight.
    in_send: bool,
    /// Two `send` calls overlapped in time.
    overlapped: bool,
}

impl MockTransport {
    /// Creates a silent mock: reads time out unless bytes were queued with
    /// [`push_rx`](Self::push_rx).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock peer that echoes every received byte per the echo
    /// requirement (complemented when the high bit is set).
    pub fn echoing() -> Self {
        let mock = Self::default();
        mock.lock().echo = true;
        mock
    }

    /// Queues bytes to be served by subsequent `recv` calls.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// Limits how many bytes each `send` call accepts, to exercise
    /// partial-write handling.
    pub fn set_accept_at_most(&self, n: usize) {
        self.lock().accept_at_most = Some(n);
    }

    /// Makes every subsequent `send` fail with a hard error.
    pub fn set_write_error(&self, fail: bool) {
        self.lock().write_error = fail;
    }

    /// Adds simulated wire latency to each `send` call, so overlapping
    /// flushes become observable via [`overlap_detected`](Self::overlap_detected).
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// All bytes observed on the wire, flattened in arrival order.
    pub fn observed(&self) -> Vec<u8> {
        self.lock().sends.iter().flatten().copied().collect()
    }

    /// Bytes accepted per `send` call, in call order.
    pub fn sends(&self) -> Vec<Vec<u8>> {
        self.lock().sends.clone()
    }

    /// Number of `recv` invocations so far.
    pub fn recv_calls(&self) -> usize {
        self.lock().recv_calls
    }

    /// Number of `close` invocations so far.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Whether two `send` calls ever overlapped in time.
    pub fn overlap_detected(&self) -> bool {
        self.lock().overlapped
    }

    /// Locks the shared state, recovering from a poisoned mutex.
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (n, latency) = {
            let mut state = self.lock();
            if state.write_error {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write error"));
            }
            if state.in_send {
                state.overlapped = true;
            }
            state.in_send = true;
            let n = state.accept_at_most.map_or(buf.len(), |m| m.min(buf.len()));
            (n, state.latency)
        };

        // Hold the wire "busy" outside the state lock so a concurrent send
        // would be observed as an overlap.
        if let Some(d) = latency {
            std::thread::sleep(d);
        }

        let mut state = self.lock();
        state.sends.push(buf[..n].to_vec());
        if state.echo {
            let echoes: Vec<u8> = buf[..n].iter().copied().map(expected_echo).collect();
            state.rx.extend(echoes);
        }
        state.in_send = false;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.recv_calls += 1;
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.lock().close_calls += 1;
        Ok(())
    }
}
