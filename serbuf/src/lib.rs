//! Buffered byte stream over a serial line with echo-verified delivery.
//!
//! `serbuf` wraps a raw serial device into a [`SerialStream`]: outgoing
//! bytes are buffered and flushed in one piece, incoming bytes are fetched
//! one at a time, and an optional half-duplex echo protocol confirms every
//! transmitted byte before the next one goes out.
//!
//! # Quick start — send a byte over the wire
//!
//! ```no_run
//! use serbuf::SerialStream;
//!
//! let stream = SerialStream::builder("/dev/ttyUSB0")
//!     .baud(19_200)
//!     .echo_verified(true)
//!     .open()
//!     .expect("failed to open serial port");
//!
//! stream.put(b'E').expect("buffer byte");
//! stream.flush().expect("send over the wire");
//! ```
//!
//! The device is talked to through the [`Transport`] capability, so tests
//! and hardware-less development can substitute a [`MockTransport`] via
//! [`SerialStream::with_transport`].

mod config;
mod error;
mod mock;
mod stream;
mod transport;
#[cfg(unix)]
mod tty;
mod write;

pub use config::{DEFAULT_BAUD, DEFAULT_CAPACITY, DEFAULT_TIMEOUT_MS, Parity, PortConfig};
pub use error::{Error, Result};
pub use mock::MockTransport;
pub use stream::{SerialStream, SerialStreamBuilder};
pub use transport::Transport;
#[cfg(unix)]
pub use tty::TtyTransport;
pub use write::{EchoWriter, PlainWriter, Writer, expected_echo};
