//! Error types for serbuf operations.

use std::io;

/// Alias for `Result<T, serbuf::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by serial stream operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A line-configuration step failed while opening the port.
    ///
    /// The whole open is aborted; the device handle acquired so far (if any)
    /// is closed before this error is returned.
    #[error("{op}: {source}")]
    Config {
        /// The configuration step that failed (`"open"`, `"tcgetattr"`,
        /// `"baud"`, `"data-bits"`, `"stop-bits"`, `"tcsetattr"`,
        /// `"tcflush"`).
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A hard OS-level write failure aborted the current flush.
    ///
    /// Buffered bytes are retained; a later flush retransmits all of them.
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),

    /// No confirming echo arrived within the per-byte deadline.
    ///
    /// The named byte was already physically transmitted — this error means
    /// delivery could not be confirmed, not that nothing was sent. The flush
    /// is aborted and buffered bytes are retained.
    #[error("no echo for byte {byte:#04x} within the deadline")]
    EchoTimeout {
        /// The byte whose echo never arrived.
        byte: u8,
    },

    /// Operation on a stream whose transport has already been released.
    #[error("stream is closed")]
    Closed,

    /// An I/O error outside the write path (release, adapters).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Write(io) | Error::Io(io) => io,
            err @ Error::EchoTimeout { .. } => Self::new(io::ErrorKind::TimedOut, err),
            err @ Error::Closed => Self::new(io::ErrorKind::NotConnected, err),
            err @ Error::Config { .. } => Self::other(err),
        }
    }
}
