//! Unix serial transport: device acquisition, line configuration, release.
//!
//! # Platform
//!
//! This module is only available on Unix (Linux / macOS).

#![cfg(unix)]

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{
    BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices, Termios, cfmakeraw,
    cfsetspeed, tcflush, tcgetattr, tcsetattr,
};
use nix::unistd;
use tracing::debug;

use crate::config::{Parity, PortConfig};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Serial transport backed by a Unix terminal device.
///
/// The file descriptor is acquired and fully configured by [`open`]; any
/// configuration step failing closes it again before the error is returned.
/// Release happens exactly once, via [`Transport::close`] or drop.
///
/// [`open`]: Self::open
#[derive(Debug)]
pub struct TtyTransport {
    /// The device handle. `None` once released.
    fd: Option<OwnedFd>,
    /// Bound on a single write attempt.
    timeout: Duration,
}

impl TtyTransport {
    /// Opens and configures a serial device node.
    ///
    /// Steps, each independently fallible with a distinct
    /// [`Error::Config`] op: open the node read/write without making it the
    /// controlling terminal, read the current line discipline, apply baud
    /// rate / byte size / parity / stop bits / read timeout, and flush both
    /// queues so stale bytes cannot satisfy a later echo wait. Any failure
    /// aborts the whole open; no partial retry.
    pub fn open(path: impl AsRef<Path>, config: &PortConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| Error::Config { op: "open", source })?;

        let fd = OwnedFd::from(file);
        apply_line_config(&fd, config)?;

        debug!(path = %path.display(), baud = config.baud, "serial port configured");
        Ok(Self {
            fd: Some(fd),
            timeout: config.timeout(),
        })
    }

    /// Borrows the device fd, failing if the transport was released.
    fn fd(&self) -> io::Result<BorrowedFd<'_>> {
        self.fd
            .as_ref()
            .map(AsFd::as_fd)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial transport closed"))
    }
}

impl Transport for TtyTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let fd = self.fd()?;

        // termios has no write timeout; bound the attempt with poll(2).
        let timeout = PollTimeout::from(
            u16::try_from(self.timeout.as_millis()).unwrap_or(u16::MAX),
        );
        let mut fds = [PollFd::new(fd, PollFlags::POLLOUT)];
        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "serial write timed out",
                    ));
                }
                Ok(_) => break,
                Err(Errno::EINTR) => {}
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }

        loop {
            match unistd::write(fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.fd()?;
        // Single attempt; VMIN/VTIME bound the blocking and a timeout
        // surfaces as a zero-byte read.
        loop {
            match unistd::read(fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the OwnedFd closes the device; a second call finds None.
        if self.fd.take().is_some() {
            debug!("serial port released");
        }
        Ok(())
    }
}

/// Applies the full line configuration to an open device fd.
fn apply_line_config(fd: &OwnedFd, config: &PortConfig) -> Result<()> {
    let mut tio: Termios = tcgetattr(fd).map_err(config_err("tcgetattr"))?;

    // Raw mode: no line editing, no translation, no signals.
    cfmakeraw(&mut tio);

    let rate = baud_flag(config.baud).ok_or_else(|| Error::Config {
        op: "baud",
        source: io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {}", config.baud),
        ),
    })?;
    cfsetspeed(&mut tio, rate).map_err(config_err("baud"))?;

    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;

    tio.control_flags &= !ControlFlags::CSIZE;
    tio.control_flags |= match config.data_bits {
        5 => ControlFlags::CS5,
        6 => ControlFlags::CS6,
        7 => ControlFlags::CS7,
        8 => ControlFlags::CS8,
        n => {
            return Err(Error::Config {
                op: "data-bits",
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported byte size {n}"),
                ),
            });
        }
    };

    match config.parity {
        Parity::None => tio.control_flags &= !(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Odd => tio.control_flags |= ControlFlags::PARENB | ControlFlags::PARODD,
        Parity::Even => {
            tio.control_flags |= ControlFlags::PARENB;
            tio.control_flags &= !ControlFlags::PARODD;
        }
    }

    match config.stop_bits {
        1 => tio.control_flags &= !ControlFlags::CSTOPB,
        2 => tio.control_flags |= ControlFlags::CSTOPB,
        n => {
            return Err(Error::Config {
                op: "stop-bits",
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported stop bit count {n}"),
                ),
            });
        }
    }

    // Bounded read: return after VTIME deciseconds with whatever arrived.
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = vtime(config.timeout());

    tcsetattr(fd, SetArg::TCSANOW, &tio).map_err(config_err("tcsetattr"))?;
    tcflush(fd, FlushArg::TCIOFLUSH).map_err(config_err("tcflush"))?;
    Ok(())
}

/// Wraps an errno into a configuration error naming the failed step.
fn config_err(op: &'static str) -> impl FnOnce(Errno) -> Error {
    move |e| Error::Config {
        op,
        source: io::Error::from_raw_os_error(e as i32),
    }
}

/// Maps a numeric baud rate to its termios constant.
fn baud_flag(baud: u32) -> Option<BaudRate> {
    match baud {
        1200 => Some(BaudRate::B1200),
        2400 => Some(BaudRate::B2400),
        4800 => Some(BaudRate::B4800),
        9600 => Some(BaudRate::B9600),
        19_200 => Some(BaudRate::B19200),
        38_400 => Some(BaudRate::B38400),
        57_600 => Some(BaudRate::B57600),
        115_200 => Some(BaudRate::B115200),
        230_400 => Some(BaudRate::B230400),
        _ => None,
    }
}

/// Converts a read timeout to VTIME deciseconds, clamped to the field's
/// valid range (0 would mean a non-blocking read).
fn vtime(timeout: Duration) -> u8 {
    u8::try_from(timeout.as_millis() / 100).unwrap_or(u8::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_rates_map_to_flags() {
        assert_eq!(baud_flag(19_200), Some(BaudRate::B19200));
        assert_eq!(baud_flag(115_200), Some(BaudRate::B115200));
        assert_eq!(baud_flag(12_345), None);
    }

    #[test]
    fn vtime_is_clamped_to_valid_range() {
        assert_eq!(vtime(Duration::from_millis(1000)), 10);
        assert_eq!(vtime(Duration::from_millis(50)), 1);
        assert_eq!(vtime(Duration::from_secs(3600)), u8::MAX);
    }

    #[test]
    fn open_names_the_failed_step() {
        let err = TtyTransport::open("/nonexistent/device", &PortConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config { op: "open", .. }));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn configuring_a_non_tty_fails_at_tcgetattr() {
        // /dev/null opens fine but is not a terminal; the handle acquired in
        // the first step is closed again by the failure path.
        let err = TtyTransport::open("/dev/null", &PortConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config { op: "tcgetattr", .. }));
    }
}
