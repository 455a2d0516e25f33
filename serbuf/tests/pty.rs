//! End-to-end tests against a pseudo-terminal pair: the slave side plays
//! the serial device, the master side plays the peer.

#![cfg(target_os = "linux")]
#![allow(unsafe_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::thread;
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};

use serbuf::{Error, PortConfig, SerialStream, TtyTransport, expected_echo};

/// Allocates a pty pair, returning the master as a [`File`] and the slave's
/// device path.
fn open_pty() -> (File, String) {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
    grantpt(&master).unwrap();
    unlockpt(&master).unwrap();
    let slave_path = ptsname_r(&master).unwrap();
    let master = unsafe { File::from_raw_fd(master.into_raw_fd()) };
    (master, slave_path)
}

#[test]
fn plain_flush_arrives_at_the_peer() {
    let (mut master, slave_path) = open_pty();

    let stream = SerialStream::builder(&slave_path)
        .timeout(Duration::from_millis(200))
        .open()
        .unwrap();
    for b in b"over the wire" {
        stream.put(*b).unwrap();
    }
    stream.flush().unwrap();

    let mut got = vec![0u8; b"over the wire".len()];
    master.read_exact(&mut got).unwrap();
    assert_eq!(got, b"over the wire");
}

#[test]
fn get_returns_peer_bytes_then_times_out() {
    let (mut master, slave_path) = open_pty();

    let stream = SerialStream::builder(&slave_path)
        .timeout(Duration::from_millis(200))
        .open()
        .unwrap();

    master.write_all(b"G").unwrap();
    // Bounded wait: the byte crosses the pty asynchronously.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match stream.get().unwrap() {
            Some(b) => {
                assert_eq!(b, b'G');
                break;
            }
            None => assert!(Instant::now() < deadline, "byte never arrived"),
        }
    }

    // Nothing else pending: the read times out into the
    // end-of-stream-equivalent.
    assert_eq!(stream.get().unwrap(), None);
}

#[test]
fn echo_verified_flush_succeeds_against_an_echoing_peer() {
    let (mut master, slave_path) = open_pty();

    // The peer echoes every byte per the echo requirement.
    let echoer = thread::spawn(move || {
        let mut seen = Vec::new();
        let mut slot = [0u8; 1];
        loop {
            match master.read(&mut slot) {
                Ok(n) if n > 0 => {
                    seen.push(slot[0]);
                    master.write_all(&[expected_echo(slot[0])]).unwrap();
                }
                _ => return seen, // slave closed
            }
        }
    });

    let payload = [b'h', b'i', 0x80, 0xff];
    {
        let stream = SerialStream::builder(&slave_path)
            .timeout(Duration::from_millis(500))
            .echo_verified(true)
            .open()
            .unwrap();
        for b in payload {
            stream.put(b).unwrap();
        }
        stream.flush().unwrap();
    } // drop closes the slave, stopping the echoer

    assert_eq!(echoer.join().unwrap(), payload);
}

#[test]
fn echo_verified_flush_times_out_against_a_silent_peer() {
    let (_master, slave_path) = open_pty();

    let timeout = Duration::from_millis(100);
    let stream = SerialStream::builder(&slave_path)
        .timeout(timeout)
        .echo_verified(true)
        .open()
        .unwrap();
    stream.put(b'x').unwrap();

    let start = Instant::now();
    let err = stream.flush().unwrap_err();
    assert!(matches!(err, Error::EchoTimeout { byte: b'x' }));
    assert!(start.elapsed() >= timeout);
}

#[test]
fn invalid_line_settings_fail_the_open_by_step() {
    let (_master, slave_path) = open_pty();

    let err = TtyTransport::open(
        &slave_path,
        &PortConfig {
            baud: 12_345,
            ..PortConfig::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config { op: "baud", .. }));

    let err = TtyTransport::open(
        &slave_path,
        &PortConfig {
            data_bits: 9,
            ..PortConfig::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config { op: "data-bits", .. }));

    let err = TtyTransport::open(
        &slave_path,
        &PortConfig {
            stop_bits: 3,
            ..PortConfig::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config { op: "stop-bits", .. }));
}
