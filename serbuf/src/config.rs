//! Serial line configuration and JSON persistence.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};

/// Default baud rate for serial communication.
pub const DEFAULT_BAUD: u32 = 19_200;

/// Default output buffer capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 128;

/// Default read/write/echo timeout in milliseconds.
///
/// After one second it can be assumed that there is a problem with the
/// connection.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Parity bit generation and checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Odd => "odd",
            Self::Even => "even",
        })
    }
}

impl std::str::FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "odd" => Ok(Self::Odd),
            "even" => Ok(Self::Even),
            _ => Err(format!("unknown parity: {s}")),
        }
    }
}

/// Line configuration applied to a serial device at open time.
///
/// Applied in full during [`TtyTransport::open`]; a failure at any step
/// aborts the whole open. The same timeout bounds single read attempts,
/// single write attempts, and the per-byte echo deadline.
///
/// [`TtyTransport::open`]: crate::TtyTransport::open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Signalling rate in baud.
    pub baud: u32,
    /// Bits per byte (5–8).
    pub data_bits: u8,
    /// Parity mode.
    pub parity: Parity,
    /// Stop bit count (1 or 2).
    pub stop_bits: u8,
    /// Read/write/echo timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl PortConfig {
    /// The configured timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Loads a configuration profile from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Persists this configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_19200_8n1() {
        let cfg = PortConfig::default();
        assert_eq!(cfg.baud, 19_200);
        assert_eq!(cfg.data_bits, 8);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.stop_bits, 1);
        assert_eq!(cfg.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn json_roundtrip() {
        let cfg = PortConfig {
            baud: 115_200,
            data_bits: 7,
            parity: Parity::Even,
            stop_bits: 2,
            timeout_ms: 250,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: PortConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let cfg = PortConfig {
            baud: 9600,
            ..PortConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(PortConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn parity_parse_and_display() {
        assert_eq!("even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("ODD".parse::<Parity>().unwrap(), Parity::Odd);
        assert!("mark".parse::<Parity>().is_err());
        assert_eq!(Parity::None.to_string(), "none");
    }
}
