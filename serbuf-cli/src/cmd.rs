//! Subcommand implementations.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use serbuf::{Parity, PortConfig, SerialStream};

/// Options shared by every subcommand that opens a port.
#[derive(Args)]
pub struct PortArgs {
    /// Serial device node (e.g. /dev/ttyUSB0).
    pub port: String,

    /// Baud rate.
    #[arg(long)]
    pub baud: Option<u32>,

    /// Read/write/echo timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Parity mode (none, odd, even).
    #[arg(long)]
    pub parity: Option<Parity>,

    /// Load a JSON configuration profile; flags override its fields.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl PortArgs {
    /// Resolves the effective line configuration: profile file first, then
    /// flag overrides.
    fn resolve(&self) -> Result<PortConfig> {
        let mut config = match &self.config {
            Some(path) => PortConfig::load(path)
                .with_context(|| format!("failed to load profile {}", path.display()))?,
            None => PortConfig::default(),
        };
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if let Some(parity) = self.parity {
            config.parity = parity;
        }
        Ok(config)
    }

    /// Opens the stream with the resolved configuration.
    fn open(&self, echo_verified: bool) -> Result<SerialStream> {
        let stream = SerialStream::builder(&self.port)
            .config(self.resolve()?)
            .echo_verified(echo_verified)
            .open()
            .with_context(|| format!("failed to open {}", self.port))?;
        Ok(stream)
    }
}

#[derive(Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Payload to send.
    pub data: String,

    /// Interpret the payload as hex bytes (e.g. `45 0a` or `450a`).
    #[arg(long)]
    pub hex: bool,

    /// Require a confirming echo for every transmitted byte.
    #[arg(long)]
    pub echo: bool,
}

/// Buffers the payload and flushes it to the port.
pub fn send(args: &SendArgs) -> Result<()> {
    let payload = if args.hex {
        let compact: String = args.data.split_whitespace().collect();
        hex::decode(&compact).context("invalid hex payload")?
    } else {
        args.data.clone().into_bytes()
    };
    if payload.is_empty() {
        bail!("empty payload");
    }

    let stream = args.port.open(args.echo)?;
    for b in &payload {
        stream.put(*b)?;
    }
    stream.flush()?;
    eprintln!("sent {} bytes", payload.len());
    Ok(())
}

#[derive(Args)]
pub struct RecvArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Stop after this many bytes (default: stop at the first timeout).
    #[arg(long)]
    pub count: Option<usize>,
}

/// Reads bytes from the port to stdout.
pub fn recv(args: &RecvArgs) -> Result<()> {
    let stream = args.port.open(false)?;
    let mut stdout = io::stdout().lock();

    let mut received = 0usize;
    loop {
        if args.count.is_some_and(|n| received >= n) {
            break;
        }
        match stream.get()? {
            Some(b) => {
                stdout.write_all(&[b])?;
                received += 1;
            }
            // Nothing within the timeout; with an explicit count keep
            // waiting for the remainder.
            None if args.count.is_some() => {}
            None => break,
        }
    }
    stdout.flush()?;
    eprintln!("received {received} bytes");
    Ok(())
}

#[derive(Args)]
pub struct PipeArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Require a confirming echo for every transmitted byte.
    #[arg(long)]
    pub echo: bool,
}

/// Streams stdin to the port until end of input.
pub fn pipe(args: &PipeArgs) -> Result<()> {
    let mut stream = args.port.open(args.echo)?;
    let n = io::copy(&mut io::stdin().lock(), &mut stream)?;
    Write::flush(&mut stream)?;
    eprintln!("piped {n} bytes");
    Ok(())
}

/// Device name prefixes that usually denote serial ports.
const PORT_PREFIXES: &[&str] = &["ttyUSB", "ttyACM", "ttyS", "cu."];

/// Lists device nodes under /dev that look like serial ports.
pub fn ports() -> Result<()> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir("/dev").context("failed to list /dev")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if PORT_PREFIXES.iter().any(|p| name.starts_with(p)) {
            found.push(entry.path());
        }
    }
    found.sort();

    if found.is_empty() {
        eprintln!("no serial device nodes found");
    }
    for path in found {
        println!("{}", path.display());
    }
    Ok(())
}
