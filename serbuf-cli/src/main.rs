//! CLI for buffered, echo-verified serial port I/O.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod cmd;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serbuf", version, about = "Buffered, echo-verified serial port I/O")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a payload to a serial port.
    Send(cmd::SendArgs),

    /// Receive bytes from a serial port.
    Recv(cmd::RecvArgs),

    /// Stream stdin to a serial port.
    Pipe(cmd::PipeArgs),

    /// List candidate serial device nodes.
    Ports,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Send(args) => cmd::send(&args),
        Command::Recv(args) => cmd::recv(&args),
        Command::Pipe(args) => cmd::pipe(&args),
        Command::Ports => cmd::ports(),
        Command::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "serbuf",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
