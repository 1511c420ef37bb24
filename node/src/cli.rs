//! CLI surface (§6 "CLI surface of surrounding tools"): `{db-root,
//! config-path, server-config, ip}` plus the one runtime tunable §6 allows,
//! `--verbosity`. Mirrors the teacher's `clap::Parser` derive style used
//! throughout `tools/*`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "archive-node", about = "Block-and-state archive engine daemon")]
pub struct Cli {
    /// Root directory for every on-disk store named in §6's layout
    /// (`<root>/celldb`, `<root>/state`, `<root>/static`,
    /// `<root>/archive`, `<root>/files`).
    #[arg(long = "db-root", default_value = "./archive-db")]
    pub db_root: PathBuf,

    /// Path to the JSON config file, resolved relative to `db-root` unless
    /// absolute.
    #[arg(long = "config-path", default_value = "archive_config.json")]
    pub config_path: PathBuf,

    /// Path to a server-identity/key config consumed only by the transport
    /// layer (an external collaborator per §1); the core does not read it,
    /// it is accepted so this binary's invocation matches the contract §6
    /// describes for the surrounding daemon wrapper.
    #[arg(long = "server-config")]
    pub server_config: Option<PathBuf>,

    /// Listen address for the (not-yet-wired) lite-server transport.
    #[arg(long)]
    pub ip: Option<SocketAddr>,

    /// The one runtime tunable §6 allows.
    #[arg(long, default_value_t = 0)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Creates `db-root` and writes a default config file, without opening
    /// any store (so it is safe to run against a path that does not exist
    /// yet).
    Init,
    /// Opens every store named in §6 and serves queries until shutdown.
    Run,
    /// Runs one `run_gc` pass against already-initialized stores and exits.
    Gc,
}

pub fn verbosity_to_level(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}
