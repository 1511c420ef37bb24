mod cli;
mod collaborators;
mod config;
mod metrics;
mod wiring;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use archive_kv::Mode;
use cli::{Cli, Command};
use config::ArchiveConfig;

fn init_tracing(verbosity: u8) {
    let level = cli::verbosity_to_level(verbosity);
    tracing_subscriber::fmt().with_max_level(level).with_target(true).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    let result = match cli.command {
        Command::Init => run_init(&cli),
        Command::Run => run_server(&cli),
        Command::Gc => run_gc_once(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(target: "archive_node", error = %err, "fatal error");
            ExitCode::from(2)
        }
    }
}

fn run_init(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.db_root)?;
    ArchiveConfig::write_default(&cli.db_root, &cli.config_path)?;
    tracing::info!(
        target: "archive_node",
        db_root = %cli.db_root.display(),
        config_path = %cli.config_path.display(),
        "wrote default config"
    );
    Ok(())
}

fn run_gc_once(cli: &Cli) -> anyhow::Result<()> {
    let config = ArchiveConfig::load(&cli.db_root, &cli.config_path)?;
    let archive_ttl = config.archive_ttl;
    let node = wiring::open(&cli.db_root, config, Mode::ReadWriteExisting)?;
    let now = now_unix();
    let report = node.root_db.run_gc(now, archive_ttl)?;
    tracing::info!(
        target: "archive_node",
        destroyed_packages = report.destroyed_packages.len(),
        destroyed_cell_roots = report.destroyed_cell_roots.len(),
        "ran one gc pass"
    );
    Ok(())
}

fn run_server(cli: &Cli) -> anyhow::Result<()> {
    let config = ArchiveConfig::load(&cli.db_root, &cli.config_path)?;
    let threads = config.threads.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;
    runtime.block_on(serve(cli, config))
}

/// Runs until the process receives ctrl-c: a background task drives
/// `run_gc` on `archive_ttl`'s cadence (halved, so a slice is never more
/// than half its TTL stale by the time it is actually retired) while the
/// foreground future just waits for shutdown. The lite-query transport
/// itself is an external collaborator (§1); this binary wires the
/// dispatcher up and leaves serving requests over it to whatever process
/// embeds it.
async fn serve(cli: &Cli, config: ArchiveConfig) -> anyhow::Result<()> {
    let archive_ttl = config.archive_ttl;
    let node = wiring::open(&cli.db_root, config, Mode::ReadWrite)?;
    let root_db = node.root_db.clone();
    metrics::READY.set(1);
    tracing::info!(target: "archive_node", db_root = %cli.db_root.display(), "node ready");

    let started_at = std::time::Instant::now();
    let gc_interval = Duration::from_secs((archive_ttl / 2).max(60) as u64);
    let gc_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(gc_interval);
        loop {
            ticker.tick().await;
            metrics::UPTIME_SECS.set(started_at.elapsed().as_secs() as i64);
            let now = now_unix();
            match root_db.run_gc(now, archive_ttl) {
                Ok(report) => tracing::debug!(
                    target: "archive_node",
                    destroyed_packages = report.destroyed_packages.len(),
                    destroyed_cell_roots = report.destroyed_cell_roots.len(),
                    "periodic gc pass"
                ),
                Err(err) => tracing::warn!(target: "archive_node", error = %err, "gc pass failed"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: "archive_node", "shutdown requested");
    gc_task.abort();
    metrics::READY.set(0);
    let _ = &node.lite_server;
    let _ = &node.chain_tip;
    Ok(())
}

fn now_unix() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_is_plausible_for_the_current_era() {
        assert!(now_unix() > 1_700_000_000);
    }
}
