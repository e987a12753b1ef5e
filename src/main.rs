//! B.A.T.M.A.N. mesh node status monitor.
//!
//! Polls `batctl o` and `iw ... station dump`, merges them with the local
//! power state and publishes `/opt/orbis_data/ogm/node_status.json` for the
//! web UI and the OLED display.
//!
//! Usage:
//!   ogm-monitor            # log to syslog
//!   ogm-monitor --stderr   # log to stderr

mod batman;
mod config;
mod error;
mod lock;
mod monitor;
mod power;
mod publisher;
mod snapshot;
mod station;
mod util;

use std::process;

use clap::Parser;
use log::{error, info};

use crate::config::MonitorConfig;
use crate::lock::InstanceLock;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ogm-monitor", about = "Mesh node status aggregator (batctl + iw)")]
struct Cli {
    /// Log to stderr instead of syslog (useful for debugging).
    #[arg(long)]
    stderr: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(!cli.stderr) {
        eprintln!("ogm-monitor: logging setup failed: {e}");
        process::exit(1);
    }

    let cfg = MonitorConfig::default();

    // Held until the process exits.
    let _lock = match InstanceLock::try_acquire(&cfg.lock_file) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            info!("another instance is running; exiting");
            return;
        }
        Err(e) => {
            error!("cannot lock {}: {e}", cfg.lock_file.display());
            process::exit(1);
        }
    };

    monitor::run(cfg).await;
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process:  "ogm-monitor".into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .parse_default_env()
            .init();
    }
    Ok(())
}
