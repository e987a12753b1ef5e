//! Poll loop.
//!
//! Flow:
//!   1. Determine the local MAC once
//!   2. Start the snapshot writer
//!   3. Loop: collect routes + stations + power, merge, hand off, sleep
//!   4. On SIGINT / SIGTERM: stop before the next cycle, let the writer finish

use std::future::Future;

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::snapshot::{self, HostnameResolver, LocalNode, NoHostnames, Snapshot};
use crate::{batman, power, publisher, station, util};

/// Run until interrupted.  The caller must already hold the instance lock.
pub async fn run(cfg: MonitorConfig) {
    let local_mac = util::detect_local_mac(&cfg).await;
    if local_mac.is_none() {
        warn!("local MAC unknown; self-suppression disabled");
    }
    info!(
        "start | local_mac={} ifaces={:?}",
        local_mac.as_deref().unwrap_or("-"),
        cfg.wifi_ifaces
    );

    let (publisher, writer) = publisher::spawn(cfg.status_file.clone());
    poll_loop(&cfg, local_mac.as_deref(), &publisher, shutdown_signal()).await;

    info!("exit");
    drop(publisher);
    if let Err(e) = writer.await {
        warn!("writer task ended abnormally: {e}");
    }
}

/// Build and submit one snapshot per interval until `shutdown` resolves.
///
/// Shutdown is honoured while a cycle's commands are running (the cycle is
/// abandoned and its children killed) and while sleeping.
async fn poll_loop(
    cfg:       &MonitorConfig,
    local_mac: Option<&str>,
    publisher: &publisher::Publisher,
    shutdown:  impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        let snapshot = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            s = build_snapshot(cfg, local_mac, &NoHostnames) => s,
        };
        publisher.submit(snapshot);

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(cfg.poll_interval) => {}
        }
    }
}

/// Run the collectors once and merge their results.
pub async fn build_snapshot(
    cfg:       &MonitorConfig,
    local_mac: Option<&str>,
    hostnames: &dyn HostnameResolver,
) -> Snapshot {
    let timestamp = Utc::now().timestamp();

    let routes   = batman::collect(cfg, local_mac).await;
    let stations = station::collect(cfg).await;
    let power    = power::read_power_state(&cfg.power_supply_dir);
    let local    = LocalNode::new(local_mac, power);

    let snap = snapshot::merge(timestamp, &routes, &stations, local, hostnames);
    debug!(
        "cycle: {} originator(s), {} station(s), {} node(s)",
        routes.len(),
        stations.len(),
        snap.nodes.len()
    );
    snap
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = term.recv() => info!("SIGTERM received"),
    }
}
