//! Monitor configuration.
//!
//! The monitor ships to a single appliance image, so there is no config file
//! and no runtime reconfiguration: [`MonitorConfig::default`] *is* the
//! deployment.  The struct exists so tests can point the collectors and the
//! publisher at temporary paths.

use std::path::PathBuf;
use std::time::Duration;

// Default constants
const STATUS_FILE:      &str = "/opt/orbis_data/ogm/node_status.json";
const LOCK_FILE:        &str = "/tmp/ogm_monitor.lock";
const SYS_NET_DIR:      &str = "/sys/class/net";
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";
const POLL_INTERVAL:    u64  = 5;
const COMMAND_TIMEOUT:  u64  = 10;

/// Full monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    // ── Output ────────────────────────────────────────────────────────────────
    /// Published snapshot, replaced atomically every cycle.
    pub status_file: PathBuf,
    /// Advisory lock guarding against a second collector instance.
    pub lock_file: PathBuf,
    // ── Collection ────────────────────────────────────────────────────────────
    /// Interfaces queried with `iw dev <iface> station dump`, in priority order.
    pub wifi_ifaces: Vec<String>,
    /// Interfaces whose hardware address identifies this node, in priority order.
    pub identity_ifaces: Vec<String>,
    pub sys_net_dir:      PathBuf,
    pub power_supply_dir: PathBuf,
    // ── Timing ────────────────────────────────────────────────────────────────
    pub poll_interval:   Duration,
    /// Upper bound on every external command invocation.
    pub command_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_file:      PathBuf::from(STATUS_FILE),
            lock_file:        PathBuf::from(LOCK_FILE),
            wifi_ifaces:      vec!["wlan1".into(), "mesh0".into(), "wlan0".into()],
            identity_ifaces:  vec!["bat0".into(), "mesh0".into(), "wlan1".into(), "wlan0".into()],
            sys_net_dir:      PathBuf::from(SYS_NET_DIR),
            power_supply_dir: PathBuf::from(POWER_SUPPLY_DIR),
            poll_interval:    Duration::from_secs(POLL_INTERVAL),
            command_timeout:  Duration::from_secs(COMMAND_TIMEOUT),
        }
    }
}
