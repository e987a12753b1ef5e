//! Miscellaneous utilities: MAC handling, local identity detection and the
//! bounded external-command runner shared by the collectors.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use tokio::process::Command;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

lazy_static! {
    /// A colon-separated, six-octet hardware address.
    pub static ref MAC_RE: Regex =
        Regex::new(r"(?i)\b[0-9a-f]{2}(?::[0-9a-f]{2}){5}\b").expect("valid regex");

    static ref IP_LINK_RE: Regex =
        Regex::new(r"link/(?:ether|ieee802\.11)\s+([0-9A-Fa-f:]{17})").expect("valid regex");
}

// ── MAC address ───────────────────────────────────────────────────────────────

/// Normalise `raw` to the lowercase 17-character `aa:bb:cc:dd:ee:ff` form.
/// Returns `None` if `raw` is not a MAC address.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() == 17 && MAC_RE.is_match(raw) {
        Some(raw.to_ascii_lowercase())
    } else {
        None
    }
}

/// Read the MAC address of a network interface from `<sys_net_dir>/<iface>/address`.
pub fn read_mac_from_sysfs(sys_net_dir: &Path, iface: &str) -> io::Result<String> {
    let raw = fs::read_to_string(sys_net_dir.join(iface).join("address"))?;
    Ok(raw.trim().to_string())
}

/// Determine this node's own MAC address.
///
/// Tries the configured identity interfaces in order (`bat0` first, so the
/// batman-adv soft interface wins over the radios), then falls back to the
/// first Ethernet / Wi-Fi link reported by `ip -o link show up`.
pub async fn detect_local_mac(cfg: &MonitorConfig) -> Option<String> {
    for iface in &cfg.identity_ifaces {
        if let Ok(mac) = read_mac_from_sysfs(&cfg.sys_net_dir, iface) {
            if let Some(mac) = normalize_mac(&mac) {
                debug!("local MAC {mac} from {iface}");
                return Some(mac);
            }
        }
    }
    let argv = ["ip", "-o", "link", "show", "up"].map(String::from);
    match run_command(&argv, cfg.command_timeout).await {
        Ok(out) => parse_ip_link(&out),
        Err(e) => {
            warn!("local MAC fallback failed: {e}");
            None
        }
    }
}

/// Extract the first Ethernet / 802.11 link address from `ip -o link` output.
fn parse_ip_link(text: &str) -> Option<String> {
    IP_LINK_RE
        .captures(text)
        .and_then(|c| normalize_mac(&c[1]))
}

// ── External commands ─────────────────────────────────────────────────────────

/// Build the argv for a command that needs `CAP_NET_ADMIN`.
///
/// Runs the command directly as root, otherwise through `sudo -n` so a missing
/// sudoers rule fails fast instead of prompting.
pub fn privileged(argv: &[&str]) -> Vec<String> {
    let mut cmd = Vec::with_capacity(argv.len() + 2);
    if !nix::unistd::geteuid().is_root() {
        cmd.push("sudo".to_string());
        cmd.push("-n".to_string());
    }
    cmd.extend(argv.iter().map(|s| s.to_string()));
    cmd
}

/// Run `argv` and return its stdout.
///
/// Spawn failures, non-zero exit and exceeding `timeout` are all errors; the
/// child is killed if the timeout fires.
pub async fn run_command(argv: &[String], timeout: Duration) -> Result<String> {
    let cmd = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| MonitorError::Command {
        cmd:    cmd.clone(),
        reason: "empty command".into(),
    })?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => {
            return Err(MonitorError::Command { cmd, reason: e.to_string() });
        }
        Err(_) => return Err(MonitorError::Timeout(cmd)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            output.status.to_string()
        } else {
            format!("{} ({stderr})", output.status)
        };
        return Err(MonitorError::Command { cmd, reason });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_accepts_mixed_case() {
        assert_eq!(
            normalize_mac(" AA:bb:CC:dd:EE:ff\n").as_deref(),
            Some("aa:bb:cc:dd:ee:ff")
        );
        assert!(normalize_mac("aa:bb:cc:dd:ee").is_none());
        assert!(normalize_mac("aa-bb-cc-dd-ee-ff").is_none());
        assert!(normalize_mac("zz:bb:cc:dd:ee:ff").is_none());
    }

    #[test]
    fn ip_link_fallback_picks_first_link_address() {
        let out = "1: lo: <LOOPBACK,UP> mtu 65536 qdisc noqueue state UNKNOWN \\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00\n\
                   2: eth0: <BROADCAST,UP> mtu 1500 \\    link/ether DC:A6:32:01:02:03 brd ff:ff:ff:ff:ff:ff\n\
                   3: wlan0: <BROADCAST,UP> mtu 1500 \\    link/ether dc:a6:32:09:09:09 brd ff:ff:ff:ff:ff:ff\n";
        assert_eq!(parse_ip_link(out).as_deref(), Some("dc:a6:32:01:02:03"));
        assert!(parse_ip_link("1: lo: link/loopback 00:00:00:00:00:00").is_none());
    }

    #[tokio::test]
    async fn identity_prefers_configured_interface_order() {
        let dir = tempfile::tempdir().unwrap();
        for (iface, mac) in [("wlan0", "02:00:00:00:00:02"), ("mesh0", "02:00:00:00:00:01\n")] {
            fs::create_dir_all(dir.path().join(iface)).unwrap();
            fs::write(dir.path().join(iface).join("address"), mac).unwrap();
        }
        let cfg = MonitorConfig {
            sys_net_dir: dir.path().to_path_buf(),
            ..MonitorConfig::default()
        };
        assert_eq!(
            detect_local_mac(&cfg).await.as_deref(),
            Some("02:00:00:00:00:01")
        );
    }

    #[test]
    fn privileged_keeps_command_tail() {
        let cmd = privileged(&["batctl", "o"]);
        assert_eq!(&cmd[cmd.len() - 2..], ["batctl", "o"]);
        if nix::unistd::geteuid().is_root() {
            assert_eq!(cmd.len(), 2);
        } else {
            assert_eq!(&cmd[..2], ["sudo", "-n"]);
        }
    }

    #[tokio::test]
    async fn run_command_returns_stdout() {
        let out = run_command(&argv(&["echo", "hello"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn run_command_reports_nonzero_exit() {
        let err = run_command(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            MonitorError::Command { reason, .. } => assert!(reason.contains("boom"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn run_command_reports_missing_binary() {
        let err = run_command(&argv(&["/nonexistent/batctl", "o"]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Command { .. }));
    }

    #[tokio::test]
    async fn run_command_times_out() {
        let err = run_command(&argv(&["sleep", "5"]), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Timeout(_)));
    }
}
