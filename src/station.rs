//! Per-station Wi-Fi link metrics (`iw dev <iface> station dump`).
//!
//! `iw` prints one block per associated station:
//!
//! ```text
//! Station 11:22:33:44:55:66 (on wlan1)
//!         inactive time:  40 ms
//!         rx packets:     103
//!         signal:         -45 [-47, -49] dBm
//!         tx bitrate:     65.0 MBit/s MCS 7 short GI
//! ```
//!
//! Attribute lines differ between driver and `iw` versions, so each one is
//! matched against a table of independent patterns and anything unrecognised
//! is ignored.

use std::collections::BTreeMap;
use std::future::Future;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::util;

/// Link metrics for one station.  A field is `None` when `iw` did not report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_dbm:      Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_packets:      Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_drop_misc:    Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_packets:      Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_retries:      Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_failed:       Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_bitrate_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_bitrate_mbps: Option<f64>,
}

impl LinkMetrics {
    pub fn is_empty(&self) -> bool {
        *self == LinkMetrics::default()
    }
}

pub type StationTable = BTreeMap<String, LinkMetrics>;

/// Attribute recognised inside a station block.
#[derive(Debug, Clone, Copy)]
enum Attr {
    Signal,
    SignalAvg,
    RxPackets,
    RxDropMisc,
    TxPackets,
    TxRetries,
    TxFailed,
    TxBitrate,
    RxBitrate,
}

lazy_static! {
    static ref HEADER_RE: Regex =
        Regex::new(r"(?i)\bStation\s+([0-9a-f]{2}(?::[0-9a-f]{2}){5})\b").expect("valid regex");

    /// Attribute patterns, anchored at the start of the trimmed line so that
    /// `last ack signal:` or `beacon signal avg:` never match a shorter name.
    /// Capture group 1 holds the raw value.
    static ref ATTRIBUTES: Vec<(Attr, Regex)> = [
        (Attr::Signal,     r"signal:\s*(-?\d+(?:\.\d+)?)\s*(?:\[[^\]]*\])?\s*dBm\b"),
        (Attr::SignalAvg,  r"signal\s+avg:\s*(-?\d+(?:\.\d+)?)\s*(?:\[[^\]]*\])?\s*dBm\b"),
        (Attr::RxPackets,  r"rx\s+packets:\s*(\d+)\b"),
        (Attr::RxDropMisc, r"rx\s+drop\s+misc:\s*(\d+)\b"),
        (Attr::TxPackets,  r"tx\s+packets:\s*(\d+)\b"),
        (Attr::TxRetries,  r"tx\s+retries:\s*(\d+)\b"),
        (Attr::TxFailed,   r"tx\s+failed:\s*(\d+)\b"),
        (Attr::TxBitrate,  r"tx\s+bitrate:\s*(.+)$"),
        (Attr::RxBitrate,  r"rx\s+bitrate:\s*(.+)$"),
    ]
    .into_iter()
    .map(|(attr, pat)| (attr, Regex::new(&format!("(?i)^{pat}")).expect("valid regex")))
    .collect();

    static ref BITRATE_RE: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([kmg])(?:bit/s|b/s|bps)\b").expect("valid regex");
}

/// Query the configured interfaces in priority order and return the stations
/// of the first one that reports any.
pub async fn collect(cfg: &MonitorConfig) -> StationTable {
    first_populated(&cfg.wifi_ifaces, |iface| {
        let argv = util::privileged(&["iw", "dev", iface, "station", "dump"]);
        async move { util::run_command(&argv, cfg.command_timeout).await }
    })
    .await
}

/// Run `dump` for each interface in turn and stop at the first whose output
/// parses to at least one station.  Interfaces whose dump fails or yields only
/// empty blocks are skipped; results are never merged across interfaces.
async fn first_populated<F, Fut>(ifaces: &[String], mut dump: F) -> StationTable
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    for iface in ifaces {
        let out = match dump(iface).await {
            Ok(o) => o,
            Err(e) => {
                warn!("iw error on {iface}: {e}");
                continue;
            }
        };
        let stations = parse_station_dump(&out);
        if stations.is_empty() {
            debug!("iw {iface}: no stations");
            continue;
        }
        info!("iw {iface}: parsed {} station(s)", stations.len());
        return stations;
    }
    StationTable::new()
}

/// Parse `iw ... station dump` output into per-station metrics keyed by
/// lowercase MAC.  Blocks that yield no recognised attribute are dropped.
pub fn parse_station_dump(text: &str) -> StationTable {
    let mut stations = StationTable::new();
    let mut current: Option<(String, StationBlock)> = None;

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(c) = HEADER_RE.captures(line) {
            flush(&mut stations, current.take());
            current = Some((c[1].to_ascii_lowercase(), StationBlock::default()));
            continue;
        }

        let Some((_, block)) = current.as_mut() else {
            continue;
        };
        for (attr, re) in ATTRIBUTES.iter() {
            if let Some(c) = re.captures(line) {
                block.apply(*attr, &c[1]);
            }
        }
    }
    flush(&mut stations, current.take());

    stations
}

fn flush(stations: &mut StationTable, current: Option<(String, StationBlock)>) {
    let Some((mac, block)) = current else { return };
    let metrics = block.finish();
    debug!("station {mac} parsed -> {metrics:?}");
    if !metrics.is_empty() {
        stations.insert(mac, metrics);
    }
}

/// Accumulator for the block currently being parsed.
#[derive(Debug, Default)]
struct StationBlock {
    metrics:    LinkMetrics,
    signal_avg: Option<f64>,
}

impl StationBlock {
    fn apply(&mut self, attr: Attr, value: &str) {
        let m = &mut self.metrics;
        match attr {
            Attr::Signal     => set(&mut m.signal_dbm, value.parse().ok()),
            Attr::SignalAvg  => set(&mut self.signal_avg, value.parse().ok()),
            Attr::RxPackets  => set(&mut m.rx_packets, value.parse().ok()),
            Attr::RxDropMisc => set(&mut m.rx_drop_misc, value.parse().ok()),
            Attr::TxPackets  => set(&mut m.tx_packets, value.parse().ok()),
            Attr::TxRetries  => set(&mut m.tx_retries, value.parse().ok()),
            Attr::TxFailed   => set(&mut m.tx_failed, value.parse().ok()),
            Attr::TxBitrate  => set(&mut m.tx_bitrate_mbps, parse_bitrate_mbps(value)),
            Attr::RxBitrate  => set(&mut m.rx_bitrate_mbps, parse_bitrate_mbps(value)),
        }
    }

    /// The instantaneous signal wins over the average wherever it appeared.
    fn finish(self) -> LinkMetrics {
        let mut metrics = self.metrics;
        metrics.signal_dbm = metrics.signal_dbm.or(self.signal_avg);
        metrics
    }
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Convert an `iw` bitrate string (`65.0 MBit/s MCS 7`, `6 Mb/s`, ...) to Mbit/s.
fn parse_bitrate_mbps(text: &str) -> Option<f64> {
    let c = BITRATE_RE.captures(text)?;
    let value: f64 = c[1].parse().ok()?;
    match c[2].to_ascii_lowercase().as_str() {
        "k" => Some(value / 1000.0),
        "g" => Some(value * 1000.0),
        _   => Some(value),
    }
}
