//! The published node-status document and the merge that produces it.
//!
//! ```json
//! {
//!   "timestamp": 1760000000,
//!   "local": { "mac": "...", "battery_present": false, "power_source": "unknown" },
//!   "nodes": { "aa:bb:cc:dd:ee:ff": { "last_seen": 12.34, "throughput": 150.0, "nexthop": "..." } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::batman::RouteTable;
use crate::power::{PowerSource, PowerState};
use crate::station::{LinkMetrics, StationTable};

/// One mesh peer, keyed by its lowercase MAC in [`Snapshot::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub last_seen:  f64,
    pub throughput: f64,
    pub nexthop:    String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname:   Option<String>,
    /// Wi-Fi metrics of the matching station, if any.
    #[serde(flatten)]
    pub link:       LinkMetrics,
}

/// This device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalNode {
    /// Own MAC; empty when it could not be determined.
    pub mac:             String,
    pub battery_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_pct:     Option<u8>,
    pub power_source:    PowerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status:          Option<String>,
}

impl LocalNode {
    pub fn new(mac: Option<&str>, power: PowerState) -> Self {
        Self {
            mac:             mac.unwrap_or_default().to_ascii_lowercase(),
            battery_present: power.battery_present,
            battery_pct:     power.battery_pct,
            power_source:    power.power_source,
            status:          power.status,
        }
    }
}

/// One poll cycle's view of the mesh.  Built once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Unix seconds at the start of the build.
    pub timestamp: i64,
    pub local:     LocalNode,
    pub nodes:     BTreeMap<String, NodeRecord>,
}

/// Maps a MAC to a human-readable name.
pub trait HostnameResolver {
    fn resolve(&self, mac: &str) -> Option<String>;
}

/// Resolver used in production: hostname lookup is currently disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostnames;

impl HostnameResolver for NoHostnames {
    fn resolve(&self, _mac: &str) -> Option<String> {
        None
    }
}

/// Merge the route table, station metrics and local state into a [`Snapshot`].
///
/// Metrics are looked up by the originator's own MAC first and by its next
/// hop second, so multi-hop peers inherit the link quality of the neighbour
/// that carries their traffic.  The local MAC never appears in `nodes`.
pub fn merge(
    timestamp: i64,
    routes:    &RouteTable,
    stations:  &StationTable,
    local:     LocalNode,
    hostnames: &dyn HostnameResolver,
) -> Snapshot {
    let me = local.mac.as_str();
    let nodes = routes
        .iter()
        .filter(|(mac, _)| me.is_empty() || mac.as_str() != me)
        .map(|(mac, route)| {
            let link = stations
                .get(mac)
                .or_else(|| stations.get(&route.nexthop))
                .cloned()
                .unwrap_or_default();
            let record = NodeRecord {
                last_seen:  route.last_seen,
                throughput: route.throughput,
                nexthop:    route.nexthop.clone(),
                hostname:   lookup_hostname(hostnames, mac, &route.nexthop, me),
                link,
            };
            (mac.clone(), record)
        })
        .collect();

    Snapshot { timestamp, local, nodes }
}

fn lookup_hostname(
    hostnames: &dyn HostnameResolver,
    mac:       &str,
    nexthop:   &str,
    me:        &str,
) -> Option<String> {
    let usable = |m: &str| !m.is_empty() && m != me;
    usable(mac)
        .then(|| hostnames.resolve(mac))
        .flatten()
        .or_else(|| usable(nexthop).then(|| hostnames.resolve(nexthop)).flatten())
}
