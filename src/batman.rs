//! B.A.T.M.A.N. advanced originator table (`batctl o`).
//!
//! The column layout of `batctl o` differs between batman-adv releases and
//! routing algorithms (B.A.T.M.A.N. IV reports TQ, V reports throughput), so
//! rows are picked apart with independent patterns rather than by column:
//!
//! ```text
//!  * aa:bb:cc:dd:ee:ff   12.340s   (150) bb:cc:dd:ee:ff:11 [     wlan1]:
//! ```

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::config::MonitorConfig;
use crate::util::{self, MAC_RE};

/// Literal token marking a data row in `batctl o` output.
const ROW_MARKER: &str = " * ";

lazy_static! {
    static ref LAST_SEEN_RE: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)s\b").expect("valid regex");
    // B.A.T.M.A.N. V pads the value inside the parentheses: `( 87.5)`.
    static ref THROUGHPUT_RE: Regex =
        Regex::new(r"\(\s*(\d+(?:\.\d+)?)").expect("valid regex");
}

/// One originator as seen by the routing protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    /// Seconds since the originator was last refreshed.
    pub last_seen:  f64,
    /// TQ or throughput estimate, passed through as reported.
    pub throughput: f64,
    /// Next hop towards the originator; empty if the row carried none.
    pub nexthop:    String,
}

pub type RouteTable = BTreeMap<String, RouteEntry>;

/// Query `batctl o` and parse the originator table.
///
/// Never fails: a missing binary, non-zero exit or timeout yields an empty
/// table and a warning.
pub async fn collect(cfg: &MonitorConfig, local_mac: Option<&str>) -> RouteTable {
    let argv = util::privileged(&["batctl", "o"]);
    match util::run_command(&argv, cfg.command_timeout).await {
        Ok(out) => {
            let table = parse_originators(&out, local_mac);
            debug!("batctl: {} originator(s)", table.len());
            table
        }
        Err(e) => {
            warn!("batctl error: {e}");
            RouteTable::new()
        }
    }
}

/// Parse `batctl o` output.  Rows without the ` * ` marker or without an
/// originator MAC are skipped, as is the row for `local_mac` itself.
pub fn parse_originators(text: &str, local_mac: Option<&str>) -> RouteTable {
    let mut table = RouteTable::new();
    for line in text.lines() {
        if let Some((mac, entry)) = parse_row(line.trim_end()) {
            if local_mac.is_some_and(|me| me.eq_ignore_ascii_case(&mac)) {
                continue;
            }
            table.insert(mac, entry);
        }
    }
    table
}

fn parse_row(line: &str) -> Option<(String, RouteEntry)> {
    if !line.contains(ROW_MARKER) {
        return None;
    }
    let mac = MAC_RE.find(line)?.as_str().to_ascii_lowercase();

    let last_seen = LAST_SEEN_RE
        .captures(line)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0);
    let throughput = THROUGHPUT_RE
        .captures(line)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0);

    // The next hop is the last MAC after the final ')'.
    let nexthop = line
        .rfind(')')
        .and_then(|idx| MAC_RE.find_iter(&line[idx + 1..]).last())
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    Some((mac, RouteEntry { last_seen, throughput, nexthop }))
}
