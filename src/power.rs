//! Power posture from `/sys/class/power_supply/*`.
//!
//! Each supply directory exposes small text attributes (`type`, `status`,
//! `capacity`, `online`).  A Pi on a UPS HAT typically shows one `Battery`
//! supply; a bare Pi shows nothing at all and is reported as `unknown`.

use std::fs;
use std::path::Path;

use log::debug;
use serde::Serialize;

/// Where the node currently draws power from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSource {
    Battery,
    External,
    #[default]
    Unknown,
}

/// Power fields of the local node record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerState {
    pub battery_present: bool,
    /// First valid `capacity` (0..=100) of a battery supply.
    pub battery_pct:     Option<u8>,
    pub power_source:    PowerSource,
    /// First non-empty `status` of any supply (e.g. `Discharging`).
    pub status:          Option<String>,
}

/// Read the power state from `dir` (normally `/sys/class/power_supply`).
///
/// Never fails: an absent or unreadable directory yields the `unknown` state.
pub fn read_power_state(dir: &Path) -> PowerState {
    let mut supplies: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            debug!("power supplies unavailable at {}: {e}", dir.display());
            return PowerState::default();
        }
    };
    supplies.sort();

    let mut state = PowerState::default();
    let mut has_external = false;

    for base in &supplies {
        let kind = read_attr(base, "type").unwrap_or_default().to_ascii_lowercase();

        if state.status.is_none() {
            state.status = read_attr(base, "status").filter(|s| !s.is_empty());
        }

        match kind.as_str() {
            "battery" => {
                state.battery_present = true;
                if state.battery_pct.is_none() {
                    state.battery_pct = read_attr(base, "capacity")
                        .and_then(|v| v.parse::<u8>().ok())
                        .filter(|pct| *pct <= 100);
                }
            }
            "mains" | "usb" | "ac" => {
                let online = read_attr(base, "online");
                if online.as_deref().map_or(true, |v| v == "1") {
                    has_external = true;
                }
            }
            _ => {}
        }
    }

    state.power_source = if state.battery_present {
        PowerSource::Battery
    } else if has_external {
        PowerSource::External
    } else {
        PowerSource::Unknown
    };
    state
}

fn read_attr(base: &Path, name: &str) -> Option<String> {
    fs::read_to_string(base.join(name))
        .ok()
        .map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn supply(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (k, v) in attrs {
            fs::write(dir.join(k), format!("{v}\n")).unwrap();
        }
    }

    #[test]
    fn single_discharging_battery() {
        let root = tempdir().unwrap();
        supply(root.path(), "BAT0", &[("type", "Battery"), ("capacity", "82"), ("status", "Discharging")]);

        let state = read_power_state(root.path());
        assert_eq!(
            state,
            PowerState {
                battery_present: true,
                battery_pct:     Some(82),
                power_source:    PowerSource::Battery,
                status:          Some("Discharging".into()),
            }
        );
    }

    #[test]
    fn battery_outranks_external_supply() {
        let root = tempdir().unwrap();
        supply(root.path(), "AC", &[("type", "Mains"), ("online", "1"), ("status", "")]);
        supply(root.path(), "BAT0", &[("type", "Battery"), ("capacity", "140"), ("status", "Charging")]);
        supply(root.path(), "BAT1", &[("type", "Battery"), ("capacity", "40")]);

        let state = read_power_state(root.path());
        assert_eq!(state.power_source, PowerSource::Battery);
        assert_eq!(state.battery_pct, Some(40));
        assert_eq!(state.status.as_deref(), Some("Charging"));
    }

    #[test]
    fn external_online_rules() {
        let root = tempdir().unwrap();
        supply(root.path(), "usb", &[("type", "USB"), ("online", "0")]);
        assert_eq!(read_power_state(root.path()).power_source, PowerSource::Unknown);

        // A supply without an `online` attribute counts as present.
        supply(root.path(), "rpi-poe", &[("type", "Mains")]);
        let state = read_power_state(root.path());
        assert_eq!(state.power_source, PowerSource::External);
        assert!(!state.battery_present);
        assert_eq!(state.battery_pct, None);
    }

    #[test]
    fn missing_directory_is_unknown() {
        let root = tempdir().unwrap();
        let state = read_power_state(&root.path().join("absent"));
        assert_eq!(state, PowerState::default());
        assert_eq!(state.power_source, PowerSource::Unknown);
    }

    #[test]
    fn first_status_wins() {
        let root = tempdir().unwrap();
        supply(root.path(), "a-mains", &[("type", "Mains"), ("status", "Full")]);
        supply(root.path(), "b-battery", &[("type", "Battery"), ("status", "Discharging")]);
        assert_eq!(read_power_state(root.path()).status.as_deref(), Some("Full"));
    }

    #[test]
    fn source_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&PowerSource::External).unwrap(), "\"external\"");
    }
}
