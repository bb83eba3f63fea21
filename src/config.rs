//! Simulation configuration loaded from environment variables.
//!
//! Every setting has a default; absent variables take it. A variable that is
//! present but unparseable or out of range is a configuration error.
//!
//! | Variable                            | Default                | Description                                  |
//! |-------------------------------------|------------------------|----------------------------------------------|
//! | `SENSOR_MESH_CLOCK_URI`             | `Clock-network-sensor` | Name of the shared accelerated clock         |
//! | `SENSOR_MESH_START_INSTANT`         | `2024-03-18T20:05:00Z` | Simulated start instant (RFC-3339)           |
//! | `SENSOR_MESH_START_DELAY_MS`        | `8000`                 | Real delay before the start instant          |
//! | `SENSOR_MESH_ACCELERATION_FACTOR`   | `60`                   | Simulated seconds per real second            |
//! | `SENSOR_MESH_NODE_COUNT`            | `50`                   | Sensor nodes on the grid                     |
//! | `SENSOR_MESH_CLIENT_COUNT`          | `4`                    | Clients issuing requests                     |
//! | `SENSOR_MESH_GRID_COLUMNS`          | `5`                    | Columns of the hex-offset grid               |
//! | `SENSOR_MESH_ASYNC`                 | `true`                 | Default request execution mode               |
//! | `SENSOR_MESH_NODE_RANGE`            | `1.5`                  | Transmission range of every node             |
//! | `SENSOR_MESH_NODE_THREADS`          | `5`                    | Worker budget per node                       |
//! | `SENSOR_MESH_TARGET_NODE`           | `n5`                   | Node the clients connect to                  |
//! | `SENSOR_MESH_REQUEST_SPACING_SECS`  | `60`                   | Simulated seconds between two requests       |
//! | `SENSOR_MESH_DRAIN_WINDOW_SECS`     | `60`                   | Simulated wait before merging async partials |
//! | `SENSOR_MESH_CALL_TIMEOUT_MS`       | `0`                    | Per-call timeout in ms (0 = none)            |
//! | `SENSOR_MESH_WIRE_ENCODING`         | `false`                | Round-trip peer traffic through JSON         |
//! | `SENSOR_MESH_SEED`                  | `42`                   | Seed for the sensor values                   |
//! | `SENSOR_MESH_LOG_LEVEL`             | `info`                 | tracing filter (trace/debug/info/warn/error) |

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::network::NetworkSettings;
use crate::{Error, Result};

const PREFIX: &str = "SENSOR_MESH_";

/// Runtime configuration of one simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub clock_uri: String,
    pub start_instant: DateTime<Utc>,
    /// Real time between process start and the simulated start instant.
    pub start_delay: Duration,
    pub acceleration_factor: f64,

    pub node_count: usize,
    pub client_count: usize,
    pub grid_columns: usize,
    /// Default execution mode of client requests.
    pub asynchronous: bool,

    pub node_range: f64,
    pub node_threads: usize,
    /// Identifier of the node every client sends its requests to.
    pub target_node: String,

    pub request_spacing: TimeDelta,
    pub drain_window: TimeDelta,

    // ── Transport ────────────────────────────────────────────────────────────
    pub call_timeout: Option<Duration>,
    pub wire_encoding: bool,

    pub seed: u64,
    /// Tracing filter string, e.g. `"sensor_mesh=debug,info"`.
    pub log_level: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            clock_uri: "Clock-network-sensor".into(),
            start_instant: Utc.with_ymd_and_hms(2024, 3, 18, 20, 5, 0).single().unwrap_or_default(),
            start_delay: Duration::from_millis(8000),
            acceleration_factor: 60.0,
            node_count: 50,
            client_count: 4,
            grid_columns: 5,
            asynchronous: true,
            node_range: 1.5,
            node_threads: 5,
            target_node: "n5".into(),
            request_spacing: TimeDelta::seconds(60),
            drain_window: TimeDelta::seconds(60),
            call_timeout: None,
            wire_encoding: false,
            seed: 42,
            log_level: "info".into(),
        }
    }
}

impl SimulationConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from `lookup`, which maps a full variable name
    /// to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        let d = Self::default();
        let config = Self {
            clock_uri:           vars.string("CLOCK_URI", &d.clock_uri),
            start_instant:       vars.instant("START_INSTANT", d.start_instant)?,
            start_delay:         Duration::from_millis(vars.parse("START_DELAY_MS", 8000u64)?),
            acceleration_factor: vars.parse("ACCELERATION_FACTOR", d.acceleration_factor)?,
            node_count:          vars.parse("NODE_COUNT", d.node_count)?,
            client_count:        vars.parse("CLIENT_COUNT", d.client_count)?,
            grid_columns:        vars.parse("GRID_COLUMNS", d.grid_columns)?,
            asynchronous:        vars.flag("ASYNC", d.asynchronous)?,
            node_range:          vars.parse("NODE_RANGE", d.node_range)?,
            node_threads:        vars.parse("NODE_THREADS", d.node_threads)?,
            target_node:         vars.string("TARGET_NODE", &d.target_node),
            request_spacing:     vars.seconds("REQUEST_SPACING_SECS", d.request_spacing)?,
            drain_window:        vars.seconds("DRAIN_WINDOW_SECS", d.drain_window)?,
            call_timeout:        match vars.parse("CALL_TIMEOUT_MS", 0u64)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            wire_encoding:       vars.flag("WIRE_ENCODING", d.wire_encoding)?,
            seed:                vars.parse("SEED", d.seed)?,
            log_level:           vars.string("LOG_LEVEL", &d.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.clock_uri.trim().is_empty() {
            return Err(invalid("CLOCK_URI", "must not be empty"));
        }
        if !self.acceleration_factor.is_finite() || self.acceleration_factor <= 0.0 {
            return Err(invalid("ACCELERATION_FACTOR", "must be a positive number"));
        }
        if self.node_count == 0 {
            return Err(invalid("NODE_COUNT", "must be at least 1"));
        }
        if self.client_count == 0 {
            return Err(invalid("CLIENT_COUNT", "must be at least 1"));
        }
        if self.grid_columns == 0 {
            return Err(invalid("GRID_COLUMNS", "must be at least 1"));
        }
        if !self.node_range.is_finite() || self.node_range <= 0.0 {
            return Err(invalid("NODE_RANGE", "must be a positive number"));
        }
        if self.node_threads == 0 {
            return Err(invalid("NODE_THREADS", "must be at least 1"));
        }
        if self.request_spacing <= TimeDelta::zero() {
            return Err(invalid("REQUEST_SPACING_SECS", "must be positive"));
        }
        if self.drain_window < TimeDelta::zero() {
            return Err(invalid("DRAIN_WINDOW_SECS", "must not be negative"));
        }
        let target_index = self
            .target_node
            .strip_prefix('n')
            .and_then(|i| i.parse::<usize>().ok());
        if !target_index.is_some_and(|i| (1..=self.node_count).contains(&i)) {
            return Err(invalid(
                "TARGET_NODE",
                &format!("{} is not one of n1..n{}", self.target_node, self.node_count),
            ));
        }
        Ok(())
    }

    pub fn network_settings(&self) -> NetworkSettings {
        NetworkSettings { call_timeout: self.call_timeout, wire_encoding: self.wire_encoding }
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::Config(format!("{PREFIX}{key} {reason}"))
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{key}")).map(|v| v.trim().to_owned())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| invalid(key, &format!("has unparseable value {v:?}"))),
        }
    }

    fn seconds(&self, key: &str, default: TimeDelta) -> Result<TimeDelta> {
        match self.get(key) {
            None => Ok(default),
            Some(_) => {
                let secs: i64 = self.parse(key, 0)?;
                TimeDelta::try_seconds(secs).ok_or_else(|| invalid(key, &format!("{secs} s is out of range")))
            }
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).as_deref() {
            None => Ok(default),
            Some("1") => Ok(true),
            Some("0") => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(invalid(key, &format!("is not a boolean: {v:?}"))),
        }
    }

    fn instant(&self, key: &str, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| invalid(key, &format!("is not an RFC-3339 timestamp: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<SimulationConfig> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string())).collect();
        SimulationConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.clock_uri, "Clock-network-sensor");
        assert_eq!(cfg.start_instant.to_rfc3339(), "2024-03-18T20:05:00+00:00");
        assert_eq!(cfg.start_delay, Duration::from_secs(8));
        assert_eq!(cfg.node_count, 50);
        assert_eq!(cfg.target_node, "n5");
        assert!(cfg.asynchronous);
        assert!(cfg.call_timeout.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let cfg = load(&[
            ("NODE_COUNT", "9"),
            ("GRID_COLUMNS", "3"),
            ("ASYNC", "false"),
            ("START_INSTANT", "2025-01-01T00:00:00+01:00"),
            ("CALL_TIMEOUT_MS", "250"),
            ("TARGET_NODE", "n9"),
        ])
        .unwrap();
        assert_eq!(cfg.node_count, 9);
        assert_eq!(cfg.grid_columns, 3);
        assert!(!cfg.asynchronous);
        assert_eq!(cfg.start_instant.to_rfc3339(), "2024-12-31T23:00:00+00:00");
        assert_eq!(cfg.network_settings().call_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_unparseable_value_is_fatal() {
        let err = load(&[("NODE_COUNT", "many")]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("SENSOR_MESH_NODE_COUNT")));
        assert!(load(&[("ASYNC", "maybe")]).is_err());
        assert!(load(&[("START_INSTANT", "yesterday")]).is_err());
    }

    #[test]
    fn test_out_of_range_values() {
        assert!(load(&[("ACCELERATION_FACTOR", "0")]).is_err());
        assert!(load(&[("NODE_RANGE", "-1.5")]).is_err());
        assert!(load(&[("CLIENT_COUNT", "0")]).is_err());
        assert!(load(&[("REQUEST_SPACING_SECS", "0")]).is_err());
        assert!(load(&[("NODE_COUNT", "3")]).is_err());
        assert!(load(&[("NODE_COUNT", "3"), ("TARGET_NODE", "n2")]).is_ok());
    }

    #[test]
    fn test_unrepresentable_durations_are_rejected() {
        let err = load(&[("DRAIN_WINDOW_SECS", "9223372036854775807")]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("SENSOR_MESH_DRAIN_WINDOW_SECS")));
        assert!(load(&[("REQUEST_SPACING_SECS", "9223372036854775807")]).is_err());
        assert!(load(&[("REQUEST_SPACING_SECS", "-9223372036854775808")]).is_err());

        let cfg = load(&[("DRAIN_WINDOW_SECS", "86400")]).unwrap();
        assert_eq!(cfg.drain_window, TimeDelta::days(1));
    }
}
