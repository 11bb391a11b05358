//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DwError, Result};
use crate::daemon::notifications::NotificationConfig;

/// Full drivewatch configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub poller: PollerConfig,
    pub notifications: NotificationConfig,
}

/// How the device monitor consumes hotplug events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Blocking poll loop on the monitor's own thread.
    Poll,
    /// Callback-driven observer thread.
    Observe,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Observe => write!(f, "observe"),
        }
    }
}

/// Device monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Track only devices reporting a USB bus type.
    pub only_removable: bool,
    /// Event delivery mode, fixed for the lifetime of the process.
    pub mode: MonitorMode,
    /// Timeout for each blocking wait on the hotplug subscription.
    pub poll_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            only_removable: true,
            mode: MonitorMode::Observe,
            poll_timeout_ms: 1000,
        }
    }
}

/// Poller worker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between reconciliation cycles.
    pub interval_secs: u64,
    /// Bounded capacity of the hotplug event queue.
    pub queue_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            queue_capacity: 10,
        }
    }
}

impl Config {
    /// Default configuration path: `~/.config/drivewatch/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/etc"), PathBuf::from);
        home.join(".config").join("drivewatch").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DwError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DwError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            return Err(DwError::InvalidConfig {
                details: "poller.interval_secs must be at least 1".to_string(),
            });
        }
        if self.poller.queue_capacity == 0 {
            return Err(DwError::InvalidConfig {
                details: "poller.queue_capacity must be at least 1".to_string(),
            });
        }
        if self.monitor.poll_timeout_ms == 0 {
            return Err(DwError::InvalidConfig {
                details: "monitor.poll_timeout_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DW_MONITOR_ONLY_REMOVABLE") {
            self.monitor.only_removable = parse_env_bool("DW_MONITOR_ONLY_REMOVABLE", &raw)?;
        }
        if let Some(raw) = lookup("DW_MONITOR_MODE") {
            self.monitor.mode = match raw.as_str() {
                "poll" => MonitorMode::Poll,
                "observe" => MonitorMode::Observe,
                other => {
                    return Err(DwError::ConfigParse {
                        context: "env",
                        details: format!("DW_MONITOR_MODE={other:?}: expected poll or observe"),
                    });
                }
            };
        }
        if let Some(raw) = lookup("DW_MONITOR_POLL_TIMEOUT_MS") {
            self.monitor.poll_timeout_ms = parse_env_u64("DW_MONITOR_POLL_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("DW_POLLER_INTERVAL_SECS") {
            self.poller.interval_secs = parse_env_u64("DW_POLLER_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DW_POLLER_QUEUE_CAPACITY") {
            self.poller.queue_capacity = parse_env_u64("DW_POLLER_QUEUE_CAPACITY", &raw)?
                .try_into()
                .map_err(|_| DwError::ConfigParse {
                    context: "env",
                    details: "DW_POLLER_QUEUE_CAPACITY out of range".to_string(),
                })?;
        }
        if let Some(raw) = lookup("DW_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_env_bool("DW_NOTIFICATIONS_ENABLED", &raw)?;
        }
        Ok(())
    }
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| DwError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| DwError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::{Config, DwError, MonitorMode};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn apply(cfg: &mut Config, pairs: &[(&str, &str)]) -> Result<(), DwError> {
        let map = vars(pairs);
        cfg.apply_env_overrides_from(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = Config::default();
        assert!(cfg.monitor.only_removable);
        assert_eq!(cfg.monitor.mode, MonitorMode::Observe);
        assert_eq!(cfg.monitor.poll_timeout_ms, 1000);
        assert_eq!(cfg.poller.interval_secs, 5);
        assert_eq!(cfg.poller.queue_capacity, 10);
    }

    #[test]
    fn env_overrides_apply_typed_values() {
        let mut cfg = Config::default();
        apply(
            &mut cfg,
            &[
                ("DW_MONITOR_ONLY_REMOVABLE", "false"),
                ("DW_MONITOR_MODE", "poll"),
                ("DW_POLLER_INTERVAL_SECS", "2"),
                ("DW_POLLER_QUEUE_CAPACITY", "32"),
            ],
        )
        .expect("overrides should parse");
        assert!(!cfg.monitor.only_removable);
        assert_eq!(cfg.monitor.mode, MonitorMode::Poll);
        assert_eq!(cfg.poller.interval_secs, 2);
        assert_eq!(cfg.poller.queue_capacity, 32);
    }

    #[test]
    fn invalid_env_value_is_a_parse_error() {
        let mut cfg = Config::default();
        let err = apply(&mut cfg, &[("DW_POLLER_INTERVAL_SECS", "soon")])
            .expect_err("non-numeric interval must fail");
        assert!(matches!(err, DwError::ConfigParse { .. }), "got {err:?}");
    }

    #[test]
    fn unknown_monitor_mode_is_rejected() {
        let mut cfg = Config::default();
        let err =
            apply(&mut cfg, &[("DW_MONITOR_MODE", "hybrid")]).expect_err("unknown mode must fail");
        assert!(err.to_string().contains("expected poll or observe"));
    }

    #[test]
    fn zero_interval_fails_validation() {
        let mut cfg = Config::default();
        cfg.poller.interval_secs = 0;
        let err = cfg.validate().expect_err("zero interval must fail");
        assert!(matches!(err, DwError::InvalidConfig { .. }));
    }

    #[test]
    fn zero_queue_capacity_fails_validation() {
        let mut cfg = Config::default();
        cfg.poller.queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(std::path::Path::new("/nonexistent/drivewatch.toml")))
            .expect_err("explicit missing path must fail");
        assert!(matches!(err, DwError::MissingConfig { .. }));
    }

    #[test]
    fn loads_toml_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[monitor]\nonly_removable = false\nmode = \"poll\"\n\n[poller]\ninterval_secs = 1\n"
        )
        .expect("write config");
        let cfg = Config::load(Some(file.path())).expect("config should load");
        assert!(!cfg.monitor.only_removable);
        assert_eq!(cfg.monitor.mode, MonitorMode::Poll);
        assert_eq!(cfg.poller.interval_secs, 1);
        // Unspecified sections keep their defaults.
        assert_eq!(cfg.poller.queue_capacity, 10);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = Config::default();
        let raw = toml::to_string(&cfg).expect("serialize");
        let back: Config = toml::from_str(&raw).expect("deserialize");
        assert_eq!(cfg, back);
    }
}
