//! # Event pipeline configuration.
//!
//! Provides [`Config`], the centralized settings for the bus, its subscribers
//! and the filter registry, plus [`EventLogPaths`], which derives every log
//! file location from `log_dir`.
//!
//! ## Sentinel values
//! - `startup_probe_events = 0` → no startup probe
//! - `default_grace = 0s` → filters without their own grace expire on release
//!
//! ## Environment overlay
//! [`Config::from_env`] starts from [`Config::default`] and overrides fields
//! from `SCT_EVENTS_*` variables. All parse errors are collected and reported
//! together.
//!
//! | Variable                          | Field                  |
//! |-----------------------------------|------------------------|
//! | `SCT_EVENTS_LOG_DIR`              | `log_dir`              |
//! | `SCT_EVENTS_BUS_CAPACITY`         | `bus_capacity`         |
//! | `SCT_EVENTS_SUBSCRIBER_CAPACITY`  | `subscriber_capacity`  |
//! | `SCT_EVENTS_PUBLISH_TIMEOUT_MS`   | `publish_timeout`      |
//! | `SCT_EVENTS_STOP_TIMEOUT_MS`      | `stop_timeout`         |
//! | `SCT_EVENTS_DEFAULT_GRACE_MS`     | `default_grace`        |
//! | `SCT_EVENTS_FLUSH_LOGS`           | `flush_logs`           |
//! | `SCT_EVENTS_STARTUP_PROBES`       | `startup_probe_events` |
//! | `SCT_EVENTS_DEFAULT_FILTERS`      | `default_filters`      |

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "SCT_EVENTS_";

/// Global configuration for the event pipeline.
///
/// ## Field semantics
/// - `log_dir`: run log directory; events go to `<log_dir>/events_log/`
/// - `bus_capacity`: ingress queue size (min 1); non-guaranteed publishes drop when full
/// - `subscriber_capacity`: default per-subscriber queue size (min 1)
/// - `publish_timeout`: how long a guaranteed publish waits for its acknowledgement
/// - `stop_timeout`: drain deadline before teardown is forced
/// - `default_grace`: grace for filters that do not set their own
/// - `flush_logs`: flush log files after every event
/// - `startup_probe_events`: guaranteed probes sent at start (`0` = skip)
/// - `default_filters`: install the rate-limited backtrace filters at start
#[derive(Clone, Debug)]
pub struct Config {
    pub log_dir: PathBuf,
    pub bus_capacity: usize,
    pub subscriber_capacity: usize,
    pub publish_timeout: Duration,
    pub stop_timeout: Duration,
    pub default_grace: Duration,
    pub flush_logs: bool,
    pub startup_probe_events: usize,
    pub default_filters: bool,
}

impl Config {
    /// Default configuration with `log_dir` replaced.
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    /// Returns the ingress capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the subscriber queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn subscriber_capacity_clamped(&self) -> usize {
        self.subscriber_capacity.max(1)
    }

    /// Log file locations derived from `log_dir`.
    pub fn paths(&self) -> EventLogPaths {
        EventLogPaths::new(&self.log_dir)
    }

    /// Builds a config from defaults overlaid with `SCT_EVENTS_*` variables.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Vec<ConfigError>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvOverlay {
            lookup,
            errors: Vec::new(),
        };
        let mut cfg = Self::default();

        if let Some(dir) = env.raw("LOG_DIR") {
            cfg.log_dir = PathBuf::from(dir);
        }
        env.count("BUS_CAPACITY", &mut cfg.bus_capacity);
        env.count("SUBSCRIBER_CAPACITY", &mut cfg.subscriber_capacity);
        env.millis("PUBLISH_TIMEOUT_MS", &mut cfg.publish_timeout);
        env.millis("STOP_TIMEOUT_MS", &mut cfg.stop_timeout);
        env.millis("DEFAULT_GRACE_MS", &mut cfg.default_grace);
        env.flag("FLUSH_LOGS", &mut cfg.flush_logs);
        env.count("STARTUP_PROBES", &mut cfg.startup_probe_events);
        env.flag("DEFAULT_FILTERS", &mut cfg.default_filters);

        if env.errors.is_empty() {
            Ok(cfg)
        } else {
            Err(env.errors)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `log_dir = ./sct-logs`
    /// - `bus_capacity = 1024`, `subscriber_capacity = 1024`
    /// - `publish_timeout = 2s` (guaranteed delivery acknowledgement)
    /// - `stop_timeout = 10s`
    /// - `default_grace = 0s`
    /// - `flush_logs = false`
    /// - `startup_probe_events = 20`
    /// - `default_filters = true`
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("sct-logs"),
            bus_capacity: 1024,
            subscriber_capacity: 1024,
            publish_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(10),
            default_grace: Duration::ZERO,
            flush_logs: false,
            startup_probe_events: 20,
            default_filters: true,
        }
    }
}

/// Collects parse errors while overlaying variables onto a config.
struct EnvOverlay<F> {
    lookup: F,
    errors: Vec<ConfigError>,
}

impl<F> EnvOverlay<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn var_name(name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(Self::var_name(name).as_str()).filter(|v| !v.trim().is_empty())
    }

    fn invalid(&mut self, name: &str, expected: &'static str, value: String) {
        self.errors.push(ConfigError::InvalidValue {
            var: Self::var_name(name),
            expected,
            value,
        });
    }

    fn count(&mut self, name: &str, slot: &mut usize) {
        if let Some(v) = self.raw(name) {
            match v.trim().parse() {
                Ok(n) => *slot = n,
                Err(_) => self.invalid(name, "non-negative integer", v),
            }
        }
    }

    fn millis(&mut self, name: &str, slot: &mut Duration) {
        if let Some(v) = self.raw(name) {
            match v.trim().parse() {
                Ok(ms) => *slot = Duration::from_millis(ms),
                Err(_) => self.invalid(name, "milliseconds", v),
            }
        }
    }

    fn flag(&mut self, name: &str, slot: &mut bool) {
        if let Some(v) = self.raw(name) {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => *slot = true,
                "0" | "false" | "no" | "off" => *slot = false,
                _ => self.invalid(name, "boolean", v),
            }
        }
    }
}

/// Locations of the event log files.
///
/// All files live in `<log_dir>/events_log/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLogPaths {
    /// Directory holding all event logs.
    pub base: PathBuf,
    /// Every accepted event as JSON, before filtering.
    pub raw: PathBuf,
    /// Every delivered event, chronological.
    pub events: PathBuf,
    pub normal: PathBuf,
    pub warning: PathBuf,
    pub error: PathBuf,
    pub critical: PathBuf,
    /// Per-severity counters as JSON.
    pub summary: PathBuf,
}

impl EventLogPaths {
    pub fn new(log_dir: &Path) -> Self {
        let base = log_dir.join("events_log");
        Self {
            raw: base.join("raw_events.log"),
            events: base.join("events.log"),
            normal: base.join("normal.log"),
            warning: base.join("warning.log"),
            error: base.join("error.log"),
            critical: base.join("critical.log"),
            summary: base.join("summary.log"),
            base,
        }
    }

    /// Per-severity file, indexed like [`Severity::ALL`](crate::Severity::ALL).
    pub fn tiers(&self) -> [&Path; 4] {
        [&self.normal, &self.warning, &self.error, &self.critical]
    }
}
