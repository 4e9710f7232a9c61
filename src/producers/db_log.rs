//! # Database log classification.
//!
//! [`DbLogClassifier`] turns a raw database log line into a `DatabaseLog`
//! event, using an ordered table of case-insensitive patterns. The first
//! matching pattern decides the subtype and severity.
//!
//! `REACTOR_STALLED` is listed before `BACKTRACE` because stall reports carry
//! a backtrace. A stall of at least [`TOLERABLE_REACTOR_STALL_MS`] is an ERROR.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::events::{Event, EventKind, Severity};

/// Reactor stalls shorter than this stay NORMAL.
pub const TOLERABLE_REACTOR_STALL_MS: u64 = 1000;

const REACTOR_STALLED: &str = "REACTOR_STALLED";

const PATTERNS: &[(&str, Severity, &str)] = &[
    ("NO_SPACE_ERROR", Severity::Error, "No space left on device"),
    ("UNKNOWN_VERB", Severity::Warning, "unknown verb exception"),
    (
        "CLIENT_DISCONNECT",
        Severity::Warning,
        r"!INFO.*cql_server - exception while processing connection:.*",
    ),
    ("SEMAPHORE_TIME_OUT", Severity::Warning, "semaphore_timed_out"),
    (
        "SYSTEM_PAXOS_TIMEOUT",
        Severity::Warning,
        r".*mutation_write_*|.*Operation timed out for system.paxos.*|.*Operation failed for system.paxos.*",
    ),
    (
        "RESTARTED_DUE_TO_TIME_OUT",
        Severity::Warning,
        r"scylla-server.service.*State 'stop-sigterm' timed out.*Killing",
    ),
    (
        "EMPTY_NESTED_EXCEPTION",
        Severity::Warning,
        r"cql_server - exception while processing connection: seastar::nested_exception \(seastar::nested_exception\)$",
    ),
    ("DATABASE_ERROR", Severity::Error, "Exception "),
    ("BAD_ALLOC", Severity::Error, "std::bad_alloc"),
    ("SCHEMA_FAILURE", Severity::Error, "Failed to load schema version"),
    ("RUNTIME_ERROR", Severity::Error, "std::runtime_error"),
    ("FILESYSTEM_ERROR", Severity::Error, "filesystem_error"),
    ("STACKTRACE", Severity::Error, "stacktrace"),
    (REACTOR_STALLED, Severity::Normal, "Reactor stalled"),
    ("BACKTRACE", Severity::Error, "backtrace"),
    ("ABORTING_ON_SHARD", Severity::Error, "Aborting on shard"),
    ("SEGMENTATION", Severity::Error, "segmentation"),
    ("INTEGRITY_CHECK", Severity::Error, "integrity check failed"),
    ("BOOT", Severity::Normal, "Starting Scylla Server"),
    ("STOP", Severity::Normal, "Stopping Scylla Server"),
    ("SUPPRESSED_MESSAGES", Severity::Warning, "journal: Suppressed"),
    ("stream_exception", Severity::Error, "stream_exception"),
    ("POWER_OFF", Severity::Critical, "Powering Off"),
];

struct Rule {
    subtype: &'static str,
    severity: Severity,
    regex: Regex,
}

/// Ordered pattern table for database log lines.
pub struct DbLogClassifier {
    rules: Vec<Rule>,
    stall_ms: Option<Regex>,
    tolerable_stall_ms: u64,
}

impl DbLogClassifier {
    pub fn new() -> Self {
        let rules = PATTERNS
            .iter()
            .filter_map(|&(subtype, severity, pattern)| {
                case_insensitive(pattern).map(|regex| Rule {
                    subtype,
                    severity,
                    regex,
                })
            })
            .collect();
        Self {
            rules,
            stall_ms: case_insensitive(r"(\d+) ms"),
            tolerable_stall_ms: TOLERABLE_REACTOR_STALL_MS,
        }
    }

    /// Overrides the stall threshold.
    pub fn with_tolerable_stall(mut self, ms: u64) -> Self {
        self.tolerable_stall_ms = ms;
        self
    }

    /// Builds the event for the first matching pattern, if any.
    pub fn classify(&self, node: &str, line: &str, line_number: u64) -> Option<Event> {
        let rule = self.rules.iter().find(|r| r.regex.is_match(line))?;
        let severity = if rule.subtype == REACTOR_STALLED {
            self.stall_severity(line, rule.severity)
        } else {
            rule.severity
        };
        Some(
            Event::new(EventKind::DatabaseLog)
                .with_subtype(rule.subtype)
                .with_severity(severity)
                .with_node(node)
                .with_line_number(line_number)
                .with_line(line),
        )
    }

    /// Subtypes in match order.
    pub fn subtypes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.subtype)
    }

    fn stall_severity(&self, line: &str, base: Severity) -> Severity {
        let ms = self
            .stall_ms
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        match ms {
            Some(ms) if ms >= self.tolerable_stall_ms => Severity::Error,
            Some(_) => base,
            None => {
                warn!(line, "failed to read reactor stall duration");
                base
            }
        }
    }
}

impl Default for DbLogClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn case_insensitive(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "skipping invalid database log pattern");
            None
        }
    }
}
