//! # Events published into the bus.
//!
//! An [`Event`] is built by a producer at detection time with the builder
//! methods below, then handed to [`Bus::publish`](crate::Bus::publish) by value.
//! After that nobody can touch it. A severity rewrite by a filter builds a new
//! value before subscribers ever see it, and subscribers share it read-only
//! behind an `Arc`.
//!
//! ## Ordering
//! Each event gets a globally unique sequence number (`seq`) at construction.
//! Events built by one producer therefore have increasing `seq` in creation
//! order.
//!
//! ## Example
//! ```rust
//! use sct_events::{Event, EventKind, Severity};
//!
//! let ev = Event::new(EventKind::DatabaseLog)
//!     .with_subtype("NO_SPACE_ERROR")
//!     .with_severity(Severity::Error)
//!     .with_node("db-1")
//!     .with_line_number(22)
//!     .with_line("commitlog - No space left on device");
//!
//! assert_eq!(ev.field("node"), Some("db-1"));
//! assert!(ev.to_string().starts_with("(DatabaseLogEvent ERROR): type=NO_SPACE_ERROR"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use super::{EventKind, Severity};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Event with kind-specific payload.
///
/// - `seq`: monotonic global sequence
/// - `at`: wall-clock creation time (for logs)
/// - optional payload fields depend on the [`EventKind`]
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock creation time.
    pub at: SystemTime,
    /// Event family.
    pub kind: EventKind,
    /// Sub-classification within the family (`NO_SPACE_ERROR`, `start`, ...).
    pub subtype: Option<Arc<str>>,
    /// Current severity.
    pub severity: Severity,
    /// Node the event is about.
    pub node: Option<Arc<str>>,
    /// Raw log line, for log-derived events.
    pub line: Option<Arc<str>>,
    /// Line number of `line` in its source log.
    pub line_number: Option<u64>,
    /// Human-readable message.
    pub message: Option<Arc<str>>,
    /// Additional kind-specific fields (`stress_cmd`, `corefile_url`, ...).
    pub fields: BTreeMap<String, String>,
}

impl Event {
    /// Creates an event of `kind` with its default severity, current time and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subtype: None,
            severity: kind.default_severity(),
            node: None,
            line: None,
            line_number: None,
            message: None,
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[inline]
    pub fn with_subtype(mut self, subtype: impl Into<Arc<str>>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    #[inline]
    pub fn with_line(mut self, line: impl Into<Arc<str>>) -> Self {
        self.line = Some(line.into());
        self
    }

    #[inline]
    pub fn with_line_number(mut self, n: u64) -> Self {
        self.line_number = Some(n);
        self
    }

    #[inline]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a free-form field. A later value for the same key wins.
    #[inline]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Overrides the creation time (e.g. a core dump found long after it was written).
    #[inline]
    pub fn with_timestamp(mut self, at: SystemTime) -> Self {
        self.at = at;
        self
    }

    /// Looks up a payload field by name.
    ///
    /// `node`, `line`, `message` and `subtype` (alias `type`) read the
    /// dedicated fields; any other name reads [`Event::fields`].
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "node" => self.node.as_deref(),
            "line" => self.line.as_deref(),
            "message" => self.message.as_deref(),
            "subtype" | "type" => self.subtype.as_deref(),
            other => self.fields.get(other).map(String::as_str),
        }
    }

    /// Creation time as fractional seconds since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Creation time as `YYYY-MM-DD HH:MM:SS.mmm` (UTC), the log line prefix.
    pub fn formatted_timestamp(&self) -> String {
        DateTime::<Utc>::from(self.at)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string()
    }

    /// One-line JSON record for the raw events log.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "kind": self.kind.name(),
            "seq": self.seq,
            "timestamp": self.timestamp(),
            "severity": self.severity,
            "subtype": self.subtype.as_deref(),
            "node": self.node.as_deref(),
            "line": self.line.as_deref(),
            "line_number": self.line_number,
            "message": self.message.as_deref(),
            "fields": &self.fields,
        })
        .to_string()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.kind, self.severity)?;

        let mut first = true;
        if let Some(st) = self.subtype.as_deref() {
            write_attr(f, &mut first, "type", st)?;
        }
        if let Some(node) = self.node.as_deref() {
            write_attr(f, &mut first, "node", node)?;
        }
        if let Some(n) = self.line_number {
            write_attr(f, &mut first, "line_number", n)?;
        }
        if let Some(msg) = self.message.as_deref() {
            write_attr(f, &mut first, "message", msg)?;
        }
        for (k, v) in &self.fields {
            write_attr(f, &mut first, k, v)?;
        }
        if let Some(line) = self.line.as_deref() {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

fn write_attr(
    f: &mut fmt::Formatter<'_>,
    first: &mut bool,
    key: &str,
    value: impl fmt::Display,
) -> fmt::Result {
    let sep = if *first { ": " } else { " " };
    *first = false;
    write!(f, "{sep}{key}={value}")
}
