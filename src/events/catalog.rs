//! # Ready-made events for common producers.
//!
//! Shorthands over [`Event::new`] plus builder calls, one per event family
//! the harness emits most: stress tools, nemeses, core dumps, the test
//! framework and the final test result.

use std::time::Duration;

use super::{Event, EventKind, Severity};

impl Event {
    /// Stress-tool event.
    ///
    /// `subtype` is usually `start`, `finish` or `error`. `errors` are joined
    /// into the line so filters can match on them.
    pub fn stress(
        kind: EventKind,
        subtype: &str,
        node: &str,
        stress_cmd: &str,
        severity: Severity,
        errors: &[String],
    ) -> Self {
        let ev = Event::new(kind)
            .with_subtype(subtype)
            .with_node(node)
            .with_severity(severity)
            .with_field("stress_cmd", stress_cmd);
        if errors.is_empty() {
            ev
        } else {
            ev.with_line(errors.join("\n"))
        }
    }

    /// Disruption (nemesis) lifecycle event. A failed disruption is an ERROR.
    pub fn disruption(
        name: &str,
        subtype: &str,
        node: &str,
        duration: Option<Duration>,
        error: Option<&str>,
    ) -> Self {
        let mut ev = Event::new(EventKind::Disruption)
            .with_subtype(subtype)
            .with_node(node)
            .with_field("name", name);
        if let Some(d) = duration {
            ev = ev.with_field("duration", format!("{:.3}s", d.as_secs_f64()));
        }
        match error {
            Some(err) => ev.with_severity(Severity::Error).with_field("error", err),
            None => ev,
        }
    }

    /// Core dump found on `node`.
    pub fn core_dump(node: &str, corefile_url: &str, backtrace: &str) -> Self {
        Event::new(EventKind::CoreDump)
            .with_node(node)
            .with_field("corefile_url", corefile_url)
            .with_line(backtrace)
    }

    /// Harness-internal failure. Defaults to ERROR.
    pub fn test_framework(source: &str, source_method: &str, message: &str) -> Self {
        let ev = Event::new(EventKind::TestFramework).with_field("source", source);
        let ev = if source_method.is_empty() {
            ev
        } else {
            ev.with_field("source_method", source_method)
        };
        if message.is_empty() {
            ev
        } else {
            ev.with_message(message)
        }
    }

    /// Terminal report of the run. `SUCCESS` is NORMAL, anything else is ERROR.
    pub fn test_result(status: &str) -> Self {
        let severity = if status == "SUCCESS" {
            Severity::Normal
        } else {
            Severity::Error
        };
        Event::new(EventKind::TestResult)
            .with_severity(severity)
            .with_field("test_status", status)
    }

    /// Cloud provider is reclaiming a spot instance. Always CRITICAL.
    pub fn spot_termination(node: &str, message: &str) -> Self {
        Event::new(EventKind::SpotTermination)
            .with_node(node)
            .with_message(message)
    }

    /// Informational message.
    pub fn info(message: &str) -> Self {
        Event::new(EventKind::Info).with_message(message)
    }

    /// A worker died with an error.
    pub fn thread_failed(message: &str, traceback: &str) -> Self {
        Event::new(EventKind::ThreadFailed)
            .with_message(message)
            .with_line(traceback)
    }

    /// Bus liveness probe.
    pub(crate) fn startup_probe() -> Self {
        Event::new(EventKind::StartupTest)
    }
}
