//! # EventsFileLogger: per-severity event logs
//!
//! Writes every delivered event to `events.log` and to the file of its
//! severity, and keeps `summary.log` (severity → count, JSON) current.
//!
//! ## Line format
//! ```text
//! 2024-05-02 10:11:12.345: (DatabaseLogEvent ERROR): type=NO_SPACE_ERROR node=db-1
//! commitlog - No space left on device
//! ```
//! A multi-line event continues on lines that do not start with a date.
//!
//! Events other than `TestResult` are also echoed through `tracing` under
//! the `sct_events::events` target.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::EventLogPaths;
use crate::error::BusError;
use crate::events::{Event, EventKind, Severity};
use crate::subscribers::Subscribe;

struct Sinks {
    events: BufWriter<File>,
    tiers: [BufWriter<File>; 4],
    counts: [u64; 4],
}

/// File-backed event log subscriber.
pub struct EventsFileLogger {
    paths: EventLogPaths,
    flush_each: bool,
    sinks: Mutex<Sinks>,
}

impl EventsFileLogger {
    /// Opens (append mode) every log file under `paths.base`.
    pub fn open(paths: EventLogPaths, flush_each: bool) -> Result<Self, BusError> {
        std::fs::create_dir_all(&paths.base).map_err(|e| BusError::io(&paths.base, e))?;
        let [n, w, e, c] = paths.tiers();
        let sinks = Sinks {
            events: append(&paths.events)?,
            tiers: [append(n)?, append(w)?, append(e)?, append(c)?],
            counts: [0; 4],
        };
        Ok(Self {
            paths,
            flush_each,
            sinks: Mutex::new(sinks),
        })
    }

    pub fn paths(&self) -> &EventLogPaths {
        &self.paths
    }

    /// Number of logged events per severity name.
    pub fn summary(&self) -> BTreeMap<String, u64> {
        summary_of(&self.sinks().counts)
    }

    /// Last `limit` entries of each severity file (`0` = all), keyed by severity name.
    pub fn events_by_category(&self, limit: usize) -> BTreeMap<String, Vec<String>> {
        self.flush();
        Severity::ALL
            .iter()
            .zip(self.paths.tiers())
            .map(|(sev, path)| (sev.as_str().to_string(), read_entries(path, limit)))
            .collect()
    }

    /// Flushes every open file.
    pub fn flush(&self) {
        let mut sinks = self.sinks();
        let Sinks { events, tiers, .. } = &mut *sinks;
        let results = std::iter::once((self.paths.events.as_path(), events.flush())).chain(
            tiers
                .iter_mut()
                .zip(self.paths.tiers())
                .map(|(w, p)| (p, w.flush())),
        );
        for (path, res) in results {
            if let Err(e) = res {
                warn!(path = %path.display(), error = %e, "failed to flush event log");
            }
        }
    }

    fn sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, ev: &Event) -> std::io::Result<()> {
        let line = format!("{}: {}\n", ev.formatted_timestamp(), ev);
        let idx = ev.severity.index();

        let counts = {
            let mut sinks = self.sinks();
            sinks.events.write_all(line.as_bytes())?;
            sinks.tiers[idx].write_all(line.as_bytes())?;
            sinks.counts[idx] += 1;
            if self.flush_each {
                sinks.events.flush()?;
                sinks.tiers[idx].flush()?;
            }
            sinks.counts
        };

        let summary = serde_json::to_string(&summary_of(&counts)).map_err(std::io::Error::other)?;
        std::fs::write(&self.paths.summary, summary)
    }
}

#[async_trait]
impl Subscribe for EventsFileLogger {
    async fn on_event(&self, ev: &Event) {
        if let Err(e) = self.write(ev) {
            warn!(seq = ev.seq, error = %e, "failed to write event log");
        }
        if ev.kind != EventKind::TestResult {
            echo(ev);
        }
    }

    async fn on_stop(&self) {
        self.flush();
    }

    fn name(&self) -> &'static str {
        "EventsFileLogger"
    }
}

fn echo(ev: &Event) {
    match ev.severity {
        Severity::Normal => info!(target: "sct_events::events", "{ev}"),
        Severity::Warning => warn!(target: "sct_events::events", "{ev}"),
        Severity::Error | Severity::Critical => error!(target: "sct_events::events", "{ev}"),
    }
}

fn append(path: &Path) -> Result<BufWriter<File>, BusError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(BufWriter::new)
        .map_err(|e| BusError::io(path, e))
}

fn summary_of(counts: &[u64; 4]) -> BTreeMap<String, u64> {
    Severity::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), counts[s.index()]))
        .collect()
}

/// `YYYY-MM-DD ` at the start of a line marks a new entry.
fn starts_with_date(line: &str) -> bool {
    let b = line.as_bytes();
    b.len() >= 11
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
        && b[10] == b' '
}

fn read_entries(path: &Path, limit: usize) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return vec![format!("failed to read {}: {e}", path.display())],
    };

    let mut entries: Vec<String> = Vec::new();
    for line in text.lines() {
        match entries.last_mut() {
            Some(last) if !starts_with_date(line) => {
                last.push('\n');
                last.push_str(line);
            }
            _ => entries.push(line.to_string()),
        }
    }
    if limit > 0 && entries.len() > limit {
        entries.drain(..entries.len() - limit);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(dir: &Path) -> EventsFileLogger {
        EventsFileLogger::open(EventLogPaths::new(dir), false).unwrap()
    }

    #[tokio::test]
    async fn writes_combined_and_tier_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());

        log.on_event(&Event::info("all good")).await;
        log.on_event(
            &Event::new(EventKind::DatabaseLog)
                .with_severity(Severity::Error)
                .with_subtype("BAD_ALLOC")
                .with_line("std::bad_alloc"),
        )
        .await;
        log.on_stop().await;

        let events = std::fs::read_to_string(&log.paths().events).unwrap();
        assert_eq!(events.lines().filter(|l| starts_with_date(l)).count(), 2);
        let error = std::fs::read_to_string(&log.paths().error).unwrap();
        assert!(error.contains("(DatabaseLogEvent ERROR): type=BAD_ALLOC\nstd::bad_alloc"));
        assert_eq!(std::fs::read_to_string(&log.paths().critical).unwrap(), "");
    }

    #[tokio::test]
    async fn summary_is_kept_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        log.on_event(&Event::spot_termination("n1", "bye")).await;
        log.on_event(&Event::info("x")).await;

        let summary = log.summary();
        assert_eq!(summary["CRITICAL"], 1);
        assert_eq!(summary["NORMAL"], 1);
        assert_eq!(summary["ERROR"], 0);

        let on_disk: BTreeMap<String, u64> =
            serde_json::from_str(&std::fs::read_to_string(&log.paths().summary).unwrap()).unwrap();
        assert_eq!(on_disk, summary);
    }

    #[tokio::test]
    async fn events_by_category_joins_continuations_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        for i in 0..3 {
            log.on_event(&Event::thread_failed(&format!("worker {i}"), "trace line 1\ntrace line 2"))
                .await;
        }

        let cats = log.events_by_category(2);
        let errors = &cats["ERROR"];
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("worker 1"));
        assert!(errors[1].ends_with("trace line 1\ntrace line 2"));
        assert!(cats["WARNING"].is_empty());
    }

    #[test]
    fn unreadable_file_yields_single_entry() {
        let entries = read_entries(Path::new("/nonexistent/events_log/error.log"), 0);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("failed to read"));
    }

    #[test]
    fn date_prefix_detection() {
        assert!(starts_with_date("2024-01-02 03:04:05.000: x"));
        assert!(!starts_with_date("  at frame"));
        assert!(!starts_with_date("2024-01-02"));
    }
}
