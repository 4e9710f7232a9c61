//! # Registry of active filters.
//!
//! The table is a copy-on-write `Arc<Vec<..>>` behind a lock. Writers
//! (`activate`, `deactivate`, `reclaim`) build a new vector; `evaluate` clones
//! the current `Arc` and iterates it without holding the lock, so filter
//! changes never stall the bus.
//!
//! ## Window
//! A filter is evaluable from `activate` until its window closes:
//! - while held, it never closes;
//! - on release, it closes at `deactivate time + grace`. A zero grace removes
//!   the entry right away; a grace too large for the clock never closes;
//! - a filter released with [`Filter::release_on_node`] and no explicit grace
//!   closes on the first database log event from that node stamped after the
//!   release. Lines logged before the release but read later stay covered.
//!
//! ## Verdict
//! Filters are evaluated in registration order. The first matching
//! suppress wins immediately. Severity changes compose and the last match
//! wins, unless a later filter suppresses.
//!
//! ## Clock
//! Uses `tokio::time::Instant`, so tests can drive it with a paused clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Filter, FilterAction};
use crate::error::FilterError;
use crate::events::{Event, EventKind, Severity};

/// Identifies one activation of a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterHandle(u64);

impl FilterHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Outcome of running an event through the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    pub suppressed: bool,
    /// Severity to deliver with, when a rewrite matched.
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
enum Window {
    Held,
    Until(Instant),
    /// Released with a grace past the end of the clock.
    Unbounded,
    NodeCatchUp {
        node: Arc<str>,
        released_at: SystemTime,
    },
}

#[derive(Debug)]
struct Entry {
    id: u64,
    filter: Filter,
    window: Window,
}

impl Entry {
    #[inline]
    fn is_live(&self, now: Instant) -> bool {
        match self.window {
            Window::Until(at) => now < at,
            _ => true,
        }
    }

    #[inline]
    fn is_held(&self) -> bool {
        matches!(self.window, Window::Held)
    }

    /// True when `event` shows the node's log has moved past the release.
    fn caught_up_by(&self, event: &Event) -> bool {
        match &self.window {
            Window::NodeCatchUp { node, released_at } => {
                event.kind == EventKind::DatabaseLog
                    && event.node.as_deref() == Some(&**node)
                    && event.at > *released_at
            }
            _ => false,
        }
    }
}

type Table = Arc<Vec<Arc<Entry>>>;

/// Table of active-or-grace filters.
#[derive(Debug)]
pub struct FilterRegistry {
    table: RwLock<Table>,
    next_id: AtomicU64,
    default_grace: Duration,
}

impl FilterRegistry {
    /// Creates an empty registry. `default_grace` applies to filters without their own.
    pub fn new(default_grace: Duration) -> Self {
        Self {
            table: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            default_grace,
        }
    }

    /// Registers `filter`. Events evaluated after this returns see it.
    pub fn activate(&self, filter: Filter) -> FilterHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        debug!(filter_id = id, action = ?filter.action, "filter activated");

        self.update(|entries| {
            let mut next: Vec<_> = entries.iter().filter(|e| e.is_live(now)).cloned().collect();
            next.push(Arc::new(Entry {
                id,
                filter,
                window: Window::Held,
            }));
            next
        });
        FilterHandle(id)
    }

    /// Releases a filter; it stays evaluable for `grace` (or its own/default grace).
    ///
    /// Without an explicit `grace`, a node-scoped filter stays until that node
    /// catches up instead. Returns `false` when the handle is unknown or
    /// already released.
    pub fn deactivate(&self, handle: FilterHandle, grace: Option<Duration>) -> bool {
        let now = Instant::now();
        let mut found = false;

        self.update(|entries| {
            let mut next = Vec::with_capacity(entries.len());
            for entry in entries.iter() {
                if entry.id != handle.0 || !entry.is_held() {
                    if entry.is_live(now) {
                        next.push(Arc::clone(entry));
                    }
                    continue;
                }
                found = true;
                if let Some(window) = self.release_window(&entry.filter, grace, now) {
                    debug!(filter_id = entry.id, ?window, "filter deactivated");
                    next.push(Arc::new(Entry {
                        id: entry.id,
                        filter: entry.filter.clone(),
                        window,
                    }));
                } else {
                    debug!(filter_id = entry.id, "filter deactivated");
                }
            }
            next
        });
        found
    }

    /// Window a released filter keeps; `None` removes it now.
    fn release_window(&self, filter: &Filter, grace: Option<Duration>, now: Instant) -> Option<Window> {
        if let (None, Some(node)) = (grace, &filter.release_on_node) {
            return Some(Window::NodeCatchUp {
                node: Arc::clone(node),
                released_at: SystemTime::now(),
            });
        }
        let grace = grace.or(filter.grace).unwrap_or(self.default_grace);
        if grace.is_zero() {
            return None;
        }
        Some(now.checked_add(grace).map_or(Window::Unbounded, Window::Until))
    }

    /// Runs `event` through a snapshot of the table.
    ///
    /// A filter whose predicate errors counts as not matching.
    pub fn evaluate(&self, event: &Event) -> Verdict {
        let snapshot = self.snapshot();
        let now = Instant::now();
        let mut verdict = Verdict::default();
        let mut saw_expired = false;
        let mut caught_up = Vec::new();

        for entry in snapshot.iter() {
            if !entry.is_live(now) {
                saw_expired = true;
                continue;
            }
            if entry.caught_up_by(event) {
                caught_up.push(entry.id);
                continue;
            }
            match entry.filter.predicate.matches(event) {
                Ok(false) => {}
                Ok(true) => match entry.filter.action {
                    FilterAction::Suppress => {
                        verdict.suppressed = true;
                        verdict.severity = None;
                        break;
                    }
                    FilterAction::ChangeSeverity(sev) => verdict.severity = Some(sev),
                },
                Err(err) => log_filter_error(entry.id, &err),
            }
        }

        if !caught_up.is_empty() {
            debug!(filter_ids = ?caught_up, "node caught up, filters removed");
            self.update(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_live(now) && !caught_up.contains(&e.id))
                    .cloned()
                    .collect()
            });
        } else if saw_expired {
            self.reclaim();
        }
        verdict
    }

    /// Drops fully expired entries.
    pub fn reclaim(&self) {
        let now = Instant::now();
        let expired = self.snapshot().iter().any(|e| !e.is_live(now));
        if expired {
            self.update(|entries| entries.iter().filter(|e| e.is_live(now)).cloned().collect());
        }
    }

    /// Number of entries still evaluable now.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.snapshot().iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Table {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&[Arc<Entry>]) -> Vec<Arc<Entry>>,
    {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(table.as_slice());
        *table = Arc::new(next);
    }
}

fn log_filter_error(filter_id: u64, err: &FilterError) {
    match err {
        FilterError::MissingField { .. } => {
            debug!(filter_id, error = %err, label = err.as_label(), "filter skipped")
        }
        _ => warn!(filter_id, error = %err, label = err.as_label(), "filter failed, treated as no match"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::filters::{Field, Predicate};

    fn critical_db(line: &str) -> Event {
        Event::new(EventKind::DatabaseLog)
            .with_severity(Severity::Critical)
            .with_line(line)
    }

    fn db_kind() -> Predicate {
        Predicate::Kind(EventKind::DatabaseLog)
    }

    #[test]
    fn empty_registry_passes_everything() {
        let reg = FilterRegistry::new(Duration::ZERO);
        assert_eq!(reg.evaluate(&critical_db("x")), Verdict::default());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn suppress_short_circuits() {
        let reg = FilterRegistry::new(Duration::ZERO);
        reg.activate(Filter::change_severity(db_kind(), Severity::Warning));
        reg.activate(Filter::suppress(db_kind()));
        reg.activate(Filter::change_severity(db_kind(), Severity::Normal));

        let v = reg.evaluate(&critical_db("x"));
        assert!(v.suppressed);
        assert_eq!(v.severity, None);
    }

    #[tokio::test(start_paused = true)]
    async fn last_rewrite_wins() {
        let reg = FilterRegistry::new(Duration::ZERO);
        reg.activate(Filter::change_severity(db_kind(), Severity::Warning));
        reg.activate(Filter::change_severity(
            Predicate::contains(Field::Line, "timeout"),
            Severity::Normal,
        ));

        assert_eq!(
            reg.evaluate(&critical_db("write timeout")).severity,
            Some(Severity::Normal)
        );
        assert_eq!(
            reg.evaluate(&critical_db("bad_alloc")).severity,
            Some(Severity::Warning)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_grace_removes_immediately() {
        let reg = FilterRegistry::new(Duration::ZERO);
        let h = reg.activate(Filter::suppress(db_kind()));
        assert!(reg.deactivate(h, None));
        assert!(!reg.evaluate(&critical_db("x")).suppressed);
        assert!(reg.is_empty());
        assert!(!reg.deactivate(h, None));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_keeps_filter_until_expiry() {
        let reg = FilterRegistry::new(Duration::ZERO);
        let h = reg.activate(Filter::suppress(db_kind()).with_grace(Duration::from_secs(1)));
        reg.deactivate(h, None);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(reg.evaluate(&critical_db("x")).suppressed);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!reg.evaluate(&critical_db("x")).suppressed);
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_grace_overrides_filter_grace() {
        let reg = FilterRegistry::new(Duration::from_secs(60));
        let h = reg.activate(Filter::suppress(db_kind()).with_grace(Duration::from_secs(30)));
        reg.deactivate(h, Some(Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!reg.evaluate(&critical_db("x")).suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn default_grace_applies_when_filter_has_none() {
        let reg = FilterRegistry::new(Duration::from_secs(5));
        let h = reg.activate(Filter::suppress(db_kind()));
        reg.deactivate(h, None);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(reg.evaluate(&critical_db("x")).suppressed);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!reg.evaluate(&critical_db("x")).suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_grace_never_expires() {
        let reg = FilterRegistry::new(Duration::ZERO);
        let h = reg.activate(Filter::suppress(db_kind()).with_grace(Duration::MAX));
        assert!(reg.deactivate(h, None));
        assert!(!reg.deactivate(h, None));

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert!(reg.evaluate(&critical_db("x")).suppressed);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn node_filter_lasts_until_node_logs_past_release() {
        let reg = FilterRegistry::new(Duration::ZERO);
        let pred = db_kind().and(Predicate::field_equals(Field::Node, "A"));
        let h = reg.activate(Filter::suppress(pred).release_on_node("A"));
        let before_release = std::time::SystemTime::now() - Duration::from_secs(5);
        reg.deactivate(h, None);

        let late_read = critical_db("x").with_node("A").with_timestamp(before_release);
        assert!(reg.evaluate(&late_read).suppressed);
        assert!(!reg.evaluate(&critical_db("x").with_node("B")).suppressed);
        assert_eq!(reg.len(), 1);

        let newer = critical_db("x")
            .with_node("A")
            .with_timestamp(std::time::SystemTime::now() + Duration::from_secs(5));
        assert!(!reg.evaluate(&newer).suppressed);
        assert!(reg.is_empty());
        assert!(!reg.evaluate(&late_read).suppressed);
    }

    #[test]
    fn explicit_grace_skips_node_catch_up() {
        let reg = FilterRegistry::new(Duration::ZERO);
        let h = reg.activate(Filter::suppress(db_kind()).release_on_node("A"));
        reg.deactivate(h, Some(Duration::ZERO));
        assert!(reg.is_empty());
    }

    #[test]
    fn failing_predicate_is_fail_open() {
        let reg = FilterRegistry::new(Duration::ZERO);
        reg.activate(Filter::suppress(Predicate::regex(Field::Text, "(bad")));
        reg.activate(Filter::suppress(Predicate::field_equals(
            Field::Named("absent".into()),
            "v",
        )));
        assert!(!reg.evaluate(&critical_db("x")).suppressed);
    }

    #[test]
    fn concurrent_activation_is_safe() {
        let reg = Arc::new(FilterRegistry::new(Duration::ZERO));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let h = reg.activate(Filter::suppress(Predicate::Kind(EventKind::Info)));
                        let _ = reg.evaluate(&Event::info("x"));
                        reg.deactivate(h, None);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(reg.is_empty());
    }
}
