//! # Scoped filters.
//!
//! Each builder activates one filter and returns a [`FilterGuard`]. Dropping
//! the guard deactivates the filter with the guard's grace period.
//! Ready-made bundles for common situations live in [`common`](super::common).
//!
//! ```rust
//! # use std::{sync::Arc, time::Duration};
//! # use sct_events::{DbEventsFilter, FilterRegistry};
//! let registry = Arc::new(FilterRegistry::new(Duration::ZERO));
//! {
//!     let _guard = DbEventsFilter::new("BAD_ALLOC").activate(&registry);
//!     assert_eq!(registry.len(), 1);
//! }
//! assert!(registry.is_empty());
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::{Field, Filter, FilterHandle, FilterRegistry, Predicate};
use crate::error::FilterError;
use crate::events::{EventKind, Severity};

/// Keeps one filter active until dropped.
#[must_use = "the filter is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FilterGuard {
    registry: Arc<FilterRegistry>,
    handle: Option<FilterHandle>,
    grace: Option<Duration>,
}

impl FilterGuard {
    fn new(registry: &Arc<FilterRegistry>, filter: Filter) -> Self {
        let grace = filter.grace;
        let handle = registry.activate(filter);
        Self {
            registry: Arc::clone(registry),
            handle: Some(handle),
            grace,
        }
    }

    pub fn handle(&self) -> Option<FilterHandle> {
        self.handle
    }

    /// Releases the filter now, skipping any grace period.
    pub fn cancel(mut self) {
        if let Some(h) = self.handle.take() {
            self.registry.deactivate(h, Some(Duration::ZERO));
        }
    }
}

impl Drop for FilterGuard {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.registry.deactivate(h, self.grace);
        }
    }
}

/// Suppress events by kind and/or a regex over their rendered text.
#[derive(Clone, Debug, Default)]
pub struct EventsFilter {
    kind: Option<EventKind>,
    regex: Option<String>,
    extra_time: Option<Duration>,
}

impl EventsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Regex matched from the start of the rendered event, `.` spanning lines.
    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Grace period after the guard is dropped.
    pub fn extra_time(mut self, grace: Duration) -> Self {
        self.extra_time = Some(grace);
        self
    }

    pub fn build(&self) -> Result<Filter, FilterError> {
        let predicate = kind_and_regex(self.kind, self.regex.as_deref())?;
        let filter = Filter::suppress(predicate);
        Ok(match self.extra_time {
            Some(g) => filter.with_grace(g),
            None => filter,
        })
    }

    pub fn activate(&self, registry: &Arc<FilterRegistry>) -> Result<FilterGuard, FilterError> {
        Ok(FilterGuard::new(registry, self.build()?))
    }
}

/// Suppress database log events by subtype, optionally narrowed by line text and node.
///
/// Without a node the filter goes away as soon as the guard drops. With a
/// node it stays until an event from that node stamped after the release
/// arrives, so lines logged earlier but read late are still suppressed.
#[derive(Clone, Debug)]
pub struct DbEventsFilter {
    subtype: String,
    line: Option<String>,
    node: Option<String>,
}

impl DbEventsFilter {
    pub fn new(subtype: impl Into<String>) -> Self {
        Self {
            subtype: subtype.into(),
            line: None,
            node: None,
        }
    }

    /// Only events whose line contains `needle`.
    pub fn line(mut self, needle: impl Into<String>) -> Self {
        self.line = Some(needle.into());
        self
    }

    /// Only events from `node`.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn build(&self) -> Filter {
        let mut predicate = Predicate::Kind(EventKind::DatabaseLog)
            .and(Predicate::Subtype(self.subtype.clone()));
        if let Some(line) = &self.line {
            predicate = predicate.and(Predicate::contains(Field::Line, line.clone()));
        }
        match &self.node {
            Some(node) => Filter::suppress(
                predicate.and(Predicate::field_equals(Field::Node, node.clone())),
            )
            .release_on_node(node.as_str()),
            None => Filter::suppress(predicate).with_grace(Duration::ZERO),
        }
    }

    pub fn activate(&self, registry: &Arc<FilterRegistry>) -> FilterGuard {
        FilterGuard::new(registry, self.build())
    }
}

/// Rewrite the severity of matching events while the guard lives.
#[derive(Clone, Debug)]
pub struct EventsSeverityChangerFilter {
    severity: Severity,
    kind: Option<EventKind>,
    regex: Option<String>,
    extra_time: Option<Duration>,
}

impl EventsSeverityChangerFilter {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            kind: None,
            regex: None,
            extra_time: None,
        }
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    pub fn extra_time(mut self, grace: Duration) -> Self {
        self.extra_time = Some(grace);
        self
    }

    pub fn build(&self) -> Result<Filter, FilterError> {
        let predicate = kind_and_regex(self.kind, self.regex.as_deref())?;
        let filter = Filter::change_severity(predicate, self.severity);
        Ok(match self.extra_time {
            Some(g) => filter.with_grace(g),
            None => filter,
        })
    }

    pub fn activate(&self, registry: &Arc<FilterRegistry>) -> Result<FilterGuard, FilterError> {
        Ok(FilterGuard::new(registry, self.build()?))
    }
}

fn kind_and_regex(kind: Option<EventKind>, regex: Option<&str>) -> Result<Predicate, FilterError> {
    let regex = regex
        .map(|r| Predicate::try_regex(Field::Text, r))
        .transpose()?;
    match (kind, regex) {
        (None, None) => Err(FilterError::EmptyPredicate),
        (Some(k), None) => Ok(Predicate::Kind(k)),
        (None, Some(r)) => Ok(r),
        (Some(k), Some(r)) => Ok(Predicate::Kind(k).and(r)),
    }
}

/// A set of guards released together, last activated first.
#[must_use = "the filters are released as soon as the stack is dropped"]
#[derive(Debug, Default)]
pub struct FilterStack {
    guards: Vec<FilterGuard>,
}

impl FilterStack {
    pub fn push(&mut self, guard: FilterGuard) {
        self.guards.push(guard);
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for FilterStack {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Holds several filters for one scope.
pub fn apply_log_filters(guards: impl IntoIterator<Item = FilterGuard>) -> FilterStack {
    FilterStack {
        guards: guards.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    fn registry() -> Arc<FilterRegistry> {
        Arc::new(FilterRegistry::new(Duration::ZERO))
    }

    fn no_space(node: &str) -> Event {
        Event::new(EventKind::DatabaseLog)
            .with_subtype("NO_SPACE_ERROR")
            .with_severity(Severity::Error)
            .with_node(node)
            .with_line("No space left on device")
    }

    #[test]
    fn db_filter_matches_subtype_node_and_line() {
        let reg = registry();
        let _g = DbEventsFilter::new("NO_SPACE_ERROR")
            .node("A")
            .line("No space")
            .activate(&reg);

        assert!(reg.evaluate(&no_space("A")).suppressed);
        assert!(!reg.evaluate(&no_space("B")).suppressed);
        assert!(
            !reg.evaluate(&no_space("A").with_subtype("BAD_ALLOC"))
                .suppressed
        );
    }

    #[test]
    fn guard_drop_releases_filter() {
        let reg = registry();
        {
            let _g = DbEventsFilter::new("NO_SPACE_ERROR").activate(&reg);
            assert!(reg.evaluate(&no_space("A")).suppressed);
        }
        assert!(!reg.evaluate(&no_space("A")).suppressed);
    }

    #[test]
    fn node_filter_covers_lines_logged_before_release() {
        let reg = registry();
        let logged_early = no_space("A");
        drop(DbEventsFilter::new("NO_SPACE_ERROR").node("A").activate(&reg));

        assert!(reg.evaluate(&logged_early).suppressed);
        let logged_late = no_space("A")
            .with_timestamp(std::time::SystemTime::now() + Duration::from_secs(1));
        assert!(!reg.evaluate(&logged_late).suppressed);
        assert!(reg.is_empty());
    }

    #[test]
    fn events_filter_needs_kind_or_regex() {
        let reg = registry();
        assert_eq!(
            EventsFilter::new().activate(&reg).unwrap_err(),
            FilterError::EmptyPredicate
        );
        assert!(matches!(
            EventsFilter::new().regex("(bad").activate(&reg),
            Err(FilterError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn events_filter_regex_over_rendered_text() {
        let reg = registry();
        let _g = EventsFilter::new()
            .kind(EventKind::DatabaseLog)
            .regex(".*1234567890.*")
            .activate(&reg)
            .unwrap();

        let hit = no_space("A").with_line("error 1234567890");
        assert!(reg.evaluate(&hit).suppressed);
        assert!(!reg.evaluate(&no_space("A")).suppressed);
    }

    #[test]
    fn severity_changer_rewrites() {
        let reg = registry();
        let _g = EventsSeverityChangerFilter::new(Severity::Warning)
            .kind(EventKind::DatabaseLog)
            .regex(".*mutation_write_.*")
            .activate(&reg)
            .unwrap();

        let ev = no_space("A").with_line("Operation timed out: mutation_write_timeout");
        assert_eq!(reg.evaluate(&ev).severity, Some(Severity::Warning));
    }

    #[test]
    fn cancel_skips_grace() {
        let reg = registry();
        let g = EventsFilter::new()
            .kind(EventKind::Info)
            .extra_time(Duration::from_secs(60))
            .activate(&reg)
            .unwrap();
        g.cancel();
        assert!(reg.is_empty());
    }

    #[test]
    fn max_grace_guard_drops_cleanly_and_outlives_release() {
        let reg = registry();
        let guard = EventsFilter::new()
            .kind(EventKind::Info)
            .extra_time(Duration::MAX)
            .activate(&reg)
            .unwrap();

        let dropped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| drop(guard)));
        assert!(dropped.is_ok());
        assert!(reg.evaluate(&Event::info("x")).suppressed);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn filter_stack_releases_all() {
        let reg = registry();
        let stack = apply_log_filters([
            DbEventsFilter::new("NO_SPACE_ERROR").activate(&reg),
            DbEventsFilter::new("BAD_ALLOC").activate(&reg),
        ]);
        assert_eq!(stack.len(), 2);
        assert_eq!(reg.len(), 2);
        drop(stack);
        assert!(reg.is_empty());
    }
}
