//! # Ready-made filter bundles.
//!
//! Each function activates a fixed set of filters for a known noisy
//! situation and hands back the [`FilterStack`] that releases them.
//!
//! ```rust
//! # use std::{sync::Arc, time::Duration};
//! # use sct_events::{FilterRegistry, ignore_no_space_errors};
//! let registry = Arc::new(FilterRegistry::new(Duration::ZERO));
//! let stack = ignore_no_space_errors(&registry, "db-3");
//! assert_eq!(stack.len(), 4);
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::{
    DbEventsFilter, EventsFilter, EventsSeverityChangerFilter, FilterRegistry, FilterStack,
    apply_log_filters,
};
use crate::error::FilterError;
use crate::events::{EventKind, Severity};

const NO_SPACE: &str = "No space left on device";

/// Severity-to-WARNING rewrites, each with its grace in seconds.
fn downgrade_all(
    registry: &Arc<FilterRegistry>,
    rules: &[(EventKind, &str, u64)],
) -> Result<FilterStack, FilterError> {
    let guards = rules
        .iter()
        .map(|&(kind, regex, grace)| {
            EventsSeverityChangerFilter::new(Severity::Warning)
                .kind(kind)
                .regex(regex)
                .extra_time(Duration::from_secs(grace))
                .activate(registry)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(apply_log_filters(guards))
}

fn suppress_db_lines(registry: &Arc<FilterRegistry>, rules: &[(&str, &str)]) -> FilterStack {
    apply_log_filters(
        rules
            .iter()
            .map(|&(subtype, line)| DbEventsFilter::new(subtype).line(line).activate(registry)),
    )
}

/// Out-of-space noise from `node` while a disk is being filled on purpose.
pub fn ignore_no_space_errors(registry: &Arc<FilterRegistry>, node: &str) -> FilterStack {
    let mut stack = apply_log_filters([DbEventsFilter::new("NO_SPACE_ERROR")
        .node(node)
        .activate(registry)]);
    for subtype in ["BACKTRACE", "DATABASE_ERROR", "FILESYSTEM_ERROR"] {
        stack.push(
            DbEventsFilter::new(subtype)
                .line(NO_SPACE)
                .node(node)
                .activate(registry),
        );
    }
    stack
}

/// Write timeouts expected while nodes are disrupted, downgraded to WARNING.
pub fn ignore_mutation_write_errors(
    registry: &Arc<FilterRegistry>,
) -> Result<FilterStack, FilterError> {
    downgrade_all(
        registry,
        &[
            (EventKind::DatabaseLog, ".*mutation_write_*", 30),
            (EventKind::DatabaseLog, ".*Operation timed out for system.paxos.*", 30),
            (EventKind::DatabaseLog, ".*Operation failed for system.paxos.*", 30),
        ],
    )
}

/// Generic operation timeouts and paxos failures, downgraded to WARNING.
pub fn ignore_operation_errors(registry: &Arc<FilterRegistry>) -> Result<FilterStack, FilterError> {
    downgrade_all(
        registry,
        &[
            (EventKind::DatabaseLog, ".*Operation timed out.*", 30),
            (EventKind::DatabaseLog, ".*Operation failed for system.paxos.*", 30),
        ],
    )
}

/// Alternator client errors reported by YCSB and its alerts, downgraded to WARNING.
pub fn ignore_alternator_client_errors(
    registry: &Arc<FilterRegistry>,
) -> Result<FilterStack, FilterError> {
    downgrade_all(
        registry,
        &[
            (EventKind::PrometheusAlert, ".*YCSBTooManyErrors.*", 60),
            (EventKind::PrometheusAlert, ".*YCSBTooManyVerifyErrors.*", 60),
            (EventKind::YcsbStress, ".*Cannot achieve consistency level.*", 30),
            (EventKind::YcsbStress, ".*Operation timed out.*", 30),
        ],
    )
}

/// Schema load and pull failures seen while nodes run mixed versions.
pub fn ignore_upgrade_schema_errors(registry: &Arc<FilterRegistry>) -> FilterStack {
    suppress_db_lines(
        registry,
        &[
            ("DATABASE_ERROR", "Failed to load schema"),
            ("SCHEMA_FAILURE", "Failed to load schema"),
            ("DATABASE_ERROR", "Failed to pull schema"),
            ("RUNTIME_ERROR", "Failed to load schema"),
            ("DATABASE_ERROR", "Could not retrieve CDC streams with timestamp"),
            (
                "DATABASE_ERROR",
                "cql_server - exception while processing connection: seastar::nested_exception \
                 (seastar::nested_exception)",
            ),
        ],
    )
}

/// Invalid fragments reported while a scrub rewrites sstables.
pub fn ignore_scrub_invalid_errors(registry: &Arc<FilterRegistry>) -> FilterStack {
    suppress_db_lines(
        registry,
        &[
            ("DATABASE_ERROR", "Skipping invalid clustering row fragment"),
            ("DATABASE_ERROR", "Skipping invalid partition"),
        ],
    )
}

/// YCSB connection refusals while the Alternator endpoint restarts.
pub fn ignore_ycsb_connection_refused(
    registry: &Arc<FilterRegistry>,
) -> Result<FilterStack, FilterError> {
    let guard = EventsFilter::new()
        .kind(EventKind::YcsbStress)
        .regex(".*Unable to execute HTTP request: Connection refused.*")
        .activate(registry)?;
    Ok(apply_log_filters([guard]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    fn registry() -> Arc<FilterRegistry> {
        Arc::new(FilterRegistry::new(Duration::ZERO))
    }

    fn db(subtype: &str, node: &str, line: &str) -> Event {
        Event::new(EventKind::DatabaseLog)
            .with_subtype(subtype)
            .with_severity(Severity::Error)
            .with_node(node)
            .with_line(line)
    }

    fn ycsb_error(error: &str) -> Event {
        Event::stress(
            EventKind::YcsbStress,
            "error",
            "loader-1",
            "ycsb run",
            Severity::Error,
            &[error.to_string()],
        )
    }

    #[test]
    fn no_space_bundle_covers_related_subtypes_on_one_node() {
        let reg = registry();
        let _stack = ignore_no_space_errors(&reg, "db-1");
        assert_eq!(reg.len(), 4);

        for subtype in ["NO_SPACE_ERROR", "BACKTRACE", "DATABASE_ERROR", "FILESYSTEM_ERROR"] {
            assert!(reg.evaluate(&db(subtype, "db-1", NO_SPACE)).suppressed, "{subtype}");
        }
        assert!(!reg.evaluate(&db("NO_SPACE_ERROR", "db-2", NO_SPACE)).suppressed);
        assert!(!reg.evaluate(&db("BACKTRACE", "db-1", "segfault")).suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_write_bundle_downgrades_with_grace() {
        let reg = registry();
        let timeout = db(
            "DATABASE_ERROR",
            "db-1",
            "exceptions::mutation_write_timeout_exception",
        )
        .with_severity(Severity::Critical);
        let paxos = db("DATABASE_ERROR", "db-1", "Operation timed out for system.paxos - received only 1 responses");

        let stack = ignore_mutation_write_errors(&reg).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(reg.evaluate(&timeout).severity, Some(Severity::Warning));
        assert_eq!(reg.evaluate(&paxos).severity, Some(Severity::Warning));
        assert_eq!(reg.evaluate(&db("BAD_ALLOC", "db-1", "std::bad_alloc")).severity, None);

        drop(stack);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(reg.evaluate(&timeout).severity, Some(Severity::Warning));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.evaluate(&timeout).severity, None);
        assert!(reg.is_empty());
    }

    #[test]
    fn operation_bundle_matches_generic_timeouts() {
        let reg = registry();
        let _stack = ignore_operation_errors(&reg).unwrap();
        let ev = db("DATABASE_ERROR", "db-1", "Operation timed out for ks.cf");
        assert_eq!(reg.evaluate(&ev).severity, Some(Severity::Warning));
    }

    #[test]
    fn alternator_bundle_targets_ycsb_and_alerts() {
        let reg = registry();
        let _stack = ignore_alternator_client_errors(&reg).unwrap();

        let alert = Event::new(EventKind::PrometheusAlert)
            .with_severity(Severity::Error)
            .with_message("alert YCSBTooManyErrors fired");
        let ycsb = ycsb_error("Cannot achieve consistency level QUORUM");
        assert_eq!(reg.evaluate(&alert).severity, Some(Severity::Warning));
        assert_eq!(reg.evaluate(&ycsb).severity, Some(Severity::Warning));
    }

    #[test]
    fn schema_and_scrub_bundles_suppress_by_line() {
        let reg = registry();
        let upgrade = ignore_upgrade_schema_errors(&reg);
        let scrub = ignore_scrub_invalid_errors(&reg);
        assert_eq!(upgrade.len() + scrub.len(), 8);

        assert!(reg.evaluate(&db("SCHEMA_FAILURE", "db-1", "Failed to load schema version 42")).suppressed);
        assert!(reg.evaluate(&db("DATABASE_ERROR", "db-1", "Skipping invalid partition key")).suppressed);
        assert!(!reg.evaluate(&db("SCHEMA_FAILURE", "db-1", "unexpected schema")).suppressed);

        drop(upgrade);
        drop(scrub);
        assert!(reg.is_empty());
    }

    #[test]
    fn ycsb_connection_refused_is_suppressed() {
        let reg = registry();
        let _stack = ignore_ycsb_connection_refused(&reg).unwrap();
        let ev = ycsb_error("Unable to execute HTTP request: Connection refused (Connection refused)");
        assert!(reg.evaluate(&ev).suppressed);
    }
}
