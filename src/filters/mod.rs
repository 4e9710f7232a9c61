//! Filters consulted by the bus before fan-out.
//!
//! - [`Predicate`] / [`Field`]: typed conditions over an [`Event`](crate::Event)
//! - [`Filter`] / [`FilterAction`]: predicate plus suppress or severity change
//! - [`FilterRegistry`]: copy-on-write table evaluated once per event
//! - [`EventsFilter`], [`DbEventsFilter`], [`EventsSeverityChangerFilter`]:
//!   scoped builders returning a [`FilterGuard`]
//! - [`common`]: ready-made bundles returning a [`FilterStack`]

pub mod common;
mod filter;
mod predicate;
mod registry;
mod scoped;

pub use common::{
    ignore_alternator_client_errors, ignore_mutation_write_errors, ignore_no_space_errors,
    ignore_operation_errors, ignore_scrub_invalid_errors, ignore_upgrade_schema_errors,
    ignore_ycsb_connection_refused,
};
pub use filter::{Filter, FilterAction};
pub use predicate::{Field, Pattern, Predicate};
pub use registry::{FilterHandle, FilterRegistry, Verdict};
pub use scoped::{
    DbEventsFilter, EventsFilter, EventsSeverityChangerFilter, FilterGuard, FilterStack,
    apply_log_filters,
};
