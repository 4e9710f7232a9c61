//! Producer-side helpers: database log classification and worker failure reporting.

mod db_log;
mod failure;

pub use db_log::{DbLogClassifier, TOLERABLE_REACTOR_STALL_MS};
pub use failure::report_failures;
