//! Error types used by the event pipeline.
//!
//! - [`BusError`]: raised by the bus towards producers (publish after
//!   teardown, guaranteed delivery not acknowledged, raw log I/O).
//! - [`FilterError`]: raised while building or evaluating a filter. The
//!   registry never propagates it; a failing filter counts as "no match".
//! - [`ConfigError`]: environment overlay parse failures.
//! - [`SetupError`]: starting a [`TestContext`](crate::TestContext) failed.
//!
//! Every type provides `as_label` (stable snake_case for logs/metrics).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors returned by the bus to producers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus has been stopped; the event was not accepted.
    #[error("event bus is closed")]
    Closed,

    /// A guaranteed publish was not acknowledged in time.
    #[error("event was not delivered within {timeout:?}")]
    DeliveryTimeout {
        /// Configured acknowledgement timeout.
        timeout: Duration,
    },

    /// Log file could not be created or written.
    #[error("event log i/o failed for {path}: {source}")]
    Io {
        /// File the operation was about.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use sct_events::BusError;
    ///
    /// assert_eq!(BusError::Closed.as_label(), "bus_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Closed => "bus_closed",
            BusError::DeliveryTimeout { .. } => "bus_delivery_timeout",
            BusError::Io { .. } => "bus_io",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BusError::Io {
            path: path.into(),
            source,
        }
    }
}

/// # Errors produced by filters.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The regular expression does not compile.
    #[error("invalid filter regex '{pattern}': {reason}")]
    InvalidRegex {
        /// Pattern as given by the caller.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// A named payload field is absent from the event.
    #[error("event has no field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// Filter would match on nothing (neither kind nor regex given).
    #[error("filter needs an event kind or a regex")]
    EmptyPredicate,
}

impl FilterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FilterError::InvalidRegex { .. } => "filter_invalid_regex",
            FilterError::MissingField { .. } => "filter_missing_field",
            FilterError::EmptyPredicate => "filter_empty_predicate",
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid value for an environment variable.
    #[error("invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },
}

/// # Errors starting the event pipeline.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SetupError {
    /// Log directory or files could not be prepared.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Startup probe events were not delivered without loss.
    #[error("event loop failed to deliver {expected} probe events with no loss: {source}")]
    ProbeFailed {
        /// Number of probes requested.
        expected: usize,
        /// First delivery failure.
        #[source]
        source: BusError,
    },
}

impl SetupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SetupError::Bus(e) => e.as_label(),
            SetupError::ProbeFailed { .. } => "setup_probe_failed",
        }
    }
}
