//! # sct-events
//!
//! **sct-events** is the event pipeline of a long-running database test
//! harness: a single asynchronous, filtered, severity-aware bus between the
//! things that *detect* trouble (log tailers, stress tools, nemeses, the test
//! framework) and the things that *react* to it (event logs, the analyzer
//! that kills the run on a CRITICAL event, user subscribers).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  log tailer  │   │ stress tools │   │   nemesis    │
//!     │ (DbLogClass.)│   │              │   │(report_fail.)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ publish          ▼ publish          ▼ publish_guaranteed
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                   Bus ingress (bounded mpsc)                      │
//! │                 (capacity: Config::bus_capacity)                  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │      bus device        │──► raw_events.log
//!                       │ FilterRegistry verdict │
//!                       └───┬────────┬───────┬───┘
//!                           ▼        ▼       ▼
//!                      [queue]    [queue]  [queue]     (per subscriber)
//!                           ▼        ▼       ▼
//!                  EventsFileLogger  │    custom Subscribe
//!               (events/*.log,       ▼
//!                summary.log)   EventsAnalyzer ──► TestKiller::kill_test()
//! ```
//!
//! ### Filters
//! ```text
//! let _g = DbEventsFilter::new("NO_SPACE_ERROR").node("db-1").activate(ctx.registry());
//!   ├─► FilterRegistry::activate       events evaluated from now on see it
//!   ├─► ... nemesis fills the disk ...
//!   └─► drop(_g) ─► deactivate         still evaluated until db-1 logs past the release
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Structured events with kind, severity and payload.           | [`Event`], [`EventKind`], [`Severity`]      |
//! | **Bus**           | Best-effort and acknowledged publish, per-subscriber queues. | [`Bus`], [`Subscription`]                   |
//! | **Filters**       | Scoped suppress / severity-change filters with grace.        | [`EventsFilter`], [`DbEventsFilter`], [`EventsSeverityChangerFilter`] |
//! | **Filter bundles**| Ready-made stacks for known noisy operations.                | [`ignore_no_space_errors`], [`ignore_mutation_write_errors`] |
//! | **Subscriber API**| Hook custom consumers into the bus.                          | [`Subscribe`], [`SubscriberSet`]            |
//! | **Run control**   | Kill the test on the first CRITICAL event.                   | [`EventsAnalyzer`], [`TestKiller`]          |
//! | **Producers**     | Database log classification, worker failure reporting.       | [`DbLogClassifier`], [`report_failures`]    |
//! | **Errors**        | Typed errors for publishing, filters, config and setup.      | [`BusError`], [`FilterError`], [`SetupError`] |
//! | **Configuration** | Centralize pipeline settings, `SCT_EVENTS_*` overlay.        | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use sct_events::{Config, Event, EventKind, EventsFilter, KillReason, Severity, TestContext, TestKiller};
//!
//! struct Test;
//!
//! #[async_trait::async_trait]
//! impl TestKiller for Test {
//!     async fn kill_test(&self, reason: KillReason) {
//!         eprintln!("aborting: {reason}");
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = std::env::temp_dir().join("sct-events-doc");
//!     let ctx = TestContext::start(Config::with_log_dir(&dir)).await?;
//!     ctx.set_tester(Arc::new(Test));
//!
//!     {
//!         // Core dumps are expected while this nemesis runs.
//!         let _expected = EventsFilter::new()
//!             .kind(EventKind::CoreDump)
//!             .activate(ctx.registry())?;
//!         ctx.publish_guaranteed(Event::core_dump("db-1", "gs://cores/1", "")).await?;
//!     }
//!
//!     ctx.publish(Event::info("nemesis done"))?;
//!     ctx.stop().await;
//!     assert_eq!(ctx.file_logger().summary()["NORMAL"], 1);
//!     Ok(())
//! }
//! ```
mod config;
mod context;
mod error;
mod events;
mod filters;
mod producers;
mod subscribers;
mod tester;

pub mod telemetry;

// ---- Public re-exports ----

pub use config::{Config, EventLogPaths};
pub use context::TestContext;
pub use error::{BusError, ConfigError, FilterError, SetupError};
pub use events::{Bus, BusStats, Event, EventKind, Severity, Subscription};
pub use filters::{
    DbEventsFilter, EventsFilter, EventsSeverityChangerFilter, Field, Filter, FilterAction,
    FilterGuard, FilterHandle, FilterRegistry, FilterStack, Pattern, Predicate, Verdict,
    apply_log_filters, ignore_alternator_client_errors, ignore_mutation_write_errors,
    ignore_no_space_errors, ignore_operation_errors, ignore_scrub_invalid_errors,
    ignore_upgrade_schema_errors, ignore_ycsb_connection_refused,
};
pub use producers::{DbLogClassifier, TOLERABLE_REACTOR_STALL_MS, report_failures};
pub use subscribers::{AnalyzerState, EventsAnalyzer, EventsFileLogger, Subscribe, SubscriberSet};
pub use tester::{KillReason, TestKiller, TesterSlot};
