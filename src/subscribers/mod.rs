//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] that
//! drives subscribers from their bus queues, and the two built-in consumers.
//!
//! ## Architecture
//! ```text
//! Bus device ──► [queue] ──► SubscriberSet worker ──► Subscribe::on_event(&Event)
//!                                                        │
//!                                  ┌─────────────────────┼──────────────┐
//!                                  ▼                     ▼              ▼
//!                          EventsFileLogger        EventsAnalyzer     custom
//!                       (events/*.log, summary)   (CRITICAL → kill)
//! ```

mod analyzer;
mod file_logger;
mod set;
mod subscribe;

pub use analyzer::{AnalyzerState, EventsAnalyzer};
pub use file_logger::EventsFileLogger;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
