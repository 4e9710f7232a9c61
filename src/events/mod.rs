//! Events: data model and the filtered bus.
//!
//! This module groups the event **data model** and the **bus** through which
//! every producer (log tailers, stress tools, nemeses, the test framework)
//! talks to every consumer (file logger, analyzer, user subscribers).
//!
//! ## Contents
//! - [`Severity`], [`EventKind`], [`Event`]: classification and payload
//! - [`Bus`], [`Subscription`]: bounded ingress, filter step, fan-out
//!
//! ## Quick reference
//! ```text
//! producer ── publish ──► [ingress] ──► device ──► raw_events.log
//!                                         │
//!                                         ├─ FilterRegistry::evaluate
//!                                         │     suppress / rewrite severity
//!                                         ▼
//!                           [queue S1] [queue S2] ... [queue SN]
//! ```

mod bus;
mod catalog;
mod device;
mod event;
mod kind;
mod severity;

pub use bus::{Bus, BusStats, Subscription};
pub use event::Event;
pub use kind::EventKind;
pub use severity::Severity;
