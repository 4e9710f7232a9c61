//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging custom event consumers into
//! the bus. Each subscriber is driven by a dedicated worker task fed by its own
//! bounded bus queue, owned by the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (file I/O, test teardown). They do **not**
//!   block the bus or other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. If the queue overflows, best-effort events
//!   for that subscriber are **dropped** (warn); guaranteed events wait.
//! - [`Subscribe::on_stop`] runs once after the last event, for flushing.
//!
//! ## Example (skeleton)
//! ```rust
//! use sct_events::{Event, Severity, Subscribe};
//!
//! struct ErrorCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for ErrorCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.severity >= Severity::Error {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "error-counter" }
//!     fn queue_capacity(&self) -> usize { 512 }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime for long.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single delivered event.
    async fn on_event(&self, event: &Event);

    /// Called once when the subscriber's queue has ended.
    async fn on_stop(&self) {}

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    ///
    /// `0` uses [`Config::subscriber_capacity`](crate::Config::subscriber_capacity).
    fn queue_capacity(&self) -> usize {
        0
    }
}
