//! # Test-kill hook.
//!
//! The harness registers the running test as a [`TestKiller`]. The
//! [`EventsAnalyzer`](crate::EventsAnalyzer) calls it at most once per
//! context, when a CRITICAL event gets through the filters.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::events::Event;

/// Why the run is being killed.
pub struct KillReason {
    /// Human-readable reason ("Got critical event: ...").
    pub message: String,
    /// The event that triggered the kill, with its delivered severity.
    pub event: Event,
    /// Where the analyzer decided to kill.
    pub backtrace: Backtrace,
}

impl fmt::Debug for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillReason")
            .field("message", &self.message)
            .field("event_seq", &self.event.seq)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives the abort-the-run signal.
#[async_trait]
pub trait TestKiller: Send + Sync + 'static {
    async fn kill_test(&self, reason: KillReason);

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Slot holding the registered tester. Re-registration replaces it.
#[derive(Default)]
pub struct TesterSlot {
    inner: RwLock<Option<Arc<dyn TestKiller>>>,
}

impl TesterSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tester: Arc<dyn TestKiller>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(tester);
    }

    pub fn get(&self) -> Option<Arc<dyn TestKiller>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl fmt::Debug for TesterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.get().map(|t| t.name());
        f.debug_struct("TesterSlot").field("tester", &name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl TestKiller for Named {
        async fn kill_test(&self, _reason: KillReason) {}
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn registration_replaces_previous() {
        let slot = TesterSlot::new();
        assert!(slot.get().is_none());

        slot.set(Arc::new(Named("first")));
        slot.set(Arc::new(Named("second")));
        assert_eq!(slot.get().map(|t| t.name()), Some("second"));

        slot.clear();
        assert!(slot.get().is_none());
    }
}
