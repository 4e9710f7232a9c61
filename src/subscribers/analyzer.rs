//! # EventsAnalyzer: kill the run on a CRITICAL event
//!
//! ```text
//! RUNNING ──(CRITICAL, not TestResult, tester set)──► KILLING ──► STOPPED
//!    │                                                  │
//!    └─ no tester: log, stay RUNNING                    └─ kill_test() once
//! ```
//! In `STOPPED` events are drained with no side effects.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error};

use super::set::panic_message;
use crate::events::{Event, EventKind, Severity};
use crate::subscribers::Subscribe;
use crate::tester::{KillReason, TesterSlot};

/// Analyzer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AnalyzerState {
    Running = 0,
    Killing = 1,
    Stopped = 2,
}

impl AnalyzerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => AnalyzerState::Running,
            1 => AnalyzerState::Killing,
            _ => AnalyzerState::Stopped,
        }
    }
}

/// Subscriber that turns the first CRITICAL event into a test kill.
pub struct EventsAnalyzer {
    tester: Arc<TesterSlot>,
    state: AtomicU8,
    kills: AtomicU64,
}

impl EventsAnalyzer {
    pub fn new(tester: Arc<TesterSlot>) -> Self {
        Self {
            tester,
            state: AtomicU8::new(AnalyzerState::Running as u8),
            kills: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> AnalyzerState {
        AnalyzerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of times the tester was asked to kill the run (0 or 1).
    pub fn kills(&self) -> u64 {
        self.kills.load(Ordering::Acquire)
    }

    /// Moves to `STOPPED`; later events are ignored.
    pub fn stop(&self) {
        self.state
            .store(AnalyzerState::Stopped as u8, Ordering::Release);
    }

    fn reason_for(ev: &Event) -> String {
        if ev.kind.is_loader() {
            format!("Stress command failed: {ev}")
        } else {
            format!("Got critical event: {ev}")
        }
    }
}

#[async_trait]
impl Subscribe for EventsAnalyzer {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::TestResult || ev.severity != Severity::Critical {
            return;
        }
        if self.state() != AnalyzerState::Running {
            debug!(seq = ev.seq, "analyzer not running, critical event ignored");
            return;
        }
        let Some(tester) = self.tester.get() else {
            error!(seq = ev.seq, "No test was registered using `set_tester`, cannot kill it: {ev}");
            return;
        };
        if self
            .state
            .compare_exchange(
                AnalyzerState::Running as u8,
                AnalyzerState::Killing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let reason = KillReason {
            message: Self::reason_for(ev),
            event: ev.clone(),
            backtrace: Backtrace::force_capture(),
        };
        error!(tester = tester.name(), "{}", reason.message);
        self.kills.fetch_add(1, Ordering::AcqRel);

        if let Err(panic_err) = std::panic::AssertUnwindSafe(tester.kill_test(reason))
            .catch_unwind()
            .await
        {
            error!(
                tester = tester.name(),
                panic = %panic_message(&*panic_err),
                "failed to kill the test"
            );
        }
        self.stop();
    }

    fn name(&self) -> &'static str {
        "EventsAnalyzer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::TestKiller;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        reasons: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestKiller for Recorder {
        async fn kill_test(&self, reason: KillReason) {
            self.reasons.lock().unwrap().push(reason.message);
        }
    }

    struct Exploding;

    #[async_trait]
    impl TestKiller for Exploding {
        async fn kill_test(&self, _reason: KillReason) {
            panic!("teardown failed");
        }
    }

    fn critical(kind: EventKind) -> Event {
        Event::new(kind).with_severity(Severity::Critical)
    }

    fn with_recorder() -> (EventsAnalyzer, Arc<Recorder>) {
        let slot = Arc::new(TesterSlot::new());
        let rec = Arc::new(Recorder::default());
        slot.set(Arc::clone(&rec) as Arc<dyn TestKiller>);
        (EventsAnalyzer::new(slot), rec)
    }

    #[tokio::test]
    async fn kills_once_for_many_critical_events() {
        let (an, rec) = with_recorder();
        for _ in 0..5 {
            an.on_event(&critical(EventKind::CoreDump)).await;
        }
        assert_eq!(an.kills(), 1);
        assert_eq!(an.state(), AnalyzerState::Stopped);
        let reasons = rec.reasons.lock().unwrap();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("Got critical event: (CoreDumpEvent CRITICAL)"));
    }

    #[tokio::test]
    async fn loader_events_report_stress_failure() {
        let (an, rec) = with_recorder();
        an.on_event(&critical(EventKind::CassandraStress)).await;
        assert!(rec.reasons.lock().unwrap()[0].starts_with("Stress command failed: "));
    }

    #[tokio::test]
    async fn ignores_test_result_and_non_critical() {
        let (an, _rec) = with_recorder();
        an.on_event(&critical(EventKind::TestResult)).await;
        an.on_event(&Event::new(EventKind::CoreDump)).await;
        assert_eq!(an.kills(), 0);
        assert_eq!(an.state(), AnalyzerState::Running);
    }

    #[tokio::test]
    async fn no_tester_stays_running() {
        let an = EventsAnalyzer::new(Arc::new(TesterSlot::new()));
        an.on_event(&critical(EventKind::SpotTermination)).await;
        assert_eq!(an.state(), AnalyzerState::Running);
        assert_eq!(an.kills(), 0);
    }

    #[tokio::test]
    async fn panicking_tester_is_contained() {
        let slot = Arc::new(TesterSlot::new());
        slot.set(Arc::new(Exploding));
        let an = EventsAnalyzer::new(slot);

        an.on_event(&critical(EventKind::CoreDump)).await;
        an.on_event(&critical(EventKind::CoreDump)).await;
        assert_eq!(an.kills(), 1);
        assert_eq!(an.state(), AnalyzerState::Stopped);
    }

    #[tokio::test]
    async fn stopped_analyzer_ignores_events() {
        let (an, rec) = with_recorder();
        an.stop();
        an.on_event(&critical(EventKind::CoreDump)).await;
        assert!(rec.reasons.lock().unwrap().is_empty());
    }
}
