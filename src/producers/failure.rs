//! Worker failure reporting.
//!
//! [`report_failures`] runs a worker future and turns an `Err` or a panic
//! into a `ThreadFailed` event, so a dying background worker shows up in
//! the event logs instead of vanishing.

use std::backtrace::Backtrace;
use std::fmt::Display;
use std::future::Future;

use futures::FutureExt;
use tracing::warn;

use crate::events::{Bus, Event};
use crate::subscribers::panic_message;

/// Runs `fut`; on error or panic publishes a `ThreadFailed` event and returns `None`.
pub async fn report_failures<F, T, E>(bus: &Bus, name: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let (message, traceback) = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(v)) => return Some(v),
        Ok(Err(e)) => (
            format!("{name} failed: {e}"),
            Backtrace::force_capture().to_string(),
        ),
        Err(panic_err) => (
            format!("{name} panicked: {}", panic_message(&*panic_err)),
            Backtrace::force_capture().to_string(),
        ),
    };

    if let Err(e) = bus
        .publish_guaranteed(Event::thread_failed(&message, &traceback))
        .await
    {
        warn!(worker = name, error = %e, label = e.as_label(), "failed to report worker failure: {message}");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::{EventKind, Severity};
    use crate::filters::FilterRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    fn bus(dir: &std::path::Path) -> Bus {
        Bus::start(
            &Config::with_log_dir(dir),
            Arc::new(FilterRegistry::new(Duration::ZERO)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ok_passes_through_silently() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let mut sub = bus.subscribe("s", 8);

        let v = report_failures(&bus, "worker", async { Ok::<_, String>(7) }).await;
        assert_eq!(v, Some(7));
        assert!(sub.try_recv().is_none());
        bus.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn error_becomes_thread_failed_event() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let mut sub = bus.subscribe("s", 8);

        let v = report_failures(&bus, "nemesis", async { Err::<(), _>("disk gone") }).await;
        assert_eq!(v, None);

        let ev = sub.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ThreadFailed);
        assert_eq!(ev.severity, Severity::Error);
        assert_eq!(ev.message.as_deref(), Some("nemesis failed: disk gone"));
        bus.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn panic_becomes_thread_failed_event() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let mut sub = bus.subscribe("s", 8);

        let v: Option<()> = report_failures(&bus, "tailer", async {
            if true {
                panic!("lost the file");
            }
            Ok::<_, String>(())
        })
        .await;
        assert_eq!(v, None);
        assert_eq!(
            sub.try_recv().unwrap().message.as_deref(),
            Some("tailer panicked: lost the file")
        );
        bus.stop(Duration::from_secs(1)).await;
    }
}
