//! # TestContext: lifetime of the event pipeline for one run.
//!
//! Owns every piece the harness needs and tears them down in order:
//!
//! ```text
//! start:  FilterRegistry ─► Bus ─► EventsFileLogger + EventsAnalyzer + extra ─► SubscriberSet
//!         ─► startup probe (guaranteed, no loss) ─► default filters
//!
//! stop:   default filters released ─► Bus::stop (drain) ─► SubscriberSet::shutdown
//!         ─► EventsAnalyzer::stop
//! ```
//!
//! ## Example
//! ```no_run
//! use sct_events::{Config, Event, TestContext};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = TestContext::start(Config::with_log_dir("/tmp/sct-run")).await?;
//! ctx.bus().publish(Event::info("cluster is up"))?;
//! ctx.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{BusError, SetupError};
use crate::events::{Bus, Event};
use crate::filters::{DbEventsFilter, FilterRegistry, FilterStack, apply_log_filters};
use crate::subscribers::{EventsAnalyzer, EventsFileLogger, Subscribe, SubscriberSet};
use crate::tester::{TestKiller, TesterSlot};

/// Rate-limited backtraces suppressed for the whole run (both spellings occur in the wild).
const RATE_LIMITED_BACKTRACES: [&str; 2] = ["Rate-limit: supressed", "Rate-limit: suppressed"];

/// Event pipeline of one test run.
pub struct TestContext {
    config: Config,
    registry: Arc<FilterRegistry>,
    bus: Bus,
    tester: Arc<TesterSlot>,
    file_logger: Arc<EventsFileLogger>,
    analyzer: Arc<EventsAnalyzer>,
    subscribers: SubscriberSet,
    default_filters: Mutex<Option<FilterStack>>,
    stopped: AtomicBool,
}

impl TestContext {
    /// Starts the pipeline with the built-in subscribers.
    pub async fn start(cfg: Config) -> Result<Self, SetupError> {
        Self::start_with(cfg, Vec::new()).await
    }

    /// Starts the pipeline with `extra` subscribers next to the built-in ones.
    pub async fn start_with(
        cfg: Config,
        extra: Vec<Arc<dyn Subscribe>>,
    ) -> Result<Self, SetupError> {
        let registry = Arc::new(FilterRegistry::new(cfg.default_grace));
        let bus = Bus::start(&cfg, Arc::clone(&registry))?;
        let file_logger = Arc::new(EventsFileLogger::open(cfg.paths(), cfg.flush_logs)?);
        let tester = Arc::new(TesterSlot::new());
        let analyzer = Arc::new(EventsAnalyzer::new(Arc::clone(&tester)));

        let mut subs: Vec<Arc<dyn Subscribe>> = vec![
            Arc::clone(&file_logger) as Arc<dyn Subscribe>,
            Arc::clone(&analyzer) as Arc<dyn Subscribe>,
        ];
        subs.extend(extra);
        let subscribers = SubscriberSet::spawn(subs, &bus, cfg.subscriber_capacity_clamped());

        if let Err(source) = probe(&bus, cfg.startup_probe_events).await {
            bus.stop(cfg.stop_timeout).await;
            subscribers.shutdown(cfg.stop_timeout).await;
            return Err(SetupError::ProbeFailed {
                expected: cfg.startup_probe_events,
                source,
            });
        }

        let default_filters = cfg
            .default_filters
            .then(|| install_default_filters(&registry));

        info!(
            dir = %cfg.paths().base.display(),
            subscribers = subscribers.len(),
            "event pipeline started"
        );
        Ok(Self {
            config: cfg,
            registry,
            bus,
            tester,
            file_logger,
            analyzer,
            subscribers,
            default_filters: Mutex::new(default_filters),
            stopped: AtomicBool::new(false),
        })
    }

    /// Registers the object to kill on a CRITICAL event; replaces any previous one.
    pub fn set_tester(&self, tester: Arc<dyn TestKiller>) {
        debug!(tester = tester.name(), "tester registered");
        self.tester.set(tester);
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Shorthand for `self.bus().publish(event)`.
    pub fn publish(&self, event: Event) -> Result<(), BusError> {
        self.bus.publish(event)
    }

    /// Shorthand for `self.bus().publish_guaranteed(event)`.
    pub async fn publish_guaranteed(&self, event: Event) -> Result<(), BusError> {
        self.bus.publish_guaranteed(event).await
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn file_logger(&self) -> &EventsFileLogger {
        &self.file_logger
    }

    pub fn analyzer(&self) -> &EventsAnalyzer {
        &self.analyzer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drains and tears down the pipeline. Later calls return immediately.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(
            self.default_filters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.bus.stop(self.config.stop_timeout).await;
        self.subscribers.shutdown(self.config.stop_timeout).await;
        self.analyzer.stop();
        info!(stats = ?self.bus.stats(), "event pipeline stopped");
    }
}

async fn probe(bus: &Bus, count: usize) -> Result<(), BusError> {
    for _ in 0..count {
        bus.publish_guaranteed(Event::startup_probe()).await?;
    }
    if count > 0 {
        debug!(count, "startup probe delivered");
    }
    Ok(())
}

fn install_default_filters(registry: &Arc<FilterRegistry>) -> FilterStack {
    apply_log_filters(
        RATE_LIMITED_BACKTRACES
            .iter()
            .map(|line| DbEventsFilter::new("BACKTRACE").line(*line).activate(registry)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Severity};

    fn cfg(dir: &std::path::Path) -> Config {
        Config {
            startup_probe_events: 3,
            ..Config::with_log_dir(dir)
        }
    }

    #[tokio::test]
    async fn default_filters_suppress_rate_limited_backtraces() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TestContext::start(cfg(dir.path())).await.unwrap();
        assert_eq!(ctx.registry().len(), 2);

        let rate_limited = Event::new(EventKind::DatabaseLog)
            .with_subtype("BACKTRACE")
            .with_severity(Severity::Error)
            .with_line("Rate-limit: suppressed 4 backtraces on shard 5");
        assert!(ctx.registry().evaluate(&rate_limited).suppressed);

        ctx.stop().await;
        assert!(ctx.registry().is_empty());
    }

    #[tokio::test]
    async fn probes_are_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TestContext::start(cfg(dir.path())).await.unwrap();
        ctx.stop().await;

        assert_eq!(ctx.file_logger().summary().values().sum::<u64>(), 0);
        let raw = std::fs::read_to_string(&ctx.config().paths().raw).unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[tokio::test]
    async fn filters_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TestContext::start(Config {
            default_filters: false,
            startup_probe_events: 0,
            ..Config::with_log_dir(dir.path())
        })
        .await
        .unwrap();
        assert!(ctx.registry().is_empty());
        ctx.stop().await;
    }
}
