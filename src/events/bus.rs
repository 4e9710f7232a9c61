//! # Event bus with filtered, acknowledged delivery.
//!
//! [`Bus`] is the single logical channel between producers and subscribers.
//! Producers hand events to a bounded ingress queue; one device task writes
//! each event to the raw log, runs it through the
//! [`FilterRegistry`](crate::FilterRegistry) and fans the survivors out to
//! per-subscriber queues.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscribers (many):
//!   log tailer ──┐                        ┌──► [queue] file logger
//!   stress     ──┼──► [ingress] device ───┼──► [queue] analyzer
//!   nemesis    ──┘   (bounded mpsc)       └──► [queue] user
//! ```
//!
//! ## Rules
//! - **`publish`** never blocks. A full ingress drops the event (warn).
//! - **`publish_guaranteed`** waits until the device has appended the event
//!   to the raw log and enqueued it to every subscriber. One deadline,
//!   `publish_timeout` from the call, bounds both the enqueue and the
//!   fan-out, and the result is the device's own report of what it delivered.
//! - **FIFO** per producer→subscriber pair. Nothing is promised across producers.
//! - **No replay**: a subscriber only sees events dispatched after it subscribed.
//! - After [`Bus::stop`] every publish returns [`BusError::Closed`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::device::{Device, Envelope, Fanout, deadline_after, until};
use super::event::Event;
use crate::config::Config;
use crate::error::BusError;
use crate::filters::FilterRegistry;

/// Counters kept by the bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events accepted on ingress.
    pub published: u64,
    /// Events the device has finished dispatching.
    pub dispatched: u64,
    /// Events swallowed by a suppress filter.
    pub suppressed: u64,
    /// Drops on a full ingress or a full subscriber queue.
    pub dropped: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) published: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) suppressed: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner {
    tx: mpsc::Sender<Envelope>,
    closed: AtomicBool,
    fanout: Arc<Fanout>,
    counters: Arc<Counters>,
    publish_timeout: Duration,
    shutdown: CancellationToken,
    device: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running event bus.
///
/// Cheap to clone; all clones share the same device.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    /// Creates `<log_dir>/events_log/`, opens the raw log and spawns the device.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(cfg: &Config, filters: Arc<FilterRegistry>) -> Result<Self, BusError> {
        let paths = cfg.paths();
        std::fs::create_dir_all(&paths.base).map_err(|e| BusError::io(&paths.base, e))?;

        let (tx, rx) = mpsc::channel(cfg.bus_capacity_clamped());
        let fanout = Arc::new(Fanout::default());
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();

        let device = Device::open(
            &paths.raw,
            rx,
            filters,
            Arc::clone(&fanout),
            Arc::clone(&counters),
            cfg.publish_timeout,
        )?;
        let handle = tokio::spawn(device.run(shutdown.clone()));

        debug!(dir = %paths.base.display(), capacity = cfg.bus_capacity_clamped(), "event bus started");
        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                closed: AtomicBool::new(false),
                fanout,
                counters,
                publish_timeout: cfg.publish_timeout,
                shutdown,
                device: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Publishes without waiting.
    ///
    /// A saturated ingress drops the event and still returns `Ok`.
    pub fn publish(&self, event: Event) -> Result<(), BusError> {
        self.ensure_open()?;
        match self.inner.tx.try_send(Envelope::fire(event)) {
            Ok(()) => {
                Counters::bump(&self.inner.counters.published);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(env)) => {
                Counters::bump(&self.inner.counters.dropped);
                warn!(kind = %env.event.kind, seq = env.event.seq, "event bus saturated, event dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    /// Publishes and waits for the device to acknowledge delivery.
    ///
    /// The enqueue and the device's fan-out share one deadline,
    /// `publish_timeout` from now. Once enqueued, the answer comes from the
    /// device: `Ok` means every subscriber queue holds the event,
    /// [`BusError::DeliveryTimeout`] means some queue stayed full past the
    /// deadline, and [`BusError::Closed`] means the device was torn down first.
    pub async fn publish_guaranteed(&self, event: Event) -> Result<(), BusError> {
        self.ensure_open()?;
        let timeout = self.inner.publish_timeout;
        let deadline = deadline_after(timeout);
        let (env, ack) = Envelope::acked(event, deadline);

        match until(deadline, self.inner.tx.send(env)).await {
            Some(Ok(())) => Counters::bump(&self.inner.counters.published),
            Some(Err(_)) => return Err(BusError::Closed),
            None => return Err(BusError::DeliveryTimeout { timeout }),
        }
        ack.await.unwrap_or(Err(BusError::Closed))
    }

    /// Blocking flavor of [`Bus::publish_guaranteed`] for OS-thread producers.
    ///
    /// # Panics
    /// Panics if called from inside an async execution context.
    pub fn publish_guaranteed_blocking(&self, event: Event) -> Result<(), BusError> {
        self.ensure_open()?;
        let (env, ack) = Envelope::acked(event, deadline_after(self.inner.publish_timeout));
        self.inner
            .tx
            .blocking_send(env)
            .map_err(|_| BusError::Closed)?;
        Counters::bump(&self.inner.counters.published);
        ack.blocking_recv().unwrap_or(Err(BusError::Closed))
    }

    /// Registers a new subscriber queue of `capacity` (min 1).
    ///
    /// On a stopped bus the subscription is already finished.
    pub fn subscribe(&self, name: &str, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let name: Arc<str> = Arc::from(name);
        if !self.is_closed() {
            self.inner.fanout.add(Arc::clone(&name), tx);
        }
        Subscription { name, rx }
    }

    /// Drains queued events for up to `timeout`, then tears the device down.
    ///
    /// Safe to call any number of times; only the first call does work.
    pub async fn stop(&self, timeout: Duration) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.cancel();

        let handle = self
            .inner
            .device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => debug!("event bus drained"),
            Ok(Err(e)) => warn!(error = %e, "event bus device failed"),
            Err(_) => {
                warn!(?timeout, "event bus drain timed out, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
        self.inner.fanout.close();
    }

    /// True once [`Bus::stop`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        let c = &self.inner.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            suppressed: c.suppressed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    /// Number of live subscriber queues.
    pub fn subscriber_count(&self) -> usize {
        self.inner.fanout.len()
    }

    #[inline]
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Pull side of one subscriber queue.
///
/// The cursor only moves forward. `recv` returns `None` once the bus is
/// stopped and the queue is drained.
pub struct Subscription {
    name: Arc<str>,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Takes the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
    }
}
