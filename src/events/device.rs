//! Bus device: the single task between ingress and subscriber queues.
//!
//! Per event, in order:
//! 1. append the JSON record to `raw_events.log`;
//! 2. system kinds stop here;
//! 3. evaluate filters (suppress, or rewrite severity into a new value);
//! 4. enqueue to every subscriber queue;
//! 5. acknowledge a guaranteed publish.
//!
//! On shutdown the ingress is closed and whatever is already queued is
//! dispatched before the routes are closed.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::bus::Counters;
use super::event::Event;
use crate::error::BusError;
use crate::filters::FilterRegistry;

type Ack = oneshot::Sender<Result<(), BusError>>;

/// Producer waiting on a guaranteed publish.
struct Pending {
    ack: Ack,
    /// Shared by the producer's enqueue and the device's fan-out. `None` waits forever.
    deadline: Option<Instant>,
}

/// Event in flight with its optional acknowledgement.
pub(crate) struct Envelope {
    pub(crate) event: Event,
    pending: Option<Pending>,
}

impl Envelope {
    pub(crate) fn fire(event: Event) -> Self {
        Self {
            event,
            pending: None,
        }
    }

    pub(crate) fn acked(
        event: Event,
        deadline: Option<Instant>,
    ) -> (Self, oneshot::Receiver<Result<(), BusError>>) {
        let (ack, rx) = oneshot::channel();
        (
            Self {
                event,
                pending: Some(Pending { ack, deadline }),
            },
            rx,
        )
    }
}

/// Deadline `timeout` from now, or `None` if it is past the end of the clock.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Runs `fut` until `deadline`; `None` on expiry.
///
/// `fut` is polled once even when the deadline has already passed.
pub(crate) async fn until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[derive(Clone, Copy)]
enum Mode {
    BestEffort,
    Guaranteed {
        deadline: Option<Instant>,
        timeout: Duration,
    },
}

struct Route {
    id: u64,
    name: Arc<str>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Subscriber queues the device fans out to.
#[derive(Default)]
pub(crate) struct Fanout {
    routes: Mutex<Vec<Route>>,
    next_id: AtomicU64,
}

impl Fanout {
    fn routes(&self) -> MutexGuard<'_, Vec<Route>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, name: Arc<str>, tx: mpsc::Sender<Arc<Event>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.routes().push(Route { id, name, tx });
    }

    pub(crate) fn len(&self) -> usize {
        self.routes().len()
    }

    /// Drops every sender; subscribers see the end of their queue after draining it.
    pub(crate) fn close(&self) {
        self.routes().clear();
    }

    fn snapshot(&self) -> Vec<(u64, Arc<str>, mpsc::Sender<Arc<Event>>)> {
        self.routes()
            .iter()
            .map(|r| (r.id, Arc::clone(&r.name), r.tx.clone()))
            .collect()
    }

    fn remove(&self, ids: &[u64]) {
        if !ids.is_empty() {
            self.routes().retain(|r| !ids.contains(&r.id));
        }
    }

    /// Enqueues `ev` to every route.
    ///
    /// Best-effort mode drops on a full queue. Guaranteed mode waits for room
    /// until the producer's deadline, shared across all queues, and reports a
    /// queue that stayed full.
    async fn deliver(&self, ev: Arc<Event>, mode: Mode, counters: &Counters) -> Result<(), BusError> {
        let mut result = Ok(());
        let mut gone = Vec::new();

        for (id, name, tx) in self.snapshot() {
            match mode {
                Mode::BestEffort => match tx.try_send(Arc::clone(&ev)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        Counters::bump(&counters.dropped);
                        warn!(subscriber = %name, seq = ev.seq, "subscriber queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(id),
                },
                Mode::Guaranteed { deadline, timeout } => match until(deadline, tx.send(Arc::clone(&ev))).await {
                    Some(Ok(())) => {}
                    Some(Err(_)) => gone.push(id),
                    None => {
                        Counters::bump(&counters.dropped);
                        warn!(subscriber = %name, seq = ev.seq, ?timeout, "subscriber did not accept guaranteed event");
                        if result.is_ok() {
                            result = Err(BusError::DeliveryTimeout { timeout });
                        }
                    }
                },
            }
        }

        if !gone.is_empty() {
            debug!(count = gone.len(), "pruning closed subscriber queues");
            self.remove(&gone);
        }
        result
    }
}

pub(crate) struct Device {
    rx: mpsc::Receiver<Envelope>,
    raw: BufWriter<File>,
    raw_path: PathBuf,
    filters: Arc<FilterRegistry>,
    fanout: Arc<Fanout>,
    counters: Arc<Counters>,
    publish_timeout: Duration,
}

impl Device {
    pub(crate) fn open(
        raw_path: &Path,
        rx: mpsc::Receiver<Envelope>,
        filters: Arc<FilterRegistry>,
        fanout: Arc<Fanout>,
        counters: Arc<Counters>,
        publish_timeout: Duration,
    ) -> Result<Self, BusError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(raw_path)
            .map_err(|e| BusError::io(raw_path, e))?;
        Ok(Self {
            rx,
            raw: BufWriter::new(file),
            raw_path: raw_path.to_path_buf(),
            filters,
            fanout,
            counters,
            publish_timeout,
        })
    }

    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                maybe = self.rx.recv() => match maybe {
                    Some(env) => self.dispatch(env).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    self.rx.close();
                    while let Some(env) = self.rx.recv().await {
                        self.dispatch(env).await;
                    }
                    break;
                }
            }
        }
        if let Err(e) = self.raw.flush() {
            warn!(path = %self.raw_path.display(), error = %e, "failed to flush raw events log");
        }
        self.fanout.close();
        debug!("event bus device stopped");
    }

    async fn dispatch(&mut self, env: Envelope) {
        let Envelope { event, pending } = env;
        let mut result = self.append_raw(&event);

        if event.kind.is_system() {
            self.finish(pending, result);
            return;
        }

        let verdict = self.filters.evaluate(&event);
        if verdict.suppressed {
            Counters::bump(&self.counters.suppressed);
            trace!(kind = %event.kind, seq = event.seq, "event suppressed");
            self.finish(pending, result);
            return;
        }

        let event = match verdict.severity {
            Some(sev) if sev != event.severity => {
                trace!(kind = %event.kind, seq = event.seq, from = %event.severity, to = %sev, "severity changed");
                event.with_severity(sev)
            }
            _ => event,
        };

        let mode = match &pending {
            Some(p) => Mode::Guaranteed {
                deadline: p.deadline,
                timeout: self.publish_timeout,
            },
            None => Mode::BestEffort,
        };
        let delivered = self.fanout.deliver(Arc::new(event), mode, &self.counters).await;
        if result.is_ok() {
            result = delivered;
        }
        self.finish(pending, result);
    }

    fn append_raw(&mut self, event: &Event) -> Result<(), BusError> {
        let line = event.to_json();
        self.raw
            .write_all(line.as_bytes())
            .and_then(|()| self.raw.write_all(b"\n"))
            .and_then(|()| self.raw.flush())
            .map_err(|e| {
                warn!(path = %self.raw_path.display(), error = %e, "failed to append raw event");
                BusError::io(&self.raw_path, e)
            })
    }

    fn finish(&self, pending: Option<Pending>, result: Result<(), BusError>) {
        Counters::bump(&self.counters.dispatched);
        if let Some(p) = pending {
            let _ = p.ack.send(result);
        }
    }
}
