//! # SubscriberSet: one worker per subscriber
//!
//! [`SubscriberSet`] gives every [`Subscribe`] implementation its own bus
//! [`Subscription`](crate::Subscription) and a worker task that pulls from it.
//!
//! ## What it guarantees
//! - Per-subscriber FIFO (queue order).
//! - Panics inside `on_event` / `on_stop` are caught and logged (isolation).
//! - A slow subscriber only fills its own queue.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//!
//! ## Diagram
//! ```text
//!   Bus device
//!       ├────► [queue S1] ─► worker S1 ─► on_event() ... on_stop()
//!       ├────► [queue S2] ─► worker S2 ─► on_event() ... on_stop()
//!       └────► [queue SN] ─► worker SN ─► on_event() ... on_stop()
//! ```
//!
//! Workers end when the bus is stopped and their queue is drained, or when
//! [`SubscriberSet::shutdown`] gives up waiting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::Subscribe;
use crate::events::{Bus, Subscription};

/// Fan-in of subscriber workers.
pub struct SubscriberSet {
    names: Vec<&'static str>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SubscriberSet {
    /// Subscribes every entry to `bus` and spawns its worker.
    ///
    /// Subscriptions are registered before this returns, so no event published
    /// afterwards is missed. `default_capacity` applies to subscribers that
    /// declare a capacity of `0`.
    #[must_use]
    pub fn spawn(subs: Vec<Arc<dyn Subscribe>>, bus: &Bus, default_capacity: usize) -> Self {
        let cancel = CancellationToken::new();
        let mut names = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = match sub.queue_capacity() {
                0 => default_capacity,
                n => n,
            };
            let rx = bus.subscribe(sub.name(), cap);
            names.push(sub.name());
            workers.push(tokio::spawn(worker(sub, rx, cancel.clone())));
        }

        Self {
            names,
            workers: Mutex::new(workers),
            cancel,
        }
    }

    /// Waits up to `timeout` for workers to drain, then cancels and aborts them.
    ///
    /// Aborted workers skip `on_stop` and are gone when this returns. Stop the
    /// bus first; otherwise workers keep waiting for events and the timeout
    /// always hits. Idempotent.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        if workers.is_empty() {
            return;
        }

        let all = futures::future::join_all(workers.iter_mut());
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(?timeout, "subscribers did not drain in time, aborting");
            self.cancel.cancel();
            for w in &workers {
                w.abort();
            }
            // Finished handles may already have yielded their output to `join_all`.
            for w in workers.iter_mut().filter(|w| !w.is_finished()) {
                let _ = w.await;
            }
        }
        debug!(count = workers.len(), "subscribers stopped");
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: Subscription, cancel: CancellationToken) {
    loop {
        let ev = tokio::select! {
            biased;
            ev = rx.recv() => ev,
            _ = cancel.cancelled() => None,
        };
        let Some(ev) = ev else { break };

        let fut = sub.on_event(ev.as_ref());
        if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            error!(
                subscriber = sub.name(),
                seq = ev.seq,
                panic = %panic_message(&*panic_err),
                "subscriber panicked"
            );
        }
    }

    if let Err(panic_err) = std::panic::AssertUnwindSafe(sub.on_stop()).catch_unwind().await {
        error!(subscriber = sub.name(), panic = %panic_message(&*panic_err), "subscriber panicked on stop");
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
