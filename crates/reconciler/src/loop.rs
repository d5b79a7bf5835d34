//! Event-driven reconciliation loop.
//!
//! Drives a [`Reconciler`] from the change notifications of an
//! [`EventSource`]:
//!
//! - child events are mapped to the owning `WebGame` through their owner
//!   references
//! - every `WebGame` is listed at start, on each resync tick and whenever
//!   the subscription lagged
//! - a key is reconciled by at most one task at a time; events arriving
//!   meanwhile are coalesced into one follow-up pass
//! - retryable failures are requeued with per-key exponential backoff,
//!   other failures wait for the record to change

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval};
use tracing::{debug, error, info, warn};
use webgame_api::WebGame;
use webgame_store::{ApiStore, EventSource, ObjectKey, WatchError, WatchEvent};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::types::ReconcileOutcome;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Delay before the first retry of a failed key.
    pub error_backoff: Duration,
    /// Upper bound of the per-key retry delay.
    pub max_backoff: Duration,
    /// Period of full resyncs; `None` relies on events alone.
    pub resync_period: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            resync_period: None,
        }
    }
}

impl LoopConfig {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.error_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Map a change notification to the `WebGame` it concerns.
pub fn owner_key(event: &WatchEvent) -> Option<ObjectKey> {
    if event.is_kind::<WebGame>() {
        Some(event.key.clone())
    } else {
        event.owner_of_kind::<WebGame>()
    }
}

/// Pending keys, with per-key serialization.
#[derive(Debug, Default)]
struct KeyQueue {
    pending: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
}

impl KeyQueue {
    fn schedule(&mut self, key: ObjectKey) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
        }
    }

    fn next_ready(&mut self) -> Option<ObjectKey> {
        let key = self.pending.pop_front()?;
        self.queued.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }

    fn finish(&mut self, key: &ObjectKey) {
        self.in_flight.remove(key);
        if self.dirty.remove(key) {
            self.schedule(key.clone());
        }
    }
}

type TaskResult = (ObjectKey, Option<Result<ReconcileOutcome>>);

/// Event-driven reconciliation loop.
pub struct ReconciliationLoop<S: ApiStore + 'static, E: EventSource> {
    /// The reconciler.
    reconciler: Arc<Reconciler<S>>,
    /// Source of change notifications.
    events: Arc<E>,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl<S: ApiStore + 'static, E: EventSource> ReconciliationLoop<S, E> {
    /// Create a new reconciliation loop.
    pub fn new(reconciler: Arc<Reconciler<S>>, events: Arc<E>, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            events,
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Run until stopped or until the event source closes.
    ///
    /// Reconcile tasks still running at that point are cancelled.
    ///
    /// # Errors
    /// Currently always returns `Ok`; failures of single passes are logged
    /// and retried according to [`LoopConfig`].
    pub async fn run(&mut self) -> Result<()> {
        info!(
            error_backoff_ms = self.config.error_backoff.as_millis(),
            resync = ?self.config.resync_period,
            "Starting reconciliation loop"
        );

        // Subscribe before listing so no change between the two is missed.
        let mut subscription = self.events.subscribe();
        let mut queue = KeyQueue::default();
        let mut failures: HashMap<ObjectKey, u32> = HashMap::new();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel::<ObjectKey>();
        let mut resync = self
            .config
            .resync_period
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        self.enqueue_all(&mut queue).await;

        loop {
            while let Some(key) = queue.next_ready() {
                let reconciler = Arc::clone(&self.reconciler);
                tasks.spawn(async move {
                    let result = AssertUnwindSafe(reconciler.reconcile(&key))
                        .catch_unwind()
                        .await
                        .ok();
                    (key, result)
                });
            }

            tokio::select! {
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        info!("Reconciliation loop stopped");
                        break;
                    }
                }
                event = subscription.recv() => match event {
                    Ok(event) => {
                        if let Some(key) = owner_key(&event) {
                            debug!(key = %key, action = ?event.action, kind = %event.gvk.kind, "Change observed");
                            queue.schedule(key);
                        }
                    }
                    Err(WatchError::Lagged(missed)) => {
                        warn!(missed, "Event subscription lagged, resyncing");
                        self.enqueue_all(&mut queue).await;
                    }
                    Err(WatchError::Closed) => {
                        info!("Event source closed, stopping reconciliation loop");
                        break;
                    }
                },
                Some(key) = requeue_rx.recv() => queue.schedule(key),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok((key, result)) => {
                        self.complete(&key, result, &mut failures, &requeue_tx);
                        queue.finish(&key);
                    }
                    Err(e) => error!(error = %e, "Reconcile task aborted"),
                },
                () = tick(resync.as_mut()) => {
                    debug!("Periodic resync");
                    self.enqueue_all(&mut queue).await;
                }
            }
        }

        tasks.shutdown().await;
        Ok(())
    }

    async fn enqueue_all(&self, queue: &mut KeyQueue) {
        match self
            .reconciler
            .store()
            .list::<WebGame>(None, &Default::default())
            .await
        {
            Ok(games) => {
                debug!(count = games.len(), "Listed WebGames");
                games
                    .iter()
                    .filter_map(ObjectKey::from_resource)
                    .for_each(|key| queue.schedule(key));
            }
            Err(e) => warn!(error = %e, "Failed to list WebGames"),
        }
    }

    fn complete(
        &self,
        key: &ObjectKey,
        result: Option<Result<ReconcileOutcome>>,
        failures: &mut HashMap<ObjectKey, u32>,
        requeue_tx: &mpsc::UnboundedSender<ObjectKey>,
    ) {
        let retry = match result {
            Some(Ok(outcome)) => {
                debug!(key = %key, outcome = ?outcome, "Reconcile finished");
                failures.remove(key);
                false
            }
            Some(Err(e)) if e.is_retryable() => {
                warn!(key = %key, error = %e, "Reconcile failed, will retry");
                true
            }
            Some(Err(e)) => {
                error!(key = %key, error = %e, "Reconcile failed, waiting for the record to change");
                failures.remove(key);
                false
            }
            None => {
                error!(key = %key, "Reconcile panicked, will retry");
                true
            }
        };
        if !retry {
            return;
        }

        let attempt = failures.entry(key.clone()).or_insert(0);
        *attempt = attempt.saturating_add(1);
        let delay = self.config.backoff(*attempt);
        debug!(key = %key, attempt = *attempt, delay_ms = delay.as_millis(), "Requeueing");

        let key = key.clone();
        let requeue_tx = requeue_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop may be gone by now.
            let _ = requeue_tx.send(key);
        });
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
