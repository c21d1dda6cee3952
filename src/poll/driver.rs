// ABOUTME: Generic polling loop shared by the job and job-list pollers
// ABOUTME: Timer ticks, in-flight exclusivity, discard-on-stop and snapshot publication

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::time::MissedTickBehavior;

use super::cancel::CancelToken;
use super::sink::SnapshotSink;
use crate::error::ApiError;

/// Shortest interval a poller runs at; shorter (including zero) intervals
/// are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) type Fetch<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Decides, per delivered snapshot, whether the timer keeps running.
pub(crate) trait PollPolicy<T>: Send + Sync {
    fn keep_polling(&self, snapshot: &T) -> bool;

    /// Hook to sanity-check a transition before the new snapshot is published.
    fn observe(&self, _previous: Option<&T>, _next: &T) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Tick,
    Refresh,
}

pub(crate) struct PollDriver<T> {
    label: &'static str,
    subject: String,
    fetch: Fetch<T>,
    policy: Box<dyn PollPolicy<T>>,
    sink: Arc<dyn SnapshotSink<T>>,
    cancel: CancelToken,
    // Stop flag. Held across the stop check and the sink call so that nothing
    // is delivered once `stop` has returned; re-entrant because sinks may
    // call back into the poller.
    gate: ReentrantMutex<Cell<bool>>,
    latest: Mutex<Option<Arc<T>>>,
    in_flight: AtomicBool,
    active: AtomicBool,
    seq: AtomicU64,
}

impl<T: Send + Sync + 'static> PollDriver<T> {
    pub(crate) fn new(
        label: &'static str,
        subject: String,
        fetch: Fetch<T>,
        policy: Box<dyn PollPolicy<T>>,
        sink: Arc<dyn SnapshotSink<T>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            subject,
            fetch,
            policy,
            sink,
            cancel: CancelToken::new(),
            gate: ReentrantMutex::new(Cell::new(false)),
            latest: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            active: AtomicBool::new(true),
            seq: AtomicU64::new(0),
        })
    }

    /// Spawns the timer. Its first tick fires immediately.
    pub(crate) fn start(self: &Arc<Self>, interval: Duration) {
        let interval = if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                poller = self.label,
                subject = %self.subject,
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_POLL_INTERVAL.as_millis() as u64,
                "Poll interval too short, using the minimum"
            );
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        tracing::debug!(
            poller = self.label,
            subject = %self.subject,
            interval_ms = interval.as_millis() as u64,
            "Polling started"
        );
        let driver = Arc::clone(self);
        tokio::spawn(async move { driver.run_timer(interval).await });
    }

    async fn run_timer(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.active.load(Ordering::SeqCst) {
                tracing::debug!(poller = self.label, subject = %self.subject, "Timer stopped");
                break;
            }
            self.trigger(Trigger::Tick);
        }
    }

    /// Starts a fetch unless stopped or one is already in flight.
    /// Returns whether a fetch was issued.
    pub(crate) fn trigger(self: &Arc<Self>, trigger: Trigger) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(
                poller = self.label,
                subject = %self.subject,
                ?trigger,
                "Previous fetch still in flight, skipping"
            );
            return false;
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(poller = self.label, subject = %self.subject, seq, ?trigger, "Fetching");

        let fetch = (self.fetch)();
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = driver.cancel.cancelled() => {
                    tracing::debug!(poller = driver.label, subject = %driver.subject, seq, "In-flight fetch abandoned");
                }
                result = fetch => driver.deliver(seq, result),
            }
        });
        true
    }

    fn deliver(&self, seq: u64, result: Result<T, ApiError>) {
        let gate = self.gate.lock();
        if gate.get() {
            tracing::debug!(poller = self.label, subject = %self.subject, seq, "Discarding result delivered after stop");
            return;
        }
        self.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                {
                    let mut latest = self.latest.lock();
                    self.policy.observe(latest.as_deref(), &snapshot);
                    *latest = Some(Arc::clone(&snapshot));
                }
                if !self.policy.keep_polling(&snapshot) && self.active.swap(false, Ordering::SeqCst)
                {
                    tracing::info!(poller = self.label, subject = %self.subject, seq, "Reached terminal state, polling stops");
                }
                self.sink.on_snapshot(snapshot);
            }
            Err(err) => {
                tracing::warn!(
                    poller = self.label,
                    subject = %self.subject,
                    seq,
                    transient = err.is_transient(),
                    error = %err,
                    "Fetch failed"
                );
                self.sink.on_error(err.to_string());
            }
        }
        drop(gate);
    }

    /// Idempotent. Abandons any in-flight fetch; nothing reaches the sink afterwards.
    pub(crate) fn stop(&self) {
        let gate = self.gate.lock();
        if gate.replace(true) {
            return;
        }
        self.cancel.cancel();
        tracing::debug!(poller = self.label, subject = %self.subject, "Polling stopped");
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.gate.lock().get()
    }

    /// Whether the timer is still scheduling fetches.
    pub(crate) fn is_polling(&self) -> bool {
        !self.is_stopped() && self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn latest(&self) -> Option<Arc<T>> {
        self.latest.lock().clone()
    }

    pub(crate) fn fetches_issued(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}
