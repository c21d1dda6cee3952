// ABOUTME: Consumer side of a poller: where snapshots and error messages are delivered
// ABOUTME: Implemented for closures and for tokio channels carrying PollEvent values

use std::sync::Arc;

use tokio::sync::mpsc;

/// Receives what a poller publishes.
///
/// Snapshots arrive as `Arc<T>`: they are immutable once published and each
/// fetch produces a fresh value, so a consumer that needs to edit one clones
/// it first.
pub trait SnapshotSink<T>: Send + Sync {
    fn on_snapshot(&self, snapshot: Arc<T>);

    fn on_error(&self, message: String);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent<T> {
    Snapshot(Arc<T>),
    Error(String),
}

impl<T: Send + Sync> SnapshotSink<T> for mpsc::UnboundedSender<PollEvent<T>> {
    fn on_snapshot(&self, snapshot: Arc<T>) {
        // A dropped receiver means the consumer went away; nothing to report to.
        let _ = self.send(PollEvent::Snapshot(snapshot));
    }

    fn on_error(&self, message: String) {
        let _ = self.send(PollEvent::Error(message));
    }
}

/// Adapter for a pair of callbacks.
pub struct FnSink<S, E> {
    on_snapshot: S,
    on_error: E,
}

pub fn sink_fn<T, S, E>(on_snapshot: S, on_error: E) -> FnSink<S, E>
where
    S: Fn(Arc<T>) + Send + Sync,
    E: Fn(String) + Send + Sync,
{
    FnSink {
        on_snapshot,
        on_error,
    }
}

impl<T, S, E> SnapshotSink<T> for FnSink<S, E>
where
    S: Fn(Arc<T>) + Send + Sync,
    E: Fn(String) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: Arc<T>) {
        (self.on_snapshot)(snapshot)
    }

    fn on_error(&self, message: String) {
        (self.on_error)(message)
    }
}

/// Convenience for the common channel-based consumer.
pub fn channel<T: Send + Sync>() -> (
    mpsc::UnboundedSender<PollEvent<T>>,
    mpsc::UnboundedReceiver<PollEvent<T>>,
) {
    mpsc::unbounded_channel()
}
