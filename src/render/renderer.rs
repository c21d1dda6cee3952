// ABOUTME: Asynchronous diagram renderer with per-target supersession
// ABOUTME: A newer render for a target cancels the older one so stale output is never applied

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::engine::{Artifact, DiagramEngine, RenderToken, TokenSource, PLACEHOLDER_DIAGRAM};
use crate::poll::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);

/// What a target currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Diagram(Artifact),
    /// Inline error shown instead of the diagram.
    Error { token: RenderToken, message: String },
}

impl RenderOutput {
    pub fn token(&self) -> &RenderToken {
        match self {
            RenderOutput::Diagram(artifact) => &artifact.token,
            RenderOutput::Error { token, .. } => token,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderOutput::Error { .. })
    }
}

/// A place one diagram is displayed, such as one function card.
/// Clones share the same slot.
///
/// The slot also records the newest render call issued for it, whichever
/// renderer issued it; only that call's result is ever applied.
#[derive(Debug, Clone)]
pub struct DiagramTarget {
    id: TargetId,
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    output: Option<RenderOutput>,
    writes: u64,
    newest: Option<(RenderToken, CancelToken)>,
}

impl DiagramTarget {
    pub fn new() -> Self {
        Self {
            id: TargetId(NEXT_TARGET.fetch_add(1, Ordering::Relaxed)),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn current(&self) -> Option<RenderOutput> {
        self.slot.lock().output.clone()
    }

    /// How many render results have been applied to this target.
    pub fn writes(&self) -> u64 {
        self.slot.lock().writes
    }

    /// Makes `token` the newest call and cancels the one it replaces.
    fn claim(&self, token: &RenderToken, cancel: &CancelToken) -> Option<RenderToken> {
        let previous = self
            .slot
            .lock()
            .newest
            .replace((token.clone(), cancel.clone()));
        previous.map(|(previous, previous_cancel)| {
            previous_cancel.cancel();
            previous
        })
    }

    /// Cancels whatever call is newest, leaving the current output alone.
    fn release(&self) {
        if let Some((_, cancel)) = self.slot.lock().newest.take() {
            cancel.cancel();
        }
    }

    /// Applies `output` only while `token` is still the newest call.
    fn commit(&self, token: &RenderToken, output: RenderOutput) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(&slot.newest, Some((newest, _)) if newest == token) {
            return false;
        }
        slot.newest = None;
        slot.output = Some(output);
        slot.writes += 1;
        true
    }
}

impl Default for DiagramTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDisposition {
    Applied,
    Superseded,
}

/// Handle on one render call.
#[derive(Debug)]
pub struct RenderTicket {
    token: RenderToken,
    handle: JoinHandle<RenderDisposition>,
}

impl RenderTicket {
    pub fn token(&self) -> &RenderToken {
        &self.token
    }

    pub async fn wait(self) -> RenderDisposition {
        match self.handle.await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::warn!(token = %self.token, error = %e, "Render task did not complete");
                RenderDisposition::Superseded
            }
        }
    }
}

struct Inner {
    engine: Arc<dyn DiagramEngine>,
    tokens: TokenSource,
    // Calls issued by this renderer that have not finished yet.
    pending: Mutex<HashSet<RenderToken>>,
}

#[derive(Clone)]
pub struct DiagramRenderer {
    inner: Arc<Inner>,
}

impl DiagramRenderer {
    pub fn new(engine: Arc<dyn DiagramEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                tokens: TokenSource::new(),
                pending: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.inner.engine.name()
    }

    /// Renders `description` into `target`, superseding any render still
    /// pending for the same target. Empty descriptions draw the placeholder.
    pub fn render(&self, description: &str, target: &DiagramTarget) -> RenderTicket {
        let source = if description.trim().is_empty() {
            PLACEHOLDER_DIAGRAM.to_string()
        } else {
            description.to_string()
        };
        let token = self.inner.tokens.next();
        let cancel = CancelToken::new();

        self.inner.pending.lock().insert(token.clone());
        if let Some(previous) = target.claim(&token, &cancel) {
            tracing::debug!(target_id = ?target.id(), superseded = %previous, by = %token, "Render superseded");
        }

        let inner = Arc::clone(&self.inner);
        let target = target.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let token = task_token;
            let disposition = tokio::select! {
                _ = cancel.cancelled() => RenderDisposition::Superseded,
                outcome = inner.engine.render(&token, &source) => inner.commit(&token, &target, outcome),
            };
            inner.pending.lock().remove(&token);
            disposition
        });

        RenderTicket { token, handle }
    }

    /// Drops whatever is pending for `target`; used when its owner goes away.
    pub fn cancel(&self, target: &DiagramTarget) {
        target.release();
    }

    /// Number of calls issued but neither applied nor superseded yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Inner {
    fn commit(
        &self,
        token: &RenderToken,
        target: &DiagramTarget,
        outcome: Result<Artifact, crate::error::RenderError>,
    ) -> RenderDisposition {
        let output = match outcome {
            Ok(artifact) => RenderOutput::Diagram(artifact),
            Err(err) => RenderOutput::Error {
                token: token.clone(),
                message: err.to_string(),
            },
        };
        let failure = match &output {
            RenderOutput::Error { message, .. } => Some(message.clone()),
            RenderOutput::Diagram(_) => None,
        };
        if !target.commit(token, output) {
            tracing::debug!(token = %token, "Dropping superseded render result");
            return RenderDisposition::Superseded;
        }
        if let Some(message) = failure {
            tracing::warn!(token = %token, target_id = ?target.id(), error = %message, "Diagram failed to render");
        }
        RenderDisposition::Applied
    }
}
