// ABOUTME: Diagram engine port and the values that flow through a render call
// ABOUTME: Render tokens, rendered artifacts and the canonical placeholder diagram

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::RenderError;

/// Drawn in place of an empty or whitespace-only description.
pub const PLACEHOLDER_DIAGRAM: &str = "flowchart TD\n  A([No diagram available])";

/// Identifies one render call. Engines use it to address the elements they
/// produce, so no two calls in this process ever share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderToken(String);

impl RenderToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Mints tokens `flowchart-<nonce>-<n>`. The counter is process-wide; the
/// random nonce keeps ids apart when output from separate runs is combined.
#[derive(Debug, Clone)]
pub(crate) struct TokenSource {
    nonce: u32,
}

impl TokenSource {
    pub(crate) fn new() -> Self {
        Self {
            nonce: rand::random(),
        }
    }

    pub(crate) fn next(&self) -> RenderToken {
        let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        RenderToken(format!("flowchart-{:08x}-{}", self.nonce, n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub token: RenderToken,
    pub svg: String,
}

#[async_trait]
pub trait DiagramEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lays out `description`. May take arbitrarily long; callers drop the
    /// future when the result is no longer wanted.
    async fn render(&self, token: &RenderToken, description: &str) -> Result<Artifact, RenderError>;
}
